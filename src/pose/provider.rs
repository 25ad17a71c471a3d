use futures::future::{BoxFuture, FutureExt};

use super::keypoint::Pose;
use super::segmentation::SegmentationMask;
use crate::camera::VideoFrame;

/// 1フレーム分の推論結果
#[derive(Debug, Clone, Default)]
pub struct PoseSample {
    /// 検出された人物。先頭以外は無視する。
    pub poses: Vec<Pose>,
    pub segmentation: Option<SegmentationMask>,
}

impl PoseSample {
    pub fn new(poses: Vec<Pose>, segmentation: Option<SegmentationMask>) -> Self {
        Self { poses, segmentation }
    }

    pub fn single(pose: Pose) -> Self {
        Self::new(vec![pose], None)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 描画対象の人物（空のポーズは未検出扱い）
    pub fn primary(&self) -> Option<&Pose> {
        self.poses.first().filter(|p| !p.is_empty())
    }
}

/// 外部の姿勢・セグメンテーション推定モデル
///
/// 結果は非同期で返る。キャンセルは協調的で、呼び出し側は
/// 不要になった結果を捨てるだけ。
pub trait PoseProvider: Send + Sync {
    /// モデルの初期化が完了しているか
    fn is_ready(&self) -> bool;

    /// `threshold` 未満のキーポイントは欠損として返す
    fn estimate<'a>(
        &'a self,
        frame: &'a VideoFrame,
        threshold: f32,
    ) -> BoxFuture<'a, anyhow::Result<PoseSample>>;
}

/// 同期推論を `estimate` の戻り値に包む
///
/// 推論中は `block_in_place` でワーカーを明け渡すので、他のタスクは止まらない。
/// マルチスレッドランタイム上でのみ呼べる。
pub fn estimate_in_place<'a, F>(infer: F) -> BoxFuture<'a, anyhow::Result<PoseSample>>
where
    F: FnOnce() -> anyhow::Result<PoseSample> + Send + 'a,
{
    async move { tokio::task::block_in_place(infer) }.boxed()
}
