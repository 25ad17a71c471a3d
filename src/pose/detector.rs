use anyhow::{Context, Result};
use futures::future::BoxFuture;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::preprocess::preprocess_for_movenet;
use super::provider::{estimate_in_place, PoseProvider, PoseSample};
use crate::camera::VideoFrame;

/// MoveNet を使用した姿勢検出器
pub struct PoseDetector {
    session: Session,
}

impl PoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self { session })
    }

    /// 前処理済みテンソルから正規化座標のキーポイントを検出
    ///
    /// 入力: [1, 192, 192, 3] の f32 テンソル
    pub fn detect(&mut self, input: Array4<f32>) -> Result<[Keypoint; KeypointIndex::COUNT]> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // MoveNet の出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (i, kp) in keypoints.iter_mut().enumerate() {
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let confidence = output[[0, 0, i, 2]];
            *kp = Keypoint::new(x, y, confidence);
        }

        Ok(keypoints)
    }
}

/// MoveNet 単人物モデルによる `PoseProvider`（セグメンテーションなし）
pub struct MoveNetProvider {
    detector: Mutex<PoseDetector>,
}

impl MoveNetProvider {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            detector: Mutex::new(PoseDetector::new(model_path)?),
        })
    }

    fn estimate_blocking(&self, frame: &VideoFrame, threshold: f32) -> Result<PoseSample> {
        let input = preprocess_for_movenet(&frame.image);
        let raw = {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| anyhow::anyhow!("pose detector lock poisoned"))?;
            detector.detect(input)?
        };

        let pose = Pose::from_scores(&raw, threshold).scaled(frame.width(), frame.height());
        if pose.is_empty() {
            return Ok(PoseSample::empty());
        }
        Ok(PoseSample::single(pose))
    }
}

impl PoseProvider for MoveNetProvider {
    fn is_ready(&self) -> bool {
        true
    }

    fn estimate<'a>(
        &'a self,
        frame: &'a VideoFrame,
        threshold: f32,
    ) -> BoxFuture<'a, Result<PoseSample>> {
        estimate_in_place(move || self.estimate_blocking(frame, threshold))
    }
}
