//! ポーズとキャリブレーション値から衣服の描画矩形を求める純粋関数群。
//!
//! 座標はすべてミラー前のフレームピクセル座標。ミラー反転は描画側で行う。

use crate::garment::{FitAdjustment, GarmentCategory};
use crate::pose::{Keypoint, KeypointIndex, Pose};

/// 上半身: 肩幅に対する幅倍率
const TORSO_WIDTH_FACTOR: f32 = 2.0;
/// 上半身: 胴の長さに対する高さ倍率
const TORSO_HEIGHT_FACTOR: f32 = 1.4;
/// 肘幅はシルエット推定用に 0.8 倍して使う
const ELBOW_SPAN_FACTOR: f32 = 0.8;
const LOWER_WIDTH_FACTOR: f32 = 1.5;
const LOWER_HEIGHT_FACTOR: f32 = 1.05;
/// 下半身の上端はヒップラインから脚長の 2% 下
const LOWER_TOP_DROP: f32 = 0.02;
const FULL_WIDTH_FACTOR: f32 = 2.2;
const FULL_HEIGHT_FACTOR: f32 = 1.02;
/// 全身の上端は肩ラインから身長の 5% 上
const FULL_TOP_RISE: f32 = 0.05;
/// 両目の間隔 × 5 ≒ 顔幅
const FACE_WIDTH_FACTOR: f32 = 5.0;

/// フレームサイズ（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSize {
    pub width: f32,
    pub height: f32,
}

impl FrameSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width as f32, height as f32)
    }
}

/// 1フレーム分の描画位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// 矩形左上
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// 矩形中心まわりの回転
    pub rotation_radians: f32,
}

impl Placement {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    fn is_drawable(&self) -> bool {
        let finite = [self.x, self.y, self.width, self.height, self.rotation_radians]
            .iter()
            .all(|v| v.is_finite());
        finite && self.width > 0.0 && self.height > 0.0
    }
}

/// 調整値のうちカテゴリ別矩形に効く倍率
///
/// neckline / length はそのカテゴリで使わない場合 0 / 1 になる。
struct Fit {
    width: f32,
    height: f32,
    /// 基準長に対する比率
    neckline: f32,
    length: f32,
}

impl Fit {
    fn new(category: GarmentCategory, adj: &FitAdjustment) -> Self {
        Self {
            width: adj.width * adj.scale,
            height: adj.height * adj.scale,
            neckline: if category.uses_neckline() { adj.neckline_offset / 100.0 } else { 0.0 },
            length: if category.uses_length() { 1.0 + adj.length_offset / 100.0 } else { 1.0 },
        }
    }
}

/// カテゴリ別の基本矩形（オフセット適用前）
struct BaseRect {
    center_x: f32,
    top: f32,
    width: f32,
    height: f32,
}

/// 衣服の描画位置を計算
///
/// 必須キーポイントが欠けている場合、または幾何が退化している場合は None。
/// `asset_aspect` (幅/高さ) はアクセサリーの縦横比維持にのみ使う。
pub fn compute_placement(
    category: GarmentCategory,
    pose: &Pose,
    adjustment: &FitAdjustment,
    frame: FrameSize,
    asset_aspect: f32,
) -> Option<Placement> {
    let adj = adjustment.clamped();
    let fit = Fit::new(category, &adj);

    let base = match category {
        GarmentCategory::Torso => torso(pose, &fit)?,
        GarmentCategory::LowerBody => lower_body(pose, &fit)?,
        GarmentCategory::FullBody => full_body(pose, &fit)?,
        GarmentCategory::Accessory => accessory(pose, asset_aspect, &fit)?,
    };

    let placement = Placement {
        x: base.center_x - base.width / 2.0 + adj.x_offset / 100.0 * frame.width,
        y: base.top + adj.y_offset / 100.0 * frame.height,
        width: base.width,
        height: base.height,
        rotation_radians: adj.rotation.to_radians(),
    };

    placement.is_drawable().then_some(placement)
}

fn required(pose: &Pose, index: KeypointIndex) -> Option<Keypoint> {
    pose.get(index).copied().filter(|kp| kp.x.is_finite() && kp.y.is_finite())
}

fn pair(pose: &Pose, left: KeypointIndex, right: KeypointIndex) -> Option<(Keypoint, Keypoint)> {
    Some((required(pose, left)?, required(pose, right)?))
}

fn torso(pose: &Pose, fit: &Fit) -> Option<BaseRect> {
    let (ls, rs) = pair(pose, KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder)?;
    let (lh, rh) = pair(pose, KeypointIndex::LeftHip, KeypointIndex::RightHip)?;

    let shoulder_width = (rs.x - ls.x).abs();
    let effective_width = match pair(pose, KeypointIndex::LeftElbow, KeypointIndex::RightElbow) {
        Some((le, re)) => shoulder_width.max((re.x - le.x).abs() * ELBOW_SPAN_FACTOR),
        None => shoulder_width,
    };

    let shoulder_y = ls.y.min(rs.y);
    let torso_height = lh.y.max(rh.y) - shoulder_y;
    let height = torso_height * TORSO_HEIGHT_FACTOR * fit.height;

    // 肩ラインから胴の 1/4 下をアンカーにし、衣服の上 1/4 をその上に出す
    let anchor_y = shoulder_y + torso_height * 0.25 + fit.neckline * torso_height;

    Some(BaseRect {
        center_x: (ls.x + rs.x) / 2.0,
        top: anchor_y - height * 0.25,
        width: effective_width * TORSO_WIDTH_FACTOR * fit.width,
        height,
    })
}

fn lower_body(pose: &Pose, fit: &Fit) -> Option<BaseRect> {
    let (lh, rh) = pair(pose, KeypointIndex::LeftHip, KeypointIndex::RightHip)?;
    let (la, ra) = pair(pose, KeypointIndex::LeftAnkle, KeypointIndex::RightAnkle)?;

    let hip_width = (rh.x - lh.x).abs();
    let hip_y = lh.y.min(rh.y);
    let leg_length = la.y.max(ra.y) - hip_y;

    // length は高さのみ伸縮し、上端は動かさない
    Some(BaseRect {
        center_x: (lh.x + rh.x) / 2.0,
        top: hip_y + leg_length * LOWER_TOP_DROP,
        width: hip_width * LOWER_WIDTH_FACTOR * fit.width,
        height: leg_length * LOWER_HEIGHT_FACTOR * fit.height * fit.length,
    })
}

fn full_body(pose: &Pose, fit: &Fit) -> Option<BaseRect> {
    let (ls, rs) = pair(pose, KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder)?;
    let (la, ra) = pair(pose, KeypointIndex::LeftAnkle, KeypointIndex::RightAnkle)?;

    let shoulder_width = (rs.x - ls.x).abs();
    let silhouette_width = match pair(pose, KeypointIndex::LeftHip, KeypointIndex::RightHip) {
        Some((lh, rh)) => shoulder_width.max((rh.x - lh.x).abs()),
        None => shoulder_width,
    };

    let shoulder_y = ls.y.min(rs.y);
    let body_height = la.y.max(ra.y) - shoulder_y;

    Some(BaseRect {
        center_x: (ls.x + rs.x) / 2.0,
        top: shoulder_y - body_height * FULL_TOP_RISE + fit.neckline * body_height,
        width: silhouette_width * FULL_WIDTH_FACTOR * fit.width,
        height: body_height * FULL_HEIGHT_FACTOR * fit.height * fit.length,
    })
}

fn accessory(pose: &Pose, asset_aspect: f32, fit: &Fit) -> Option<BaseRect> {
    if !(asset_aspect.is_finite() && asset_aspect > 0.0) {
        return None;
    }
    let nose = required(pose, KeypointIndex::Nose)?;
    let (le, re) = pair(pose, KeypointIndex::LeftEye, KeypointIndex::RightEye)?;

    let face_width = (re.x - le.x).abs() * FACE_WIDTH_FACTOR;
    let height = face_width / asset_aspect * fit.height;

    Some(BaseRect {
        center_x: nose.x,
        top: nose.y - height / 2.0,
        width: face_width * fit.width,
        height,
    })
}
