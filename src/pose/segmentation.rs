/// 背景を表すラベル値
pub const BACKGROUND_LABEL: i32 = -1;

/// フレームに揃えたピクセル単位の部位ラベル
///
/// ラベル `-1` は背景、それ以外は部位 ID。
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<i32>,
}

impl SegmentationMask {
    /// `labels.len() != width * height` の場合は None
    pub fn new(width: u32, height: u32, labels: Vec<i32>) -> Option<Self> {
        if labels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, labels })
    }

    pub fn label_at(&self, x: u32, y: u32) -> Option<i32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.labels.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// (x, y) が人物領域か。範囲外は背景扱い。
    pub fn is_body(&self, x: u32, y: u32) -> bool {
        matches!(self.label_at(x, y), Some(label) if label != BACKGROUND_LABEL)
    }
}
