#[cfg(feature = "desktop")]
pub mod capture;

use std::sync::Arc;

use image::RgbImage;

#[cfg(feature = "desktop")]
pub use capture::{OpenCvCamera, ThreadedCamera};

/// デコード済みのカメラフレーム（RGB、非ミラー）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub id: u64,
    pub image: Arc<RgbImage>,
}

impl VideoFrame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self {
            id,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// ライブ映像ソース
///
/// `is_active` が false の間、レンダーループは起動しない。
pub trait FrameSource: Send + Sync {
    fn is_active(&self) -> bool;

    /// 最新フレーム。初回フレーム到着前は None。
    fn current_frame(&self) -> Option<VideoFrame>;
}
