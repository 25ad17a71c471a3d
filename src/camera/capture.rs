use anyhow::{Context, Result};
use image::RgbImage;
use opencv::{
    core::{Mat, Vec3b},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::{FrameSource, VideoFrame};

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度を指定してカメラを開く
    pub fn open(index: i32, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        tracing::info!(index, actual_width, actual_height, "camera opened");

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// BGR Mat を RGB 画像に変換
pub fn mat_to_rgb(frame: &Mat) -> Result<RgbImage> {
    let width = frame.cols() as u32;
    let height = frame.rows() as u32;
    let mut image = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let px = frame.at_2d::<Vec3b>(y as i32, x as i32)?;
            image.put_pixel(x, y, image::Rgb([px[2], px[1], px[0]]));
        }
    }
    Ok(image)
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    active: Arc<AtomicBool>,
    width: u32,
    height: u32,
    _handle: thread::JoinHandle<()>,
}

impl ThreadedCamera {
    pub fn start(index: i32, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let mut camera = OpenCvCamera::open(index, width, height)?;
        let (w, h) = camera.resolution();
        let latest = Arc::new(Mutex::new(None::<VideoFrame>));
        let latest_ref = latest.clone();
        let active = Arc::new(AtomicBool::new(true));
        let active_ref = active.clone();
        let frame_id = AtomicU64::new(0);

        let handle = thread::spawn(move || {
            while active_ref.load(Ordering::Acquire) {
                let frame = camera.read_frame().and_then(|m| mat_to_rgb(&m));
                match frame {
                    Ok(rgb) => {
                        let id = frame_id.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Ok(mut guard) = latest_ref.lock() {
                            *guard = Some(VideoFrame::new(id, rgb));
                        }
                    }
                    Err(e) => tracing::debug!("camera read error: {e:#}"),
                }
            }
        });

        Ok(Self {
            latest,
            active,
            width: w,
            height: h,
            _handle: handle,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// キャプチャスレッドを停止
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl FrameSource for ThreadedCamera {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// フレームは保持されるので何度でも取得可能。初回フレーム到着前のみNone。
    fn current_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
