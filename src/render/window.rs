use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::pose::Pose;
use crate::render::skeleton::{KEYPOINT_COLOR, SKELETON_COLOR, SKELETON_CONNECTIONS};

/// minifbを使用したプレビューウィンドウ
pub struct MinifbRenderer {
    window: Window,
    title: String,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            title: title.to_string(),
            buffer: vec![0u32; width * height],
            width,
            height,
        })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// 今回押されたキー（リピートなし）
    pub fn pressed_keys(&self) -> Vec<Key> {
        self.window.get_keys_pressed(KeyRepeat::No)
    }

    /// 合成済みの 0RGB バッファを取り込む
    pub fn set_buffer(&mut self, buffer: Vec<u32>) {
        if buffer.len() == self.width * self.height {
            self.buffer = buffer;
        }
    }

    /// ヒント・状態はタイトルに表示する
    pub fn set_status(&mut self, status: Option<&str>) {
        match status {
            Some(s) => self.window.set_title(&format!("{} - {}", self.title, s)),
            None => self.window.set_title(&self.title),
        }
    }

    /// 骨格をミラー座標で描画（デバッグ用）
    pub fn draw_pose(&mut self, pose: &Pose) {
        let w = self.width as i32;
        let mirror = |(x, y): (i32, i32)| (w - 1 - x, y);

        for (start_idx, end_idx) in SKELETON_CONNECTIONS.iter() {
            if let (Some(start), Some(end)) = (pose.get(*start_idx), pose.get(*end_idx)) {
                let (x1, y1) = mirror(start.to_pixel());
                let (x2, y2) = mirror(end.to_pixel());
                self.draw_line(x1, y1, x2, y2, SKELETON_COLOR);
            }
        }

        for index in crate::pose::KeypointIndex::ALL {
            if let Some(kp) = pose.get(index) {
                let (px, py) = mirror(kp.to_pixel());
                self.draw_circle(px, py, 3, KEYPOINT_COLOR);
            }
        }
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    /// Bresenhamのアルゴリズムで線を描画
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}
