use image::{Rgba, RgbImage, RgbaImage};
use nalgebra::{Matrix3, Point2, Rotation2, Vector2};

use crate::garment::GarmentAsset;
use crate::placement::Placement;
use crate::pose::{Pose, SegmentationMask};

/// 人物未検出時に表示するヒント
pub const STAND_BACK_HINT: &str = "Please stand back so your full body is visible";

/// 描画先サーフェス
pub trait Canvas {
    fn size(&self) -> (u32, u32);

    /// 前フレームの内容（ヒント含む）を全て消す
    fn clear(&mut self);

    fn show_hint(&mut self, text: &str);

    /// source-over 合成で 1 ピクセル描く
    fn blend_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>);
}

/// `render` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// 人物なし。ヒントのみ表示
    NoBody,
    /// アセット未ロード。何も描かない
    AssetPending,
    /// 必須キーポイント不足。何も描かない
    NoPlacement,
    /// 衣服を描画した
    Drawn,
}

/// ミラー表示のカメラ映像に衣服画像を重ねる
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor {
    /// セグメンテーションがある場合、背景ピクセルには描かない
    pub clip_to_body: bool,
}

impl Compositor {
    pub fn new(clip_to_body: bool) -> Self {
        Self { clip_to_body }
    }

    /// 1フレーム分を描画。毎回クリアするので前フレームの内容は残らない。
    pub fn render<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        pose: Option<&Pose>,
        segmentation: Option<&SegmentationMask>,
        asset: Option<&GarmentAsset>,
        placement: Option<Placement>,
    ) -> RenderOutcome {
        canvas.clear();

        if pose.map_or(true, Pose::is_empty) {
            canvas.show_hint(STAND_BACK_HINT);
            return RenderOutcome::NoBody;
        }
        let Some(asset) = asset else {
            return RenderOutcome::AssetPending;
        };
        let Some(placement) = placement else {
            return RenderOutcome::NoPlacement;
        };

        let mask = if self.clip_to_body { segmentation } else { None };
        draw_asset(canvas, &asset.surface, &placement, mask);
        RenderOutcome::Drawn
    }
}

/// 衣服画像ピクセル → ミラー後の出力ピクセルへの変換
///
/// 画像を矩形サイズに拡大縮小し、矩形中心まわりに回転し、最後に左右反転する。
pub fn placement_transform(placement: &Placement, source: (u32, u32), frame_width: f32) -> Matrix3<f32> {
    let (src_w, src_h) = (source.0.max(1) as f32, source.1.max(1) as f32);
    let (cx, cy) = placement.center();

    let scale = Matrix3::new_nonuniform_scaling(&Vector2::new(placement.width / src_w, placement.height / src_h));
    let to_center = Matrix3::new_translation(&Vector2::new(-placement.width / 2.0, -placement.height / 2.0));
    let rotate = Rotation2::new(placement.rotation_radians).to_homogeneous();
    let to_frame = Matrix3::new_translation(&Vector2::new(cx, cy));
    let mirror = Matrix3::new(
        -1.0, 0.0, frame_width,
        0.0, 1.0, 0.0,
        0.0, 0.0, 1.0,
    );

    mirror * to_frame * rotate * to_center * scale
}

/// 逆写像（最近傍サンプリング）で描画する
fn draw_asset<C: Canvas + ?Sized>(
    canvas: &mut C,
    surface: &RgbaImage,
    placement: &Placement,
    mask: Option<&SegmentationMask>,
) {
    let (canvas_w, canvas_h) = canvas.size();
    let (src_w, src_h) = surface.dimensions();
    if canvas_w == 0 || canvas_h == 0 || src_w == 0 || src_h == 0 {
        return;
    }

    let forward = placement_transform(placement, (src_w, src_h), canvas_w as f32);
    let Some(inverse) = forward.try_inverse() else {
        return;
    };

    // 変換後の 4 隅からバウンディングボックスを求める
    let corners = [(0.0, 0.0), (src_w as f32, 0.0), (0.0, src_h as f32), (src_w as f32, src_h as f32)];
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for (u, v) in corners {
        let p = forward.transform_point(&Point2::new(u, v));
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(canvas_w);
    let y1 = (max_y.ceil().max(0.0) as u32).min(canvas_h);

    for y in y0..y1 {
        for x in x0..x1 {
            let src = inverse.transform_point(&Point2::new(x as f32 + 0.5, y as f32 + 0.5));
            if src.x < 0.0 || src.y < 0.0 || src.x >= src_w as f32 || src.y >= src_h as f32 {
                continue;
            }
            let color = *surface.get_pixel(src.x as u32, src.y as u32);
            if color[3] == 0 {
                continue;
            }
            if let Some(mask) = mask {
                if !mask_allows(mask, x, y, canvas_w, canvas_h) {
                    continue;
                }
            }
            canvas.blend_pixel(x, y, color);
        }
    }
}

/// 出力はミラー済みなのでマスク参照時に x を反転する
fn mask_allows(mask: &SegmentationMask, x: u32, y: u32, canvas_w: u32, canvas_h: u32) -> bool {
    let frame_x = canvas_w - 1 - x;
    let mx = (frame_x as u64 * mask.width as u64 / canvas_w as u64) as u32;
    let my = (y as u64 * mask.height as u64 / canvas_h as u64) as u32;
    mask.is_body(mx, my)
}

/// source-over: out = src * a + dst * (1 - a)
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

/// RGBA ソフトウェアサーフェス（透明で初期化されるオーバーレイ）
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    pixels: RgbaImage,
    hint: Option<String>,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            hint: None,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// フレームサイズが変わったら作り直す
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() != (width, height) {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    /// ミラーしたカメラ映像にオーバーレイを重ね、0RGB の u32 バッファで返す
    pub fn over_mirrored_frame(&self, frame: &RgbImage) -> Vec<u32> {
        let (w, h) = self.pixels.dimensions();
        let (fw, fh) = frame.dimensions();
        let mut buffer = vec![0u32; w as usize * h as usize];
        for y in 0..h.min(fh) {
            for x in 0..w.min(fw) {
                let cam = frame.get_pixel(fw - 1 - x, y);
                let base = Rgba([cam[0], cam[1], cam[2], 255]);
                let px = blend_over(base, *self.pixels.get_pixel(x, y));
                buffer[(y * w + x) as usize] = ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32;
            }
        }
        buffer
    }
}

impl Canvas for PixelCanvas {
    fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        self.hint = None;
    }

    fn show_hint(&mut self, text: &str) {
        self.hint = Some(text.to_string());
    }

    fn blend_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        if x < self.pixels.width() && y < self.pixels.height() {
            let dst = *self.pixels.get_pixel(x, y);
            self.pixels.put_pixel(x, y, blend_over(dst, color));
        }
    }
}
