use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// 調整可能なフィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjustmentField {
    Scale,
    Width,
    Height,
    XOffset,
    YOffset,
    Rotation,
    NecklineOffset,
    LengthOffset,
}

impl AdjustmentField {
    pub const ALL: [AdjustmentField; 8] = [
        Self::Scale,
        Self::Width,
        Self::Height,
        Self::XOffset,
        Self::YOffset,
        Self::Rotation,
        Self::NecklineOffset,
        Self::LengthOffset,
    ];

    /// 宣言された値域（両端含む）
    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            Self::Scale => 0.5..=1.5,
            Self::Width | Self::Height => 0.6..=1.4,
            Self::XOffset | Self::YOffset | Self::Rotation => -20.0..=20.0,
            Self::NecklineOffset | Self::LengthOffset => -10.0..=10.0,
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            Self::Scale | Self::Width | Self::Height => 1.0,
            _ => 0.0,
        }
    }

    /// 値域に丸める。NaN はデフォルト値になる。
    pub fn clamp(self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default_value();
        }
        let range = self.range();
        value.clamp(*range.start(), *range.end())
    }

    /// 交換ファイル上のフィールド名
    pub fn name(self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Width => "width",
            Self::Height => "height",
            Self::XOffset => "xOffset",
            Self::YOffset => "yOffset",
            Self::Rotation => "rotation",
            Self::NecklineOffset => "necklineOffset",
            Self::LengthOffset => "lengthOffset",
        }
    }
}

impl fmt::Display for AdjustmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AdjustmentField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown adjustment field: {s}"))
    }
}

/// 1着分のキャリブレーション値
///
/// 欠けたフィールドはデフォルト値で補う。値域外の値は `clamped` で丸める。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FitAdjustment {
    pub scale: f32,
    pub width: f32,
    pub height: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    /// 度
    pub rotation: f32,
    /// 上半身・全身のみ
    pub neckline_offset: f32,
    /// 下半身・全身のみ
    pub length_offset: f32,
}

impl Default for FitAdjustment {
    fn default() -> Self {
        Self {
            scale: 1.0,
            width: 1.0,
            height: 1.0,
            x_offset: 0.0,
            y_offset: 0.0,
            rotation: 0.0,
            neckline_offset: 0.0,
            length_offset: 0.0,
        }
    }
}

impl FitAdjustment {
    pub fn get(&self, field: AdjustmentField) -> f32 {
        match field {
            AdjustmentField::Scale => self.scale,
            AdjustmentField::Width => self.width,
            AdjustmentField::Height => self.height,
            AdjustmentField::XOffset => self.x_offset,
            AdjustmentField::YOffset => self.y_offset,
            AdjustmentField::Rotation => self.rotation,
            AdjustmentField::NecklineOffset => self.neckline_offset,
            AdjustmentField::LengthOffset => self.length_offset,
        }
    }

    /// 値域に丸めて設定し、実際に格納した値を返す
    pub fn set(&mut self, field: AdjustmentField, value: f32) -> f32 {
        let value = field.clamp(value);
        let slot = match field {
            AdjustmentField::Scale => &mut self.scale,
            AdjustmentField::Width => &mut self.width,
            AdjustmentField::Height => &mut self.height,
            AdjustmentField::XOffset => &mut self.x_offset,
            AdjustmentField::YOffset => &mut self.y_offset,
            AdjustmentField::Rotation => &mut self.rotation,
            AdjustmentField::NecklineOffset => &mut self.neckline_offset,
            AdjustmentField::LengthOffset => &mut self.length_offset,
        };
        *slot = value;
        value
    }

    /// 全フィールドを値域に丸めたコピー
    pub fn clamped(&self) -> Self {
        let mut out = *self;
        for field in AdjustmentField::ALL {
            out.set(field, self.get(field));
        }
        out
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let adj = FitAdjustment::default();
        for field in AdjustmentField::ALL {
            assert_eq!(adj.get(field), field.default_value(), "{field}");
            assert!(field.range().contains(&field.default_value()));
        }
        assert!(adj.is_default());
    }

    #[test]
    fn test_set_clamps_to_nearest_boundary() {
        let mut adj = FitAdjustment::default();
        for field in AdjustmentField::ALL {
            let range = field.range();
            assert_eq!(adj.set(field, *range.end() + 100.0), *range.end());
            assert_eq!(adj.get(field), *range.end());
            assert_eq!(adj.set(field, *range.start() - 100.0), *range.start());
            assert_eq!(adj.get(field), *range.start());
        }
    }

    #[test]
    fn test_nan_clamps_to_default() {
        assert_eq!(AdjustmentField::Scale.clamp(f32::NAN), 1.0);
        assert_eq!(AdjustmentField::Rotation.clamp(f32::NAN), 0.0);
        assert_eq!(AdjustmentField::XOffset.clamp(f32::INFINITY), 20.0);
    }

    #[test]
    fn test_serde_camel_case_and_missing_fields() {
        let adj: FitAdjustment = serde_json::from_str(r#"{"scale": 1.2, "xOffset": 5}"#).unwrap();
        assert_eq!(adj.scale, 1.2);
        assert_eq!(adj.x_offset, 5.0);
        assert_eq!(adj.width, 1.0);

        let json = serde_json::to_value(FitAdjustment::default()).unwrap();
        assert!(json.get("necklineOffset").is_some());
        assert!(json.get("lengthOffset").is_some());
    }

    #[test]
    fn test_clamped_copy() {
        let adj = FitAdjustment {
            scale: 3.0,
            rotation: -45.0,
            ..FitAdjustment::default()
        };
        let c = adj.clamped();
        assert_eq!(c.scale, 1.5);
        assert_eq!(c.rotation, -20.0);
        assert_eq!(adj.scale, 3.0);
    }

    #[test]
    fn test_field_from_str() {
        assert_eq!("xoffset".parse::<AdjustmentField>(), Ok(AdjustmentField::XOffset));
        assert_eq!("lengthOffset".parse::<AdjustmentField>(), Ok(AdjustmentField::LengthOffset));
        assert!("depth".parse::<AdjustmentField>().is_err());
    }
}
