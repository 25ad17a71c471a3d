use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RenderConfig {
    /// 描画ループの周期 (Hz)
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: f32,
    /// キーポイント採用の信頼度閾値
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// セグメンテーションがある場合、体の外側を描かない
    #[serde(default)]
    pub clip_to_body: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AssetConfig {
    /// 加工済み画像キャッシュの上限 (bytes, 0 = 無制限)
    #[serde(default = "default_cache_budget")]
    pub cache_budget_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SmoothingConfig {
    #[serde(default = "default_smoothing_enabled")]
    pub enabled: bool,
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    #[serde(default = "default_beta")]
    pub beta: f32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: String,
}

fn default_refresh_hz() -> f32 { 60.0 }
fn default_confidence_threshold() -> f32 { 0.3 }
fn default_cache_budget() -> usize { 256 * 1024 * 1024 }
fn default_storage_dir() -> String { "tryon-data".to_string() }
fn default_smoothing_enabled() -> bool { true }
fn default_min_cutoff() -> f32 { 1.5 }
fn default_beta() -> f32 { 0.3 }
fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            confidence_threshold: default_confidence_threshold(),
            clip_to_body: false,
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: default_cache_budget(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: default_smoothing_enabled(),
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid config")?;
        Ok(config)
    }

    /// ファイルが無ければデフォルト。壊れている場合は警告してデフォルト。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }
}
