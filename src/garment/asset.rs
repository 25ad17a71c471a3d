//! Garment image loading, background stripping and the per-session asset cache.

use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch garment image {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode garment image {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("garment image {url} has no pixels")]
    Empty { url: String },
}

/// Decides which pixels of a garment photo are background.
///
/// The RGB threshold heuristic below is the default; an implementation backed
/// by a real alpha matte can replace it without touching placement or
/// compositing.
pub trait BackgroundFilter: Send + Sync {
    fn is_background(&self, pixel: Rgba<u8>) -> bool;

    /// Same-size copy with background pixels made fully transparent.
    fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            if self.is_background(*pixel) {
                pixel[3] = 0;
            }
        }
        out
    }
}

/// Fixed RGB thresholds: near-black, near-white and green-screen green.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdFilter {
    /// all channels below this are near-black
    pub black_below: u8,
    /// all channels above this are near-white
    pub white_above: u8,
}

impl Default for ThresholdFilter {
    fn default() -> Self {
        Self {
            black_below: 40,
            white_above: 240,
        }
    }
}

impl BackgroundFilter for ThresholdFilter {
    fn is_background(&self, pixel: Rgba<u8>) -> bool {
        let [r, g, b, _] = pixel.0;
        let near_black = r < self.black_below && g < self.black_below && b < self.black_below;
        let near_white = r > self.white_above && g > self.white_above && b > self.white_above;
        let green_screen = r < 100 && g > 180 && b < 100;
        near_black || near_white || green_screen
    }
}

/// Resolves an image URL to encoded bytes.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// Reads `file://` URLs and plain paths, relative paths resolved against `root`.
#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    root: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for FileImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        std::fs::read(self.resolve(url)).map_err(|source| AssetError::Fetch {
            url: url.to_string(),
            source,
        })
    }
}

/// A processed, transparency-corrected garment bitmap.
#[derive(Debug)]
pub struct GarmentAsset {
    pub source_url: String,
    pub surface: RgbaImage,
}

impl GarmentAsset {
    /// width / height of the source image
    pub fn aspect_ratio(&self) -> f32 {
        self.surface.width() as f32 / self.surface.height().max(1) as f32
    }

    pub fn byte_size(&self) -> usize {
        self.surface.as_raw().len()
    }
}

struct CacheEntry {
    asset: Arc<GarmentAsset>,
    last_used: u64,
}

/// URL-keyed cache bounded by total RGBA bytes; `budget_bytes == 0` never evicts.
struct AssetCache {
    entries: HashMap<String, CacheEntry>,
    budget_bytes: usize,
    total_bytes: usize,
    tick: u64,
}

impl AssetCache {
    fn new(budget_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            budget_bytes,
            total_bytes: 0,
            tick: 0,
        }
    }

    fn get(&mut self, url: &str) -> Option<Arc<GarmentAsset>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(url).map(|entry| {
            entry.last_used = tick;
            entry.asset.clone()
        })
    }

    /// A racing insert for the same URL keeps the first asset.
    fn insert(&mut self, asset: Arc<GarmentAsset>) -> Arc<GarmentAsset> {
        if let Some(existing) = self.get(&asset.source_url) {
            return existing;
        }

        let size = asset.byte_size();
        if self.budget_bytes > 0 {
            while self.total_bytes + size > self.budget_bytes && !self.entries.is_empty() {
                self.evict_lru();
            }
        }

        self.tick += 1;
        self.total_bytes += size;
        self.entries.insert(
            asset.source_url.clone(),
            CacheEntry {
                asset: asset.clone(),
                last_used: self.tick,
            },
        );
        asset
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(url, _)| url.clone());
        if let Some(url) = oldest {
            if let Some(entry) = self.entries.remove(&url) {
                self.total_bytes -= entry.asset.byte_size();
                tracing::debug!(%url, "evicted garment asset");
            }
        }
    }
}

/// Garment Asset Processor: owns the filter, the image source and the cache.
pub struct AssetProcessor {
    filter: Box<dyn BackgroundFilter>,
    source: Box<dyn ImageSource>,
    cache: Mutex<AssetCache>,
}

impl AssetProcessor {
    pub fn new(
        filter: Box<dyn BackgroundFilter>,
        source: Box<dyn ImageSource>,
        cache_budget_bytes: usize,
    ) -> Self {
        Self {
            filter,
            source,
            cache: Mutex::new(AssetCache::new(cache_budget_bytes)),
        }
    }

    /// Threshold filter reading from the local filesystem.
    pub fn with_defaults(cache_budget_bytes: usize) -> Self {
        Self::new(
            Box::new(ThresholdFilter::default()),
            Box::new(FileImageSource::new()),
            cache_budget_bytes,
        )
    }

    /// Strip the background of a fully loaded image.
    pub fn process(&self, image: &DynamicImage) -> RgbaImage {
        self.filter.apply(&image.to_rgba8())
    }

    /// Cached asset for `url`, if it has been loaded.
    pub fn get(&self, url: &str) -> Option<Arc<GarmentAsset>> {
        self.lock_cache().get(url)
    }

    /// Load, process and cache `url`. A cache hit skips fetching and processing.
    ///
    /// Failures leave the cache untouched; nothing retries automatically.
    /// Two concurrent first loads of the same URL may both process it.
    pub fn load(&self, url: &str) -> Result<Arc<GarmentAsset>, AssetError> {
        if let Some(asset) = self.get(url) {
            return Ok(asset);
        }

        let bytes = self.source.fetch(url)?;
        let image = image::load_from_memory(&bytes).map_err(|source| AssetError::Decode {
            url: url.to_string(),
            source,
        })?;
        self.insert_image(url, &image)
    }

    /// Process an already decoded image under `url`.
    pub fn insert_image(&self, url: &str, image: &DynamicImage) -> Result<Arc<GarmentAsset>, AssetError> {
        if let Some(asset) = self.get(url) {
            return Ok(asset);
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(AssetError::Empty {
                url: url.to_string(),
            });
        }

        let surface = self.process(image);
        tracing::info!(url, width = surface.width(), height = surface.height(), "garment asset processed");
        let asset = Arc::new(GarmentAsset {
            source_url: url.to_string(),
            surface,
        });
        Ok(self.lock_cache().insert(asset))
    }

    pub fn cached_count(&self) -> usize {
        self.lock_cache().entries.len()
    }

    pub fn cached_bytes(&self) -> usize {
        self.lock_cache().total_bytes
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, AssetCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
