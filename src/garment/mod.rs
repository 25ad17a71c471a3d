pub mod adjustment;
pub mod asset;
pub mod category;

pub use adjustment::{AdjustmentField, FitAdjustment};
pub use asset::{AssetError, AssetProcessor, BackgroundFilter, FileImageSource, GarmentAsset, ImageSource, ThresholdFilter};
pub use category::{CatalogImage, CatalogItem, GarmentCategory};
