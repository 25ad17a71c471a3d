use serde::{Deserialize, Serialize};

use crate::pose::KeypointIndex;

/// 配置計算の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GarmentCategory {
    /// シャツ・セーター・ジャケット・コート
    Torso,
    /// パンツ
    LowerBody,
    /// ワンピース
    FullBody,
    /// メガネ・帽子・アクセサリー
    Accessory,
}

impl GarmentCategory {
    /// カタログのカテゴリ名から判定。試着対象外なら None。
    pub fn from_catalog(category: &str) -> Option<Self> {
        let normalized = category.trim().to_ascii_lowercase();
        Self::match_name(&normalized)
            .or_else(|| normalized.strip_suffix("es").and_then(Self::match_name))
            .or_else(|| normalized.strip_suffix('s').and_then(Self::match_name))
    }

    fn match_name(name: &str) -> Option<Self> {
        match name {
            "shirt" | "t-shirt" | "tshirt" | "top" | "sweater" | "hoodie" | "jacket" | "coat"
            | "blouse" => Some(Self::Torso),
            "pants" | "trousers" | "jeans" | "shorts" | "skirt" | "leggings" => {
                Some(Self::LowerBody)
            }
            "dress" | "jumpsuit" | "gown" | "romper" => Some(Self::FullBody),
            "glasses" | "sunglasses" | "hat" | "cap" | "jewelry" | "jewellery" | "necklace"
            | "earring" | "earrings" => Some(Self::Accessory),
            _ => None,
        }
    }

    /// 配置に必須のキーポイント
    pub fn required_keypoints(self) -> &'static [KeypointIndex] {
        use KeypointIndex::*;
        match self {
            Self::Torso => &[LeftShoulder, RightShoulder, LeftHip, RightHip],
            Self::LowerBody => &[LeftHip, RightHip, LeftAnkle, RightAnkle],
            Self::FullBody => &[LeftShoulder, RightShoulder, LeftAnkle, RightAnkle],
            Self::Accessory => &[Nose, LeftEye, RightEye],
        }
    }

    /// neckline_offset が効くか
    pub fn uses_neckline(self) -> bool {
        matches!(self, Self::Torso | Self::FullBody)
    }

    /// length_offset が効くか
    pub fn uses_length(self) -> bool {
        matches!(self, Self::LowerBody | Self::FullBody)
    }
}

/// カタログの商品画像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogImage {
    pub url: String,
    #[serde(default)]
    pub is_main_image: bool,
}

/// 選択中の商品（カタログから渡される読み取り専用データ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub item_id: String,
    pub category: String,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
}

impl CatalogItem {
    pub fn garment_category(&self) -> Option<GarmentCategory> {
        GarmentCategory::from_catalog(&self.category)
    }

    /// メイン画像、無ければ先頭の画像
    pub fn primary_image_url(&self) -> Option<&str> {
        self.images
            .iter()
            .find(|img| img.is_main_image)
            .or_else(|| self.images.first())
            .map(|img| img.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_catalog() {
        assert_eq!(GarmentCategory::from_catalog("Shirts"), Some(GarmentCategory::Torso));
        assert_eq!(GarmentCategory::from_catalog("coat"), Some(GarmentCategory::Torso));
        assert_eq!(GarmentCategory::from_catalog("PANTS"), Some(GarmentCategory::LowerBody));
        assert_eq!(GarmentCategory::from_catalog("Dresses"), Some(GarmentCategory::FullBody));
        assert_eq!(GarmentCategory::from_catalog(" hats "), Some(GarmentCategory::Accessory));
        assert_eq!(GarmentCategory::from_catalog("glasses"), Some(GarmentCategory::Accessory));
        assert_eq!(GarmentCategory::from_catalog("furniture"), None);
    }

    #[test]
    fn test_offset_applicability() {
        assert!(GarmentCategory::Torso.uses_neckline());
        assert!(!GarmentCategory::Torso.uses_length());
        assert!(GarmentCategory::LowerBody.uses_length());
        assert!(GarmentCategory::FullBody.uses_neckline() && GarmentCategory::FullBody.uses_length());
        assert!(!GarmentCategory::Accessory.uses_neckline());
    }

    #[test]
    fn test_primary_image_url() {
        let mut item = CatalogItem {
            item_id: "sku-1".into(),
            category: "shirts".into(),
            images: vec![
                CatalogImage { url: "a.png".into(), is_main_image: false },
                CatalogImage { url: "b.png".into(), is_main_image: true },
            ],
        };
        assert_eq!(item.primary_image_url(), Some("b.png"));

        item.images[1].is_main_image = false;
        assert_eq!(item.primary_image_url(), Some("a.png"));

        item.images.clear();
        assert_eq!(item.primary_image_url(), None);
    }

    #[test]
    fn test_catalog_item_json() {
        let item: CatalogItem = serde_json::from_str(
            r#"{"itemId":"x","category":"pants","images":[{"url":"p.png","isMainImage":true}]}"#,
        )
        .unwrap();
        assert_eq!(item.garment_category(), Some(GarmentCategory::LowerBody));
        assert_eq!(item.primary_image_url(), Some("p.png"));
    }
}
