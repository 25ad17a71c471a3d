use thiserror::Error;

use super::store::{CalibrationStore, StoreError};
use crate::garment::{AdjustmentField, CatalogItem, FitAdjustment, GarmentCategory};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no garment selected")]
    NoSelection,
    #[error("no unsaved changes")]
    NotDirty,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 選択中アイテムの編集状態
#[derive(Debug, Clone, PartialEq)]
pub struct Viewing {
    pub item_id: String,
    pub category: Option<GarmentCategory>,
    /// 作業用コピー。`save` するまでストアには反映されない
    pub active: FitAdjustment,
    pub is_dirty: bool,
    /// ストアに保存済みの値があるか
    pub has_stored: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    NoSelection,
    Viewing(Viewing),
}

/// 選択中の衣服のキャリブレーション編集セッション
///
/// ストアは各操作の引数で受け取る。`active` がストアに書かれるのは `save` のみ。
#[derive(Debug, Default)]
pub struct CalibrationSession {
    state: SessionState,
}

impl CalibrationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn viewing(&self) -> Option<&Viewing> {
        match &self.state {
            SessionState::Viewing(v) => Some(v),
            SessionState::NoSelection => None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        self.viewing().map(|v| v.item_id.as_str())
    }

    pub fn active_adjustment(&self) -> Option<FitAdjustment> {
        self.viewing().map(|v| v.active)
    }

    pub fn is_dirty(&self) -> bool {
        self.viewing().is_some_and(|v| v.is_dirty)
    }

    /// 保存済みの値、無ければデフォルト値で編集を開始する。未保存の編集は捨てる。
    pub fn select(&mut self, item_id: &str, store: &CalibrationStore) {
        self.select_with_category(item_id, None, store);
    }

    /// カタログの商品を選択（カテゴリも保持する）
    pub fn select_item(&mut self, item: &CatalogItem, store: &CalibrationStore) {
        self.select_with_category(&item.item_id, item.garment_category(), store);
    }

    fn select_with_category(&mut self, item_id: &str, category: Option<GarmentCategory>, store: &CalibrationStore) {
        let stored = store.get(item_id);
        tracing::debug!(item_id, has_stored = stored.is_some(), "garment selected");
        self.state = SessionState::Viewing(Viewing {
            item_id: item_id.to_string(),
            category,
            active: stored.unwrap_or_default(),
            is_dirty: false,
            has_stored: stored.is_some(),
        });
    }

    /// 値域に丸めて設定し、格納した値を返す
    pub fn adjust(&mut self, field: AdjustmentField, value: f32) -> Result<f32, SessionError> {
        let viewing = self.viewing_mut()?;
        let stored = viewing.active.set(field, value);
        viewing.is_dirty = true;
        Ok(stored)
    }

    /// デフォルト値に戻す（保存済みの値ではない）
    ///
    /// 保存済みかどうかは選択時ではなく現在のストアで判定する。
    pub fn reset(&mut self, store: &CalibrationStore) -> Result<(), SessionError> {
        let viewing = self.viewing_mut()?;
        viewing.active = FitAdjustment::default();
        viewing.has_stored = store.get(&viewing.item_id).is_some();
        if viewing.has_stored {
            viewing.is_dirty = true;
        }
        Ok(())
    }

    /// 作業用コピーをストアに保存する
    ///
    /// 永続化に失敗してもストアのメモリ上の値は更新済みなので、
    /// dirty は解除した上でエラーを返す。
    pub fn save(&mut self, store: &mut CalibrationStore) -> Result<(), SessionError> {
        let viewing = self.viewing_mut()?;
        if !viewing.is_dirty {
            return Err(SessionError::NotDirty);
        }
        let result = store.set(&viewing.item_id, viewing.active);
        viewing.is_dirty = false;
        viewing.has_stored = true;
        tracing::info!(item_id = %viewing.item_id, "calibration saved");
        result.map_err(SessionError::from)
    }

    /// 保存済みの値を削除し、デフォルト値に戻す
    pub fn delete_saved(&mut self, store: &mut CalibrationStore) -> Result<(), SessionError> {
        let viewing = self.viewing_mut()?;
        let result = store.delete(&viewing.item_id);
        viewing.active = FitAdjustment::default();
        viewing.is_dirty = false;
        viewing.has_stored = false;
        tracing::info!(item_id = %viewing.item_id, "calibration deleted");
        result.map(|_| ()).map_err(SessionError::from)
    }

    /// 選択解除。未保存の編集は黙って捨てる。
    pub fn deselect(&mut self) {
        if self.is_dirty() {
            tracing::debug!("discarding unsaved calibration edits");
        }
        self.state = SessionState::NoSelection;
    }

    fn viewing_mut(&mut self) -> Result<&mut Viewing, SessionError> {
        match &mut self.state {
            SessionState::Viewing(v) => Ok(v),
            SessionState::NoSelection => Err(SessionError::NoSelection),
        }
    }
}
