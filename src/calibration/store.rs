use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use super::exchange::{self, ExchangeError, ExportFile};
use super::storage::{KeyValueStorage, StorageError};
use crate::garment::FitAdjustment;
use crate::notify::Notifier;

/// 永続化に使うキー
pub const STORAGE_KEY: &str = "virtual-tryon-adjustments";

/// itemId → FitAdjustment
pub type CalibrationRecord = BTreeMap<String, FitAdjustment>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// メモリ上の値は更新済み（ロールバックしない）
    #[error("calibration saved for this session but could not be persisted: {0}")]
    Persist(#[source] StorageError),
    #[error("failed to serialize calibration data: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// インポートの失敗。読み込み失敗ならストアは変更されていない。
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// キャリブレーション値の所有者
///
/// 読み書きはメモリ上のコピーに対して同期的に行い、変更のたびに全体を
/// ストレージへ書き込む。書き込み失敗は `StoreError::Persist` で返すが、
/// メモリ上の値は戻さない。
pub struct CalibrationStore {
    storage: Box<dyn KeyValueStorage>,
    record: CalibrationRecord,
}

impl CalibrationStore {
    /// ストレージから読み込む。読めない・壊れているデータは空として扱う。
    pub fn open(storage: Box<dyn KeyValueStorage>) -> Self {
        let record = match storage.get(STORAGE_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<CalibrationRecord>(&json) {
                Ok(record) => record
                    .into_iter()
                    .map(|(id, adj)| (id, adj.clamped()))
                    .collect(),
                Err(e) => {
                    tracing::warn!("stored calibration data is corrupt, starting empty: {e}");
                    CalibrationRecord::new()
                }
            },
            Ok(None) => CalibrationRecord::new(),
            Err(e) => {
                tracing::warn!("failed to read stored calibration data: {e}");
                CalibrationRecord::new()
            }
        };
        tracing::info!(items = record.len(), "calibration store opened");
        Self { storage, record }
    }

    pub fn get(&self, item_id: &str) -> Option<FitAdjustment> {
        self.record.get(item_id).copied()
    }

    pub fn set(&mut self, item_id: &str, adjustment: FitAdjustment) -> Result<(), StoreError> {
        self.record.insert(item_id.to_string(), adjustment.clamped());
        self.persist()
    }

    /// 削除したら true
    pub fn delete(&mut self, item_id: &str) -> Result<bool, StoreError> {
        let removed = self.record.remove(item_id).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn get_all(&self) -> &CalibrationRecord {
        &self.record
    }

    /// インポート結果で丸ごと置き換える
    pub fn replace_all(&mut self, record: CalibrationRecord) -> Result<(), StoreError> {
        self.record = record
            .into_iter()
            .map(|(id, adj)| (id, adj.clamped()))
            .collect();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn export_to_file(&self, now: DateTime<Utc>) -> Result<ExportFile, ExchangeError> {
        exchange::export_record(&self.record, now)
    }

    /// `export_to_file` の結果を通知にも流す
    pub fn export(&self, now: DateTime<Utc>, notifier: &Notifier) -> Result<ExportFile, ExchangeError> {
        match self.export_to_file(now) {
            Ok(file) => {
                tracing::info!(items = self.record.len(), file = %file.file_name, "calibrations exported");
                notifier.success(format!("{} 件のキャリブレーションをエクスポートしました", self.record.len()));
                Ok(file)
            }
            Err(e) => {
                notifier.error(&e);
                Err(e)
            }
        }
    }

    /// エクスポートファイル（または旧形式の JSON）を読み込んで全体を置き換え、
    /// 件数を返す。結果は通知にも流す。
    pub fn import(&mut self, bytes: &[u8], notifier: &Notifier) -> Result<usize, TransferError> {
        let result = exchange::import_bytes(bytes)
            .map_err(TransferError::from)
            .and_then(|imported| {
                let count = imported.item_count;
                self.replace_all(imported.record)?;
                Ok(count)
            });
        match &result {
            Ok(count) => {
                tracing::info!(items = count, "calibrations imported");
                notifier.success(format!("{count} 件のキャリブレーションをインポートしました"));
            }
            Err(e) => notifier.error(e),
        }
        result
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let result = if self.record.is_empty() {
            self.storage.remove(STORAGE_KEY)
        } else {
            let json = serde_json::to_string(&self.record).map_err(StoreError::Serialize)?;
            self.storage.set(STORAGE_KEY, &json)
        };
        result.map_err(|e| {
            tracing::warn!("calibration write failed: {e}");
            StoreError::Persist(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::exchange::import_bytes;
    use crate::calibration::storage::MemoryStorage;
    use chrono::TimeZone;

    fn adj(scale: f32) -> FitAdjustment {
        FitAdjustment {
            scale,
            ..FitAdjustment::default()
        }
    }

    #[test]
    fn test_set_get_delete() {
        let mut store = CalibrationStore::open(Box::new(MemoryStorage::new()));
        assert!(store.is_empty());

        store.set("a", adj(1.2)).unwrap();
        assert_eq!(store.get("a"), Some(adj(1.2)));

        store.set("a", adj(0.8)).unwrap();
        assert_eq!(store.get("a"), Some(adj(0.8)));
        assert_eq!(store.len(), 1);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_set_clamps() {
        let mut store = CalibrationStore::open(Box::new(MemoryStorage::new()));
        store.set("a", adj(7.0)).unwrap();
        assert_eq!(store.get("a").unwrap().scale, 1.5);
    }

    #[test]
    fn test_reopen_restores_persisted_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = crate::calibration::storage::FileStorage::open(dir.path()).unwrap();
        let mut store = CalibrationStore::open(Box::new(storage.clone()));
        store.set("a", adj(1.3)).unwrap();
        store.set("b", adj(0.7)).unwrap();
        drop(store);

        let reopened = CalibrationStore::open(Box::new(storage));
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("b"), Some(adj(0.7)));
    }

    #[test]
    fn test_corrupt_storage_opens_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, "{ not json").unwrap();
        let store = CalibrationStore::open(Box::new(storage));
        assert!(store.is_empty());
    }

    #[test]
    fn test_write_failure_keeps_memory_copy() {
        let mut store = CalibrationStore::open(Box::new(MemoryStorage::with_quota(16)));
        let err = store.set("a-very-long-item-id", adj(1.2)).unwrap_err();
        assert!(matches!(err, StoreError::Persist(StorageError::QuotaExceeded { .. })));
        assert_eq!(store.get("a-very-long-item-id"), Some(adj(1.2)));
    }

    #[test]
    fn test_replace_all_and_legacy_import_equivalence() {
        let mut record = CalibrationRecord::new();
        record.insert("x".to_string(), adj(1.1));
        record.insert("y".to_string(), adj(0.9));

        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let mut source = CalibrationStore::open(Box::new(MemoryStorage::new()));
        source.replace_all(record.clone()).unwrap();
        let exported = source.export_to_file(now).unwrap();

        let mut enveloped = CalibrationStore::open(Box::new(MemoryStorage::new()));
        enveloped.set("stale", adj(1.4)).unwrap();
        enveloped.replace_all(import_bytes(&exported.bytes).unwrap().record).unwrap();

        let mut legacy = CalibrationStore::open(Box::new(MemoryStorage::new()));
        let bare = serde_json::to_vec(&record).unwrap();
        legacy.replace_all(import_bytes(&bare).unwrap().record).unwrap();

        assert_eq!(enveloped.get_all(), legacy.get_all());
        assert_eq!(enveloped.get_all(), &record);
        assert_eq!(enveloped.get("stale"), None);
    }

    #[test]
    fn test_empty_store_export_fails() {
        let store = CalibrationStore::open(Box::new(MemoryStorage::new()));
        assert!(matches!(store.export_to_file(Utc::now()), Err(ExchangeError::Empty)));
    }

    #[test]
    fn test_export_and_import_are_notified() {
        let (notifier, mut rx) = Notifier::channel();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let mut source = CalibrationStore::open(Box::new(MemoryStorage::new()));
        source.set("a", adj(1.2)).unwrap();
        source.set("b", adj(0.9)).unwrap();
        let file = source.export(now, &notifier).unwrap();
        let sent = rx.try_recv().unwrap();
        assert!(!sent.is_error());
        assert!(sent.message().contains('2'), "{sent}");

        let mut target = CalibrationStore::open(Box::new(MemoryStorage::new()));
        assert_eq!(target.import(&file.bytes, &notifier).unwrap(), 2);
        assert!(!rx.try_recv().unwrap().is_error());
        assert_eq!(target.get_all(), source.get_all());
    }

    #[test]
    fn test_failed_transfer_is_notified_and_store_kept() {
        let (notifier, mut rx) = Notifier::channel();
        let mut store = CalibrationStore::open(Box::new(MemoryStorage::new()));
        assert!(matches!(store.export(Utc::now(), &notifier), Err(ExchangeError::Empty)));
        assert!(rx.try_recv().unwrap().is_error());

        store.set("kept", adj(1.1)).unwrap();
        let err = store.import(b"[1, 2, 3]", &notifier).unwrap_err();
        assert!(matches!(err, TransferError::Exchange(_)));
        assert!(rx.try_recv().unwrap().is_error());
        assert_eq!(store.get("kept"), Some(adj(1.1)));
    }
}
