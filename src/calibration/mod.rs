pub mod exchange;
pub mod session;
pub mod storage;
pub mod store;

pub use exchange::{export_record, import_bytes, ExchangeError, ExportEnvelope, ExportFile, ImportResult};
pub use session::{CalibrationSession, SessionError, SessionState, Viewing};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use store::{CalibrationRecord, CalibrationStore, StoreError, TransferError, STORAGE_KEY};
