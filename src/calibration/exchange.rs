//! Portable export/import format for calibration records.
//!
//! Export wraps the record in a self-describing envelope. Import accepts
//! both the envelope and a bare `{ itemId: FitAdjustment }` map written by
//! older versions. Import is pure: it never touches the store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::store::CalibrationRecord;
use crate::garment::FitAdjustment;

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("no saved calibrations to export")]
    Empty,
    #[error("import file is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("import file must contain a JSON object of item adjustments")]
    NotAnObject,
    #[error("import file contains no item adjustments")]
    NoEntries,
    #[error("adjustment for item {item_id:?} is invalid: {reason}")]
    InvalidEntry { item_id: String, reason: String },
    #[error("failed to serialize export: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: String,
    pub export_date: String,
    pub item_count: usize,
    pub adjustments: CalibrationRecord,
}

/// A serialized envelope ready to be saved by the user.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportResult {
    pub record: CalibrationRecord,
    pub item_count: usize,
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("virtual-tryon-calibration-{}.json", now.format("%Y-%m-%d"))
}

/// Serialize `record` into an export envelope; an empty record is an error.
pub fn export_record(record: &CalibrationRecord, now: DateTime<Utc>) -> Result<ExportFile, ExchangeError> {
    if record.is_empty() {
        return Err(ExchangeError::Empty);
    }

    let envelope = ExportEnvelope {
        version: EXPORT_VERSION.to_string(),
        export_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        item_count: record.len(),
        adjustments: record.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&envelope).map_err(ExchangeError::Serialize)?;

    Ok(ExportFile {
        file_name: export_file_name(now),
        bytes,
    })
}

/// Parse an exported file (enveloped or bare). Values are clamped, not rejected.
pub fn import_bytes(bytes: &[u8]) -> Result<ImportResult, ExchangeError> {
    let payload: Value = serde_json::from_slice(bytes).map_err(ExchangeError::InvalidJson)?;
    let map = unwrap_envelope(payload)?;
    if map.is_empty() {
        return Err(ExchangeError::NoEntries);
    }

    let mut record = CalibrationRecord::new();
    for (item_id, value) in map {
        if !value.is_object() {
            return Err(ExchangeError::InvalidEntry {
                item_id,
                reason: "expected an object".to_string(),
            });
        }
        let adjustment: FitAdjustment = serde_json::from_value(value).map_err(|e| ExchangeError::InvalidEntry {
            item_id: item_id.clone(),
            reason: e.to_string(),
        })?;
        record.insert(item_id, adjustment.clamped());
    }

    let item_count = record.len();
    Ok(ImportResult { record, item_count })
}

fn unwrap_envelope(payload: Value) -> Result<serde_json::Map<String, Value>, ExchangeError> {
    let Value::Object(mut outer) = payload else {
        return Err(ExchangeError::NotAnObject);
    };

    if outer.contains_key("adjustments") && outer.contains_key("version") {
        return match outer.remove("adjustments") {
            Some(Value::Object(inner)) => Ok(inner),
            _ => Err(ExchangeError::NotAnObject),
        };
    }
    Ok(outer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn sample_record() -> CalibrationRecord {
        let mut record = CalibrationRecord::new();
        record.insert(
            "sku-shirt".to_string(),
            FitAdjustment {
                scale: 1.1,
                x_offset: -3.5,
                rotation: 4.25,
                neckline_offset: 2.0,
                ..FitAdjustment::default()
            },
        );
        record.insert(
            "sku-pants".to_string(),
            FitAdjustment {
                height: 0.85,
                length_offset: -7.0,
                ..FitAdjustment::default()
            },
        );
        record
    }

    #[test]
    fn test_export_envelope_shape() {
        let file = export_record(&sample_record(), now()).unwrap();
        assert_eq!(file.file_name, "virtual-tryon-calibration-2026-03-14.json");

        let json: Value = serde_json::from_slice(&file.bytes).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["exportDate"], "2026-03-14T09:26:53.000Z");
        assert_eq!(json["itemCount"], 2);
        assert!(json["adjustments"]["sku-shirt"]["xOffset"].is_number());
    }

    #[test]
    fn test_empty_export_fails() {
        assert!(matches!(
            export_record(&CalibrationRecord::new(), now()),
            Err(ExchangeError::Empty)
        ));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let record = sample_record();
        let file = export_record(&record, now()).unwrap();
        let imported = import_bytes(&file.bytes).unwrap();
        assert_eq!(imported.record, record);
        assert_eq!(imported.item_count, 2);
    }

    #[test]
    fn test_legacy_bare_map_matches_envelope() {
        let bare = serde_json::to_vec(&sample_record()).unwrap();
        let legacy = import_bytes(&bare).unwrap();
        let enveloped = import_bytes(&export_record(&sample_record(), now()).unwrap().bytes).unwrap();
        assert_eq!(legacy, enveloped);
    }

    #[test]
    fn test_import_clamps_out_of_range() {
        let imported = import_bytes(br#"{"a": {"scale": 9, "rotation": -90, "lengthOffset": 50}}"#).unwrap();
        let adj = imported.record["a"];
        assert_eq!(adj.scale, 1.5);
        assert_eq!(adj.rotation, -20.0);
        assert_eq!(adj.length_offset, 10.0);
        assert_eq!(adj.width, 1.0);
    }

    #[test]
    fn test_import_validation_errors() {
        assert!(matches!(import_bytes(b"not json"), Err(ExchangeError::InvalidJson(_))));
        assert!(matches!(import_bytes(b"[1, 2]"), Err(ExchangeError::NotAnObject)));
        assert!(matches!(import_bytes(b"{}"), Err(ExchangeError::NoEntries)));
        assert!(matches!(
            import_bytes(br#"{"version": "1.0", "adjustments": {}}"#),
            Err(ExchangeError::NoEntries)
        ));
        assert!(matches!(
            import_bytes(br#"{"version": "1.0", "adjustments": 3}"#),
            Err(ExchangeError::NotAnObject)
        ));
        assert!(matches!(
            import_bytes(br#"{"a": 5}"#),
            Err(ExchangeError::InvalidEntry { .. })
        ));
        assert!(matches!(
            import_bytes(br#"{"a": {"scale": "big"}}"#),
            Err(ExchangeError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn test_adjustments_without_version_is_bare_map() {
        // without "version" the "adjustments" key is just an item id
        let imported = import_bytes(br#"{"adjustments": {"scale": 1.2}}"#).unwrap();
        assert_eq!(imported.item_count, 1);
        assert_eq!(imported.record["adjustments"].scale, 1.2);
    }
}
