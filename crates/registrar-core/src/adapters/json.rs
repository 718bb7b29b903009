//! # JSON
//!
//! The whole [`ExportBatch`] as one JSON document. Import reads the same
//! shape and keeps natural keys and assessment results; ids, statuses and
//! history stay with the source system.

use super::{Adapter, AdapterInfo, ExportBatch, ImportBatch};
use crate::error::{RegistrarError, Result};

/// The `json` adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

impl Adapter for JsonAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            id: "json".into(),
            name: "JSON".into(),
            description: "Full institution export as a single JSON document".into(),
            extensions: vec!["json".into()],
            data_types: [
                "programs",
                "terms",
                "instructors",
                "courses",
                "outcomes",
                "offerings",
                "sections",
                "assessments",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            content_type: "application/json".into(),
            supports_import: true,
            supports_export: true,
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let export: ExportBatch = serde_json::from_slice(bytes)
            .map_err(|e| RegistrarError::Adapter(format!("invalid JSON export: {e}")))?;
        Ok(export.to_import_batch())
    }

    fn render(&self, batch: &ExportBatch) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(batch).map_err(|e| RegistrarError::Adapter(e.to_string()))
    }
}
