//! # Documents and Object Names
//!
//! A [`DocumentFragment`] is one validated collection document, ready to be
//! stored. The naming helpers derive the object paths documents, CVLs and
//! resource files are written to:
//!
//! | Object | Path |
//! |---|---|
//! | Entity document | `{publish}/{ts}_{type}_{uniqueId}.json` |
//! | Batch document | `{publish}/{ts}_{type}_Published{-n}.json` |
//! | CVL document | `{cvl}/{cvlId}.json` |
//! | Resource file | `{resources}/{config}/{fileId}_{fileName}` |
//!
//! Timestamps render as UTC ISO-8601 with seven fractional digits. Document
//! names replace `:` with `.`; entity document names also replace `\` with
//! `_`.

use pimx_core::{FileId, Timestamp};
use pimx_schema::collection_key;
use serde_json::Value;

/// One validated collection document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFragment {
    pub entity_type_id: String,
    /// Number of entity elements in the collection.
    pub entity_count: usize,
    pub document: Value,
    /// Generation of the schema the document was validated against.
    pub schema_generation: u64,
}

impl DocumentFragment {
    /// Entity elements of the collection.
    pub fn entities(&self) -> &[Value] {
        self.document
            .get(collection_key(&self.entity_type_id))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Value of the first entity's external unique field, as written in
    /// its fields block.
    ///
    /// Localized values yield their first translation. `None` when the
    /// entity has no external unique field, the field was not emitted, or
    /// its value is empty.
    pub fn external_unique_value(&self) -> Option<String> {
        let entity = self.entities().first()?;
        let field_id = entity.get("ExternalUniqueIdField")?.as_str()?;
        let field = entity
            .get("Fields")?
            .as_array()?
            .iter()
            .find(|f| f.get("FieldTypeId").and_then(Value::as_str) == Some(field_id))?;
        let first = field.get("Data")?.as_array()?.first()?;
        let value = match first {
            Value::String(s) => s.as_str(),
            Value::Object(pair) => pair.get("Value")?.as_str()?,
            _ => return None,
        };
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.document)
    }
}

// ─── Names ──────────────────────────────────────────────────────────

/// Name of a single-entity document.
pub fn entity_document_name(timestamp: &Timestamp, entity_type_id: &str, unique_id: &str) -> String {
    format!("{}_{}_{}.json", timestamp.to_iso8601(), entity_type_id, unique_id)
        .replace(':', ".")
        .replace('\\', "_")
}

/// Name of a batch document; `part` numbers chunked batches from 1.
pub fn batch_document_name(timestamp: &Timestamp, entity_type_id: &str, part: Option<usize>) -> String {
    let suffix = part.map(|n| format!("-{n}")).unwrap_or_default();
    format!("{}_{}_Published{}.json", timestamp.to_iso8601(), entity_type_id, suffix).replace(':', ".")
}

/// Join a configured folder and an object name.
pub fn object_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

pub fn cvl_document_path(cvl_folder: &str, cvl_id: &str) -> String {
    object_path(cvl_folder, &format!("{cvl_id}.json"))
}

pub fn resource_file_path(
    resource_folder: &str,
    display_configuration: &str,
    file_id: FileId,
    file_name: &str,
) -> String {
    object_path(
        &object_path(resource_folder, display_configuration),
        &format!("{}_{}", file_id.0, file_name),
    )
}
