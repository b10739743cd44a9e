//! # CVL Documents
//!
//! Writes controlled value lists as standalone documents under the CVL
//! folder, one object per list:
//!
//! ```json
//! { "Id": "Colors", "DataType": "String", "CustomValueList": false,
//!   "Action": "NewValue",
//!   "Values": [ { "Key": "Red", "Value": "Red", "Index": 0 } ] }
//! ```

use std::fmt;
use std::sync::Arc;

use pimx_core::model::SPECIFICATION_ENTITY_TYPE;
use pimx_core::{CatalogReader, Cvl, CvlValue, DataType, FieldData, HostError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::document::cvl_document_path;
use crate::error::{ExportError, SerializationError, WriteOutcome};
use crate::store::ObjectStore;

/// Change recorded on a CVL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CvlAction {
    NewValue,
    DeletedValue,
    DeletedAll,
    Updated,
}

impl CvlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CvlAction::NewValue => "NewValue",
            CvlAction::DeletedValue => "DeletedValue",
            CvlAction::DeletedAll => "DeletedAll",
            CvlAction::Updated => "Updated",
        }
    }
}

impl fmt::Display for CvlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes CVL documents to the object store.
pub struct CvlExporter {
    reader: Arc<dyn CatalogReader>,
    store: Arc<dyn ObjectStore>,
    cvl_folder: String,
}

impl fmt::Debug for CvlExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CvlExporter")
            .field("cvl_folder", &self.cvl_folder)
            .finish()
    }
}

impl CvlExporter {
    pub fn new(reader: Arc<dyn CatalogReader>, store: Arc<dyn ObjectStore>, cvl_folder: &str) -> Self {
        Self {
            reader,
            store,
            cvl_folder: cvl_folder.to_string(),
        }
    }

    /// Write every CVL referenced by the entity type's fields.
    ///
    /// The Specification type also covers the CVLs referenced by
    /// specification field types. Lists that fail to write are logged and
    /// skipped. Returns the number of documents written.
    pub fn write_for_entity_type(&self, entity_type_id: &str) -> Result<usize, ExportError> {
        let entity_type = self
            .reader
            .entity_type(entity_type_id)?
            .ok_or_else(|| HostError::not_found("entity type", entity_type_id))?;

        let mut cvl_ids: Vec<String> = Vec::new();
        let mut add = |id: &str| {
            if !cvl_ids.iter().any(|c| c == id) {
                cvl_ids.push(id.to_string());
            }
        };
        for field_type in &entity_type.field_types {
            if let (DataType::Cvl, Some(cvl_id)) = (&field_type.data_type, &field_type.cvl_id) {
                add(cvl_id);
            }
        }
        if entity_type_id == SPECIFICATION_ENTITY_TYPE {
            for field_type in self.reader.specification_field_types()? {
                if let Some(cvl_id) = field_type.cvl_id.as_deref().filter(|_| field_type.is_cvl()) {
                    add(cvl_id);
                }
            }
        }

        let mut written = 0;
        for cvl_id in &cvl_ids {
            match self.write(cvl_id, None) {
                Ok(WriteOutcome::Written(_)) => written += 1,
                Ok(WriteOutcome::NotExported) => {
                    tracing::warn!(cvl = %cvl_id, entity_type = %entity_type_id, "referenced cvl does not exist");
                }
                Err(e) => {
                    tracing::error!(cvl = %cvl_id, error = %e, "cvl document not written");
                }
            }
        }
        Ok(written)
    }

    /// Write one CVL tagged with `action`.
    pub fn write_by_id(&self, cvl_id: &str, action: CvlAction) -> Result<WriteOutcome, ExportError> {
        match self.write(cvl_id, Some(action))? {
            WriteOutcome::NotExported => Err(HostError::not_found("cvl", cvl_id).into()),
            written => Ok(written),
        }
    }

    /// `NotExported` when the list does not exist.
    fn write(&self, cvl_id: &str, action: Option<CvlAction>) -> Result<WriteOutcome, ExportError> {
        let Some(cvl) = self.reader.cvl(cvl_id)? else {
            return Ok(WriteOutcome::NotExported);
        };
        let values = self.reader.cvl_values(cvl_id)?;
        let document = cvl_document(&cvl, &values, action);
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| ExportError::from(SerializationError::from(e)))?;
        let path = cvl_document_path(&self.cvl_folder, cvl_id);
        self.store.put(&path, &bytes)?;
        tracing::info!(cvl = %cvl_id, action = ?action, path = %path, "cvl document written");
        Ok(WriteOutcome::Written(path))
    }
}

fn cvl_document(cvl: &Cvl, values: &[CvlValue], action: Option<CvlAction>) -> Value {
    let mut document = Map::new();
    document.insert("Id".into(), json!(cvl.id));
    document.insert("DataType".into(), json!(cvl.data_type));
    document.insert("CustomValueList".into(), json!(cvl.custom_value_list));
    if let Some(parent_id) = &cvl.parent_id {
        document.insert("ParentId".into(), json!(parent_id));
    }
    if let Some(action) = action {
        document.insert("Action".into(), json!(action.as_str()));
    }
    let values: Vec<Value> = values
        .iter()
        .map(|v| {
            let mut entry = Map::new();
            entry.insert("Key".into(), json!(v.key));
            entry.insert("Value".into(), value_json(&v.value));
            if let Some(parent_key) = &v.parent_key {
                entry.insert("ParentKey".into(), json!(parent_key));
            }
            entry.insert("Index".into(), json!(v.index));
            Value::Object(entry)
        })
        .collect();
    document.insert("Values".into(), Value::Array(values));
    Value::Object(document)
}

/// Localized values render as `{Language, Value}` pairs, others as text.
fn value_json(value: &FieldData) -> Value {
    match value.as_locale() {
        Some(locale) => locale
            .iter()
            .map(|(language, text)| json!({ "Language": language, "Value": text }))
            .collect(),
        None => json!(value.as_text()),
    }
}
