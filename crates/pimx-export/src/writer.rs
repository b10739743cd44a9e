//! # Document Writer
//!
//! The single path by which documents reach the object store. Applies the
//! export allow-list, serializes, names and stores.

use std::collections::BTreeSet;
use std::sync::Arc;

use pimx_core::{
    ChannelId, Entity, EntityAction, EntityId, ExportMapping, Link, Timestamp, UniqueFieldMap,
};
use pimx_schema::SchemaCatalog;

use crate::document::{batch_document_name, entity_document_name, object_path, DocumentFragment};
use crate::error::{ExportError, SerializationError, WriteOutcome};
use crate::serializer::EntitySerializer;
use crate::store::ObjectStore;

/// Serializes entities and stores the resulting documents.
pub struct DocumentWriter {
    serializer: EntitySerializer,
    store: Arc<dyn ObjectStore>,
    unique_fields: UniqueFieldMap,
    exported_types: BTreeSet<String>,
    publish_folder: String,
}

impl std::fmt::Debug for DocumentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentWriter")
            .field("exported_types", &self.exported_types)
            .field("publish_folder", &self.publish_folder)
            .finish()
    }
}

impl DocumentWriter {
    pub fn new(
        schemas: Arc<SchemaCatalog>,
        store: Arc<dyn ObjectStore>,
        mapping: &ExportMapping,
        publish_folder: &str,
    ) -> Self {
        let unique_fields = mapping.unique_field_map();
        if schemas.unique_fields() != &unique_fields {
            tracing::warn!(
                mapped = unique_fields.len(),
                registered = schemas.unique_fields().len(),
                "schema catalog unique fields differ from the mapping, mapped identities may not validate"
            );
        }
        Self {
            serializer: EntitySerializer::new(schemas, mapping.excluded_field_types.iter().cloned()),
            store,
            unique_fields,
            exported_types: mapping.entity_types_to_export.iter().cloned().collect(),
            publish_folder: publish_folder.to_string(),
        }
    }

    pub fn serializer(&self) -> &EntitySerializer {
        &self.serializer
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn unique_fields(&self) -> &UniqueFieldMap {
        &self.unique_fields
    }

    /// Whether documents of `entity_type_id` are written at all.
    pub fn is_exported(&self, entity_type_id: &str) -> bool {
        self.exported_types.contains(entity_type_id)
    }

    /// Serialize and store one entity as its own document.
    ///
    /// The document is named after the entity's external unique value,
    /// falling back to its numeric id.
    pub fn write_entity(
        &self,
        entity: &Entity,
        action: EntityAction,
        channel: ChannelId,
        removed_link: Option<&Link>,
    ) -> Result<WriteOutcome, ExportError> {
        if !self.is_exported(&entity.entity_type_id) {
            tracing::info!(
                entity_id = %entity.id,
                entity_type = %entity.entity_type_id,
                "entity type not in export list, document not written"
            );
            return Ok(WriteOutcome::NotExported);
        }

        let fragment = self
            .serializer
            .serialize(entity, action, &self.unique_fields, channel, removed_link)
            .map_err(|e| self.failed(&entity.entity_type_id, e.into()))?;
        let unique_id = fragment
            .external_unique_value()
            .unwrap_or_else(|| entity.id.to_string());
        let name = entity_document_name(&Timestamp::now(), &entity.entity_type_id, &unique_id);
        let path = self.store_fragment(&name, &fragment, action)?;
        tracing::info!(
            entity_id = %entity.id,
            entity_type = %entity.entity_type_id,
            action = %action,
            path = %path,
            "document written"
        );
        Ok(WriteOutcome::Written(path))
    }

    /// Serialize and store a batch of one type as a single document.
    ///
    /// `part` numbers the document within a chunked group.
    pub fn write_batch(
        &self,
        entity_type_id: &str,
        ids: &[EntityId],
        action: EntityAction,
        channel: ChannelId,
        regenerate_schema: bool,
        part: Option<usize>,
    ) -> Result<(WriteOutcome, usize), ExportError> {
        if !self.is_exported(entity_type_id) {
            tracing::info!(entity_type = %entity_type_id, "entity type not in export list, batch not written");
            return Ok((WriteOutcome::NotExported, 0));
        }

        let fragment = self
            .serializer
            .serialize_collection(
                entity_type_id,
                ids,
                action,
                &self.unique_fields,
                channel,
                regenerate_schema,
            )
            .map_err(|e| self.failed(entity_type_id, e.into()))?;
        let name = batch_document_name(&Timestamp::now(), entity_type_id, part);
        let path = self.store_fragment(&name, &fragment, action)?;
        tracing::info!(
            entity_type = %entity_type_id,
            entities = fragment.entity_count,
            part = ?part,
            path = %path,
            "batch document written"
        );
        Ok((WriteOutcome::Written(path), fragment.entity_count))
    }

    fn store_fragment(
        &self,
        name: &str,
        fragment: &DocumentFragment,
        action: EntityAction,
    ) -> Result<String, ExportError> {
        let path = object_path(&self.publish_folder, name);
        let bytes = fragment.to_bytes().map_err(|e| {
            self.failed(&fragment.entity_type_id, SerializationError::from(e).into())
        })?;
        self.store
            .put(&path, &bytes)
            .map_err(|e| self.failed(&fragment.entity_type_id, e.into()))?;
        metrics::counter!(
            "pimx_documents_written_total",
            "entity_type" => fragment.entity_type_id.clone(),
            "action" => action.as_str()
        )
        .increment(1);
        Ok(path)
    }

    fn failed(&self, entity_type_id: &str, error: ExportError) -> ExportError {
        metrics::counter!(
            "pimx_document_failures_total",
            "entity_type" => entity_type_id.to_string(),
            "kind" => error.kind().to_string()
        )
        .increment(1);
        error
    }
}
