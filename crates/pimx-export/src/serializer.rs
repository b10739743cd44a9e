//! # Entity Serializer
//!
//! Turns one entity, with its fields, channel links and specification
//! data, into a collection document that conforms to the entity type's
//! schema.
//!
//! ## Pipeline
//!
//! 1. Fetch (or build) the compiled schema of the entity's type.
//! 2. Emit the entity root: id, action, field set (only if the type
//!    declares it), external unique field name (whenever the type is
//!    mapped).
//! 3. Emit declared fields in type order, skipping excluded field types
//!    and absent values.
//! 4. Emit parent links (inbound) and child links (outbound) within the
//!    channel. A removed link is appended as a trailing `Deleted` child
//!    entry.
//! 5. Emit the `Additionals` block: a specification template for
//!    Specification entities, specification data rows for entities linked
//!    to a Specification.
//! 6. Validate. A document that does not conform is never returned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use pimx_core::model::{split_multivalue, ENTITY_ID_FIELD, SPECIFICATION_ENTITY_TYPE};
use pimx_core::{
    CatalogReader, ChannelId, Entity, EntityAction, EntityId, FieldData, HostError, Link,
    LoadLevel, LocaleString, SpecificationFieldType, UniqueFieldMap,
};
use pimx_schema::{CompiledSchema, FieldKind, SchemaCatalog, SchemaDescriptor};
use serde_json::{json, Map, Value};

use crate::document::DocumentFragment;
use crate::error::SerializationError;

/// Which side of a link the serialized entity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkSide {
    /// The entity is the target; the other endpoint is the parent.
    Parent,
    /// The entity is the source; the other endpoint is the child.
    Child,
}

/// Resolve the external identity of an entity.
///
/// Returns the mapped unique field and its value when the field holds
/// non-empty data, otherwise `("EntityId", <id>)`.
pub fn resolve_unique_identity(entity: &Entity, unique_fields: &UniqueFieldMap) -> (String, String) {
    if let Some(field_id) = unique_fields.get(&entity.entity_type_id) {
        if let Some(value) = entity.field(field_id).map(FieldData::as_text) {
            if !value.is_empty() {
                return (field_id.to_string(), value);
            }
        }
    }
    (ENTITY_ID_FIELD.to_string(), entity.id.to_string())
}

/// Schema-validated entity serializer.
pub struct EntitySerializer {
    schemas: Arc<SchemaCatalog>,
    excluded_field_types: BTreeSet<String>,
}

impl std::fmt::Debug for EntitySerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySerializer")
            .field("schemas", &self.schemas)
            .field("excluded_field_types", &self.excluded_field_types)
            .finish()
    }
}

impl EntitySerializer {
    pub fn new(schemas: Arc<SchemaCatalog>, excluded_field_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            schemas,
            excluded_field_types: excluded_field_types.into_iter().collect(),
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaCatalog> {
        &self.schemas
    }

    fn reader(&self) -> &dyn CatalogReader {
        self.schemas.reader().as_ref()
    }

    /// Serialize one entity into a single-element collection document.
    pub fn serialize(
        &self,
        entity: &Entity,
        action: EntityAction,
        unique_fields: &UniqueFieldMap,
        channel: ChannelId,
        removed_link: Option<&Link>,
    ) -> Result<DocumentFragment, SerializationError> {
        let schema = self.schemas.get_or_build(&entity.entity_type_id, false)?;
        let element = self.entity_element(
            schema.descriptor(),
            entity,
            action,
            unique_fields,
            channel,
            removed_link,
        )?;
        finish(&schema, vec![element])
    }

    /// Load an entity with its links and serialize it.
    pub fn serialize_by_id(
        &self,
        entity_id: EntityId,
        action: EntityAction,
        unique_fields: &UniqueFieldMap,
        channel: ChannelId,
    ) -> Result<DocumentFragment, SerializationError> {
        let entity = self
            .reader()
            .entity(entity_id, LoadLevel::DataAndLinks)?
            .ok_or(SerializationError::NotFound { entity_id })?;
        self.serialize(&entity, action, unique_fields, channel, None)
    }

    /// Serialize a batch of one type into one collection document.
    ///
    /// Ids that no longer resolve, or resolve to another type, are skipped.
    /// The assembled document is validated once.
    pub fn serialize_collection(
        &self,
        entity_type_id: &str,
        ids: &[EntityId],
        action: EntityAction,
        unique_fields: &UniqueFieldMap,
        channel: ChannelId,
        regenerate_schema: bool,
    ) -> Result<DocumentFragment, SerializationError> {
        let schema = self.schemas.get_or_build(entity_type_id, regenerate_schema)?;
        let mut elements = Vec::with_capacity(ids.len());
        for id in ids {
            match self.reader().entity(*id, LoadLevel::DataAndLinks)? {
                Some(entity) if entity.entity_type_id == entity_type_id => {
                    elements.push(self.entity_element(
                        schema.descriptor(),
                        &entity,
                        action,
                        unique_fields,
                        channel,
                        None,
                    )?);
                }
                Some(entity) => {
                    tracing::warn!(
                        entity_id = %id,
                        entity_type = %entity.entity_type_id,
                        expected = %entity_type_id,
                        "entity skipped: type mismatch in batch"
                    );
                }
                None => {
                    tracing::debug!(entity_id = %id, "entity skipped: no longer resolvable");
                }
            }
        }
        finish(&schema, elements)
    }

    // ─── Entity element ─────────────────────────────────────────────

    fn entity_element(
        &self,
        descriptor: &SchemaDescriptor,
        entity: &Entity,
        action: EntityAction,
        unique_fields: &UniqueFieldMap,
        channel: ChannelId,
        removed_link: Option<&Link>,
    ) -> Result<Value, SerializationError> {
        let mut element = Map::new();
        element.insert("EntityId".into(), json!(entity.id.get()));
        element.insert("Action".into(), json!(action.as_str()));
        if let Some(field_set) = entity.field_set_id.as_deref() {
            if descriptor.allows_field_set(field_set) {
                element.insert("FieldSet".into(), json!(field_set));
            }
        }
        if let Some(field_id) = unique_fields.get(&entity.entity_type_id) {
            element.insert("ExternalUniqueIdField".into(), json!(field_id));
        }
        element.insert("Fields".into(), Value::Array(self.fields(descriptor, entity)));

        let parents = self.links(
            self.reader().inbound_links(channel, entity.id)?,
            LinkSide::Parent,
            unique_fields,
        )?;
        let mut children = self.links(
            self.reader().outbound_links(channel, entity.id)?,
            LinkSide::Child,
            unique_fields,
        )?;
        if let Some(link) = removed_link {
            let mut entry = self.link_entry(link, LinkSide::Child, unique_fields)?;
            entry.insert("Action".into(), json!("Deleted"));
            children.push(Value::Object(entry));
        }
        element.insert(
            "Links".into(),
            json!({ "ParentLinks": parents, "ChildLinks": children }),
        );

        if let Some(additionals) = self.additionals(descriptor, entity)? {
            element.insert("Additionals".into(), additionals);
        }
        Ok(Value::Object(element))
    }

    fn fields(&self, descriptor: &SchemaDescriptor, entity: &Entity) -> Vec<Value> {
        let mut fields = Vec::new();
        for shape in &descriptor.fields {
            if self.excluded_field_types.contains(&shape.field_type_id) {
                continue;
            }
            let Some(data) = entity.field(&shape.field_type_id) else {
                continue;
            };
            let mut field = Map::new();
            field.insert("FieldTypeId".into(), json!(shape.field_type_id));
            match &shape.kind {
                FieldKind::Scalar => {
                    field.insert("Data".into(), json!([data.as_text()]));
                }
                FieldKind::LocaleString => {
                    field.insert(
                        "Data".into(),
                        locale_pairs(data.as_locale(), &descriptor.languages),
                    );
                }
                FieldKind::Cvl {
                    cvl_id, multivalue, ..
                } => {
                    let keys = if *multivalue {
                        split_multivalue(&data.as_text())
                    } else {
                        vec![data.as_text()]
                    };
                    field.insert("Cvl".into(), json!(cvl_id));
                    field.insert("Data".into(), json!(keys));
                }
            }
            fields.push(Value::Object(field));
        }
        fields
    }

    // ─── Links ──────────────────────────────────────────────────────

    fn links(
        &self,
        links: Vec<Link>,
        side: LinkSide,
        unique_fields: &UniqueFieldMap,
    ) -> Result<Vec<Value>, SerializationError> {
        links
            .iter()
            .map(|link| self.link_entry(link, side, unique_fields).map(Value::Object))
            .collect()
    }

    fn link_entry(
        &self,
        link: &Link,
        side: LinkSide,
        unique_fields: &UniqueFieldMap,
    ) -> Result<Map<String, Value>, SerializationError> {
        let reader = self.reader();
        let link_type = reader
            .link_type(&link.link_type_id)?
            .ok_or_else(|| HostError::not_found("link type", &link.link_type_id))?;

        let other_id = match side {
            LinkSide::Parent => link.source,
            LinkSide::Child => link.target,
        };
        let (unique_field, unique_value) = match reader.entity(other_id, LoadLevel::DataOnly)? {
            Some(other) => resolve_unique_identity(&other, unique_fields),
            None => (ENTITY_ID_FIELD.to_string(), other_id.to_string()),
        };

        let mut entry = Map::new();
        entry.insert("LinkTypeId".into(), json!(link_type.id));
        entry.insert("SourceEntityTypeId".into(), json!(link_type.source_entity_type_id));
        entry.insert("TargetEntityTypeId".into(), json!(link_type.target_entity_type_id));
        entry.insert("UniqueFieldName".into(), json!(unique_field));
        entry.insert("UniqueValue".into(), json!(unique_value));
        match side {
            LinkSide::Parent => entry.insert("SourceEntityId".into(), json!(link.source.get())),
            LinkSide::Child => entry.insert("TargetEntityId".into(), json!(link.target.get())),
        };
        if let Some(link_entity_id) = link.link_entity_id {
            entry.insert("LinkEntityId".into(), json!(link_entity_id.get()));
            let link_entity_type = reader
                .entity(link_entity_id, LoadLevel::Shallow)?
                .map(|e| e.entity_type_id)
                .or_else(|| link_type.link_entity_type_id.clone());
            if let Some(type_id) = link_entity_type {
                entry.insert("LinkEntityTypeId".into(), json!(type_id));
            }
        }
        entry.insert("SortOrder".into(), json!(link.index));
        Ok(entry)
    }

    // ─── Specifications ─────────────────────────────────────────────

    fn additionals(
        &self,
        descriptor: &SchemaDescriptor,
        entity: &Entity,
    ) -> Result<Option<Value>, SerializationError> {
        if entity.entity_type_id == SPECIFICATION_ENTITY_TYPE {
            let template = self.specification_template(entity.id, &descriptor.languages)?;
            return Ok(Some(json!({ "SpecificationTemplate": template })));
        }
        if self.has_specification(entity.id)? {
            let rows = self.specification_rows(entity.id, &descriptor.languages)?;
            return Ok(Some(json!({ "SpecificationData": rows })));
        }
        Ok(None)
    }

    /// Whether any outbound link of the entity, in any channel, targets a
    /// Specification entity.
    fn has_specification(&self, id: EntityId) -> Result<bool, HostError> {
        let reader = self.reader();
        for link in reader.all_outbound_links(id)? {
            if let Some(target) = reader.entity(link.target, LoadLevel::Shallow)? {
                if target.entity_type_id == SPECIFICATION_ENTITY_TYPE {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn specification_template(
        &self,
        template: EntityId,
        languages: &[String],
    ) -> Result<Vec<Value>, HostError> {
        let reader = self.reader();
        let categories: BTreeMap<String, LocaleString> = reader
            .specification_categories()?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut field_types: Vec<SpecificationFieldType> = reader
            .specification_template_field_types(template)?
            .into_iter()
            .filter(|f| !f.disabled)
            .collect();
        field_types.sort_by_key(|f| f.index);

        let mut rows = Vec::with_capacity(field_types.len());
        for f in field_types {
            let Some(category_name) = categories.get(&f.category_id) else {
                tracing::debug!(
                    field_type = %f.id,
                    category = %f.category_id,
                    "template field skipped: unknown category"
                );
                continue;
            };
            rows.push(json!({
                "Id": f.id,
                "Name": locale_pairs(Some(&f.name), languages),
                "DataType": f.data_type,
                "Mandatory": f.mandatory,
                "Index": f.index,
                "CategoryId": f.category_id,
                "CategoryName": locale_pairs(Some(category_name), languages),
                "DefaultValue": f.default_value.clone().unwrap_or_default(),
                "CVLId": f.cvl_id.clone().unwrap_or_default(),
                "Multivalue": f.multivalue,
                "Unit": f.unit.clone().unwrap_or_default(),
                "Additional": f.additional_data.clone().unwrap_or_default(),
            }));
        }
        Ok(rows)
    }

    fn specification_rows(&self, id: EntityId, languages: &[String]) -> Result<Vec<Value>, HostError> {
        let reader = self.reader();
        let field_types: HashMap<String, SpecificationFieldType> = reader
            .specification_field_types()?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        let mut rows = Vec::new();
        for field in reader.specification_fields(id)? {
            let field_type = field_types.get(&field.field_type_id);
            let data = match (field_type, &field.data) {
                (Some(ft), _) if field.formatted => {
                    let formatted = reader.formatted_value(ft, id)?.unwrap_or_default();
                    vec![json!({ "Value": formatted })]
                }
                (_, None) => vec![json!({ "Value": "" })],
                (Some(ft), Some(data)) if ft.is_locale_string() => {
                    vec![json!({ "LocaleString": locale_pairs(data.as_locale(), languages) })]
                }
                (Some(ft), Some(data)) => {
                    let values = if ft.multivalue {
                        split_multivalue(&data.as_text())
                    } else {
                        vec![data.as_text()]
                    };
                    let cvl_id = ft.cvl_id.as_deref().filter(|_| ft.is_cvl());
                    values.into_iter().map(|v| value_entry(v, cvl_id)).collect()
                }
                (None, Some(data)) => vec![json!({ "Value": data.as_text() })],
            };
            rows.push(json!({
                "SpecificationFieldTypeId": field.field_type_id,
                "Data": data,
            }));
        }
        Ok(rows)
    }
}

/// Wrap elements in a collection document and validate it.
fn finish(schema: &CompiledSchema, elements: Vec<Value>) -> Result<DocumentFragment, SerializationError> {
    let descriptor = schema.descriptor();
    let entity_count = elements.len();
    let mut root = Map::new();
    root.insert(descriptor.collection_key(), Value::Array(elements));
    let document = Value::Object(root);
    schema.validate(&document)?;
    Ok(DocumentFragment {
        entity_type_id: descriptor.entity_type_id.clone(),
        entity_count,
        document,
        schema_generation: schema.generation(),
    })
}

/// `{Language, Value}` pairs restricted to known languages.
fn locale_pairs(value: Option<&LocaleString>, languages: &[String]) -> Value {
    let pairs: Vec<Value> = value
        .into_iter()
        .flat_map(|ls| ls.iter())
        .filter(|(language, _)| languages.iter().any(|l| l.as_str() == *language))
        .map(|(language, value)| json!({ "Language": language, "Value": value }))
        .collect();
    Value::Array(pairs)
}

fn value_entry(value: String, cvl_id: Option<&str>) -> Value {
    match cvl_id {
        Some(cvl_id) => json!({ "Value": value, "Cvl": cvl_id }),
        None => json!({ "Value": value }),
    }
}
