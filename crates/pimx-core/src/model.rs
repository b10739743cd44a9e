//! # Catalog Data Model
//!
//! The host's product-information model as seen by the exporter: entity
//! types and their field/link metadata, controlled value lists (CVLs),
//! entities and links, and specification metadata.
//!
//! All types derive `Serialize`/`Deserialize` so a whole catalog can be
//! described in a JSON fixture and loaded by the in-memory host.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{EntityId, FileId};

/// Entity type whose entities represent stored binary files.
pub const RESOURCE_ENTITY_TYPE: &str = "Resource";

/// Entity type whose entities carry a specification template.
pub const SPECIFICATION_ENTITY_TYPE: &str = "Specification";

/// Unique-field name used when an entity is identified by its numeric id.
pub const ENTITY_ID_FIELD: &str = "EntityId";

/// Delimiter between the keys of a multivalue CVL field.
pub const MULTIVALUE_DELIMITER: char = ';';

// ─── Metadata ───────────────────────────────────────────────────────

/// Data-type class of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Any single-valued type rendered as a string.
    #[serde(alias = "String", alias = "Integer", alias = "Double", alias = "DateTime")]
    #[serde(alias = "Boolean", alias = "File", alias = "Xml")]
    Scalar,
    /// Text localized per language.
    LocaleString,
    /// Value constrained to the keys of a controlled value list.
    #[serde(rename = "CVL", alias = "Cvl")]
    Cvl,
}

/// Attribute definition on an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub id: String,
    pub data_type: DataType,
    #[serde(default)]
    pub multivalue: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub cvl_id: Option<String>,
}

/// Typed relation definition between two entity types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkType {
    pub id: String,
    pub source_entity_type_id: String,
    pub target_entity_type_id: String,
    /// Entity type of the optional entity attached to each link.
    #[serde(default)]
    pub link_entity_type_id: Option<String>,
}

impl LinkType {
    /// The endpoint type opposite to `entity_type_id`.
    ///
    /// For a link type joining a type to itself this is the type itself.
    pub fn other_end(&self, entity_type_id: &str) -> &str {
        if self.source_entity_type_id != entity_type_id {
            &self.source_entity_type_id
        } else {
            &self.target_entity_type_id
        }
    }
}

/// Schema-level type definition of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: String,
    /// Field types in declaration order.
    #[serde(default)]
    pub field_types: Vec<FieldType>,
    /// Every link type that has this type at either end.
    #[serde(default)]
    pub link_types: Vec<LinkType>,
    #[serde(default)]
    pub field_sets: Vec<String>,
}

impl EntityType {
    /// Look up a field type by id.
    pub fn field_type(&self, field_type_id: &str) -> Option<&FieldType> {
        self.field_types.iter().find(|f| f.id == field_type_id)
    }

    /// Link types whose target is this type.
    pub fn inbound_link_types(&self) -> impl Iterator<Item = &LinkType> {
        self.link_types
            .iter()
            .filter(move |l| l.target_entity_type_id == self.id)
    }

    /// Link types whose source is this type.
    pub fn outbound_link_types(&self) -> impl Iterator<Item = &LinkType> {
        self.link_types
            .iter()
            .filter(move |l| l.source_entity_type_id == self.id)
    }

    /// Whether `field_set_id` is declared on this type.
    pub fn has_field_set(&self, field_set_id: &str) -> bool {
        self.field_sets.iter().any(|f| f == field_set_id)
    }
}

/// Controlled value list definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cvl {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_cvl_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub custom_value_list: bool,
}

fn default_cvl_data_type() -> String {
    "String".to_string()
}

/// One value of a controlled value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvlValue {
    pub key: String,
    pub value: FieldData,
    #[serde(default)]
    pub parent_key: Option<String>,
    #[serde(default)]
    pub index: i32,
}

// ─── Values ─────────────────────────────────────────────────────────

/// Text localized per language code, ordered by language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleString(BTreeMap<String, String>);

impl LocaleString {
    /// Create an empty localized string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of one translation.
    pub fn with(mut self, language: &str, value: &str) -> Self {
        self.0.insert(language.to_string(), value.to_string());
        self
    }

    /// Translation for `language`, if present.
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    /// (language, value) pairs in language order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Value of a field on an entity.
///
/// Deserialized untagged: a JSON object is a [`LocaleString`], anything
/// else maps onto the scalar variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldData {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Locale(LocaleString),
}

impl FieldData {
    /// Plain-text rendering used for scalar output and unique values.
    ///
    /// A localized value renders as its first translation.
    pub fn as_text(&self) -> String {
        match self {
            FieldData::Text(s) => s.clone(),
            FieldData::Integer(n) => n.to_string(),
            FieldData::Decimal(d) => d.to_string(),
            FieldData::Boolean(b) => b.to_string(),
            FieldData::Locale(ls) => ls.iter().next().map(|(_, v)| v.to_string()).unwrap_or_default(),
        }
    }

    /// The localized value, if this is one.
    pub fn as_locale(&self) -> Option<&LocaleString> {
        match self {
            FieldData::Locale(ls) => Some(ls),
            _ => None,
        }
    }
}

impl From<&str> for FieldData {
    fn from(s: &str) -> Self {
        FieldData::Text(s.to_string())
    }
}

impl From<LocaleString> for FieldData {
    fn from(ls: LocaleString) -> Self {
        FieldData::Locale(ls)
    }
}

/// Split multivalue CVL data into its keys.
///
/// Empty tokens are dropped. When nothing remains (including the empty
/// input) the result is a single empty key, so a populated multivalue field
/// always yields at least one entry.
pub fn split_multivalue(data: &str) -> Vec<String> {
    let keys: Vec<String> = data
        .split(MULTIVALUE_DELIMITER)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        vec![String::new()]
    } else {
        keys
    }
}

// ─── Entities and links ─────────────────────────────────────────────

/// How much of an entity the host loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadLevel {
    /// Identity and type only.
    Shallow,
    /// Identity, type and field values.
    #[default]
    DataOnly,
    /// Field values plus links.
    DataAndLinks,
}

/// A typed data record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type_id: String,
    #[serde(default)]
    pub field_set_id: Option<String>,
    /// Field values keyed by field-type id. Absent means null.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldData>,
    #[serde(default)]
    pub load_level: LoadLevel,
}

impl Entity {
    /// Create an entity with no field values.
    pub fn new(id: i64, entity_type_id: &str) -> Self {
        Self {
            id: EntityId(id),
            entity_type_id: entity_type_id.to_string(),
            field_set_id: None,
            fields: BTreeMap::new(),
            load_level: LoadLevel::DataOnly,
        }
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, field_type_id: &str, data: impl Into<FieldData>) -> Self {
        self.fields.insert(field_type_id.to_string(), data.into());
        self
    }

    /// Builder-style field-set assignment.
    pub fn with_field_set(mut self, field_set_id: &str) -> Self {
        self.field_set_id = Some(field_set_id.to_string());
        self
    }

    /// Value of a field, `None` when null.
    pub fn field(&self, field_type_id: &str) -> Option<&FieldData> {
        self.fields.get(field_type_id)
    }

    pub fn is_resource(&self) -> bool {
        self.entity_type_id == RESOURCE_ENTITY_TYPE
    }
}

/// A typed relation instance between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: EntityId,
    pub target: EntityId,
    pub link_type_id: String,
    #[serde(default)]
    pub link_entity_id: Option<EntityId>,
    /// Ordinal sort index among siblings.
    #[serde(default)]
    pub index: i32,
}

impl Link {
    pub fn new(source: i64, target: i64, link_type_id: &str) -> Self {
        Self {
            source: EntityId(source),
            target: EntityId(target),
            link_type_id: link_type_id.to_string(),
            link_entity_id: None,
            index: 0,
        }
    }
}

/// Change applied to an entity in an exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityAction {
    New,
    Updated,
    Deleted,
}

impl EntityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityAction::New => "New",
            EntityAction::Updated => "Updated",
            EntityAction::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Specifications ─────────────────────────────────────────────────

/// Field definition inside a specification template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificationFieldType {
    pub id: String,
    /// The Specification entity owning this template field.
    pub entity_id: EntityId,
    #[serde(default)]
    pub name: LocaleString,
    /// Host data type name (`String`, `LocaleString`, `CVL`, ...).
    pub data_type: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub index: i32,
    pub category_id: String,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub cvl_id: Option<String>,
    #[serde(default)]
    pub multivalue: bool,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub additional_data: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl SpecificationFieldType {
    pub fn is_locale_string(&self) -> bool {
        self.data_type == "LocaleString"
    }

    pub fn is_cvl(&self) -> bool {
        self.data_type == "CVL"
    }
}

/// Specification value held by one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationField {
    pub entity_id: EntityId,
    pub field_type_id: String,
    #[serde(default)]
    pub data: Option<FieldData>,
    /// Whether the host renders the value through its formatter.
    #[serde(default)]
    pub formatted: bool,
}

/// Grouping of specification field types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: LocaleString,
}

// ─── Files ──────────────────────────────────────────────────────────

/// Image rendition the host can produce for files of one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfiguration {
    pub name: String,
    /// Input file extension, lower case, without the dot.
    pub extension: String,
    #[serde(default)]
    pub output_extension: Option<String>,
}

/// A stored file rendition, addressed by file id and display configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_id: FileId,
    pub display_configuration: String,
    pub content: String,
}
