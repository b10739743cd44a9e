//! # In-Memory Host
//!
//! A [`CatalogReader`] over plain data, loadable from a JSON fixture. The
//! CLI uses it to replay exports against a catalog snapshot and the test
//! suites use it to build small channels.
//!
//! ## Channel model
//!
//! A channel lists its member entities. A link belongs to the channel when
//! both endpoints are members. The structural parent count of an entity is
//! its number of inbound channel links.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::host::CatalogReader;
use crate::identity::{ChannelId, EntityId, FileId};
use crate::model::{
    Category, Cvl, CvlValue, Entity, EntityType, ImageConfiguration, Link, LinkType, LoadLevel,
    SpecificationField, SpecificationFieldType, StoredFile,
};

/// Member entities of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStructure {
    pub id: ChannelId,
    #[serde(default)]
    pub entities: Vec<EntityId>,
}

/// Host-formatted rendering of one specification value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedValue {
    pub field_type_id: String,
    pub entity_id: EntityId,
    pub value: String,
}

/// Catalog snapshot held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    /// Link types not already declared on an entity type.
    #[serde(default)]
    pub link_types: Vec<LinkType>,
    #[serde(default)]
    pub cvls: Vec<Cvl>,
    #[serde(default)]
    pub cvl_values: BTreeMap<String, Vec<CvlValue>>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub channels: Vec<ChannelStructure>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub specification_field_types: Vec<SpecificationFieldType>,
    #[serde(default)]
    pub specification_fields: Vec<SpecificationField>,
    #[serde(default)]
    pub formatted_values: Vec<FormattedValue>,
    #[serde(default)]
    pub files: Vec<StoredFile>,
    #[serde(default)]
    pub image_configurations: Vec<ImageConfiguration>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a JSON fixture.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and parse a catalog fixture file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::Unavailable(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content).map_err(|e| {
            HostError::Unavailable(format!("invalid catalog {}: {e}", path.display()))
        })
    }

    // ── Builders ──

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_types.push(link_type);
        self
    }

    pub fn with_cvl(mut self, cvl: Cvl, values: Vec<CvlValue>) -> Self {
        self.cvl_values.insert(cvl.id.clone(), values);
        self.cvls.push(cvl);
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.retain(|e| e.id != entity.id);
        self.entities.push(entity);
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Add entities to a channel, creating the channel if needed.
    pub fn with_channel_members(mut self, channel: i64, ids: &[i64]) -> Self {
        let channel = ChannelId(channel);
        let idx = match self.channels.iter().position(|c| c.id == channel) {
            Some(idx) => idx,
            None => {
                self.channels.push(ChannelStructure {
                    id: channel,
                    entities: Vec::new(),
                });
                self.channels.len() - 1
            }
        };
        for id in ids {
            if !self.channels[idx].entities.contains(&EntityId(*id)) {
                self.channels[idx].entities.push(EntityId(*id));
            }
        }
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    pub fn with_specification_field_type(mut self, field_type: SpecificationFieldType) -> Self {
        self.specification_field_types.push(field_type);
        self
    }

    pub fn with_specification_field(mut self, field: SpecificationField) -> Self {
        self.specification_fields.push(field);
        self
    }

    pub fn with_formatted_value(mut self, field_type_id: &str, entity: i64, value: &str) -> Self {
        self.formatted_values.push(FormattedValue {
            field_type_id: field_type_id.to_string(),
            entity_id: EntityId(entity),
            value: value.to_string(),
        });
        self
    }

    pub fn with_file(mut self, file_id: i64, display_configuration: &str, content: &str) -> Self {
        self.files.push(StoredFile {
            file_id: FileId(file_id),
            display_configuration: display_configuration.to_string(),
            content: content.to_string(),
        });
        self
    }

    pub fn with_image_configuration(mut self, config: ImageConfiguration) -> Self {
        self.image_configurations.push(config);
        self
    }

    // ── Internals ──

    fn channel(&self, channel: ChannelId) -> Option<&ChannelStructure> {
        self.channels.iter().find(|c| c.id == channel)
    }

    fn is_member(&self, channel: ChannelId, id: EntityId) -> bool {
        self.channel(channel)
            .map(|c| c.entities.contains(&id))
            .unwrap_or(false)
    }

    fn channel_links(&self, channel: ChannelId) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .filter(move |l| self.is_member(channel, l.source) && self.is_member(channel, l.target))
    }

    fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    fn all_link_types(&self) -> Vec<LinkType> {
        let mut all: Vec<LinkType> = Vec::new();
        let declared = self.entity_types.iter().flat_map(|t| t.link_types.iter());
        for lt in declared.chain(self.link_types.iter()) {
            if !all.iter().any(|l| l.id == lt.id) {
                all.push(lt.clone());
            }
        }
        all
    }
}

impl CatalogReader for InMemoryCatalog {
    fn entity(&self, id: EntityId, level: LoadLevel) -> Result<Option<Entity>, HostError> {
        Ok(self.find_entity(id).map(|e| {
            let mut e = e.clone();
            if level == LoadLevel::Shallow {
                e.fields.clear();
            }
            e.load_level = level;
            e
        }))
    }

    fn entity_types(&self) -> Result<Vec<EntityType>, HostError> {
        self.entity_types
            .iter()
            .map(|t| self.entity_type(&t.id))
            .filter_map(Result::transpose)
            .collect()
    }

    fn entity_type(&self, id: &str) -> Result<Option<EntityType>, HostError> {
        let Some(declared) = self.entity_types.iter().find(|t| t.id == id) else {
            return Ok(None);
        };
        let mut entity_type = declared.clone();
        entity_type.link_types = self
            .all_link_types()
            .into_iter()
            .filter(|l| l.source_entity_type_id == id || l.target_entity_type_id == id)
            .collect();
        Ok(Some(entity_type))
    }

    fn link_type(&self, id: &str) -> Result<Option<LinkType>, HostError> {
        Ok(self.all_link_types().into_iter().find(|l| l.id == id))
    }

    fn languages(&self) -> Result<Vec<String>, HostError> {
        Ok(self.languages.clone())
    }

    fn cvl(&self, id: &str) -> Result<Option<Cvl>, HostError> {
        Ok(self.cvls.iter().find(|c| c.id == id).cloned())
    }

    fn cvl_values(&self, cvl_id: &str) -> Result<Vec<CvlValue>, HostError> {
        if !self.cvls.iter().any(|c| c.id == cvl_id) {
            return Err(HostError::not_found("cvl", cvl_id));
        }
        Ok(self.cvl_values.get(cvl_id).cloned().unwrap_or_default())
    }

    fn channel_entity_types(&self, channel: ChannelId) -> Result<Vec<String>, HostError> {
        let Some(structure) = self.channel(channel) else {
            return Err(HostError::not_found("channel", channel));
        };
        let present: Vec<&str> = structure
            .entities
            .iter()
            .filter_map(|id| self.find_entity(*id))
            .map(|e| e.entity_type_id.as_str())
            .collect();
        Ok(self
            .entity_types
            .iter()
            .filter(|t| present.contains(&t.id.as_str()))
            .map(|t| t.id.clone())
            .collect())
    }

    fn channel_link_entity_types(&self, channel: ChannelId) -> Result<Vec<String>, HostError> {
        let mut types: Vec<String> = Vec::new();
        for link in self.channel_links(channel) {
            let Some(link_entity) = link.link_entity_id.and_then(|id| self.find_entity(id)) else {
                continue;
            };
            if !types.contains(&link_entity.entity_type_id) {
                types.push(link_entity.entity_type_id.clone());
            }
        }
        Ok(types)
    }

    fn channel_entities_of_type(
        &self,
        channel: ChannelId,
        entity_type_id: &str,
    ) -> Result<Vec<EntityId>, HostError> {
        let Some(structure) = self.channel(channel) else {
            return Err(HostError::not_found("channel", channel));
        };
        Ok(structure
            .entities
            .iter()
            .filter(|id| {
                self.find_entity(**id)
                    .is_some_and(|e| e.entity_type_id == entity_type_id)
            })
            .copied()
            .collect())
    }

    fn channel_link_entities_of_type(
        &self,
        channel: ChannelId,
        entity_type_id: &str,
    ) -> Result<Vec<EntityId>, HostError> {
        let mut ids: Vec<EntityId> = Vec::new();
        for link in self.channel_links(channel) {
            let Some(id) = link.link_entity_id else {
                continue;
            };
            let matches = self
                .find_entity(id)
                .is_some_and(|e| e.entity_type_id == entity_type_id);
            if matches && !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn inbound_links(&self, channel: ChannelId, id: EntityId) -> Result<Vec<Link>, HostError> {
        Ok(self
            .channel_links(channel)
            .filter(|l| l.target == id)
            .cloned()
            .collect())
    }

    fn outbound_links(&self, channel: ChannelId, id: EntityId) -> Result<Vec<Link>, HostError> {
        let mut links: Vec<Link> = self
            .channel_links(channel)
            .filter(|l| l.source == id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.index);
        Ok(links)
    }

    fn all_outbound_links(&self, id: EntityId) -> Result<Vec<Link>, HostError> {
        Ok(self.links.iter().filter(|l| l.source == id).cloned().collect())
    }

    fn entity_in_channel(&self, channel: ChannelId, id: EntityId) -> Result<bool, HostError> {
        Ok(self.is_member(channel, id))
    }

    fn structure_parent_count(&self, channel: ChannelId, id: EntityId) -> Result<usize, HostError> {
        Ok(self.channel_links(channel).filter(|l| l.target == id).count())
    }

    fn specification_categories(&self) -> Result<Vec<Category>, HostError> {
        Ok(self.categories.clone())
    }

    fn specification_field_types(&self) -> Result<Vec<SpecificationFieldType>, HostError> {
        Ok(self.specification_field_types.clone())
    }

    fn specification_fields(&self, entity: EntityId) -> Result<Vec<SpecificationField>, HostError> {
        Ok(self
            .specification_fields
            .iter()
            .filter(|f| f.entity_id == entity)
            .cloned()
            .collect())
    }

    fn formatted_value(
        &self,
        field_type: &SpecificationFieldType,
        entity: EntityId,
    ) -> Result<Option<String>, HostError> {
        Ok(self
            .formatted_values
            .iter()
            .find(|v| v.field_type_id == field_type.id && v.entity_id == entity)
            .map(|v| v.value.clone()))
    }

    fn file(
        &self,
        file_id: FileId,
        display_configuration: &str,
    ) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self
            .files
            .iter()
            .find(|f| f.file_id == file_id && f.display_configuration == display_configuration)
            .map(|f| f.content.clone().into_bytes()))
    }

    fn image_configurations(&self) -> Result<Vec<ImageConfiguration>, HostError> {
        Ok(self.image_configurations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, FieldType};

    fn make_catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_languages(&["en"])
            .with_entity_type(EntityType {
                id: "Product".to_string(),
                field_types: vec![FieldType {
                    id: "ProductName".to_string(),
                    data_type: DataType::Scalar,
                    multivalue: false,
                    unique: false,
                    mandatory: false,
                    cvl_id: None,
                }],
                link_types: vec![],
                field_sets: vec![],
            })
            .with_entity_type(EntityType {
                id: "Item".to_string(),
                field_types: vec![],
                link_types: vec![],
                field_sets: vec![],
            })
            .with_link_type(LinkType {
                id: "ProductItem".to_string(),
                source_entity_type_id: "Product".to_string(),
                target_entity_type_id: "Item".to_string(),
                link_entity_type_id: None,
            })
            .with_entity(Entity::new(1, "Product").with_field("ProductName", "Shirt"))
            .with_entity(Entity::new(2, "Item"))
            .with_entity(Entity::new(3, "Item"))
            .with_link(Link::new(1, 2, "ProductItem"))
            .with_link(Link::new(1, 3, "ProductItem"))
            .with_channel_members(10, &[1, 2])
    }

    #[test]
    fn test_entity_type_collects_link_types() {
        let c = make_catalog();
        let item = c.entity_type("Item").unwrap().unwrap();
        assert_eq!(item.link_types.len(), 1);
        assert_eq!(item.inbound_link_types().count(), 1);
    }

    #[test]
    fn test_channel_links_require_both_members() {
        let c = make_catalog();
        let out = c.outbound_links(ChannelId(10), EntityId(1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, EntityId(2));
        assert_eq!(c.all_outbound_links(EntityId(1)).unwrap().len(), 2);
    }

    #[test]
    fn test_structure_parent_count() {
        let c = make_catalog();
        assert_eq!(c.structure_parent_count(ChannelId(10), EntityId(2)).unwrap(), 1);
        assert_eq!(c.structure_parent_count(ChannelId(10), EntityId(1)).unwrap(), 0);
    }

    #[test]
    fn test_shallow_load_strips_fields() {
        let c = make_catalog();
        let e = c.entity(EntityId(1), LoadLevel::Shallow).unwrap().unwrap();
        assert!(e.fields.is_empty());
        let e = c.entity(EntityId(1), LoadLevel::DataOnly).unwrap().unwrap();
        assert_eq!(e.fields.len(), 1);
    }

    #[test]
    fn test_channel_entity_types_in_host_order() {
        let c = make_catalog();
        let types = c.channel_entity_types(ChannelId(10)).unwrap();
        assert_eq!(types, vec!["Product".to_string(), "Item".to_string()]);
        assert!(c.channel_entity_types(ChannelId(99)).is_err());
    }

    #[test]
    fn test_unknown_cvl_values_is_not_found() {
        let c = make_catalog();
        assert!(matches!(
            c.cvl_values("Colors"),
            Err(HostError::NotFound { kind: "cvl", .. })
        ));
    }

    #[test]
    fn test_fixture_round_trip() {
        let c = make_catalog();
        let json = serde_json::to_string(&c).unwrap();
        let back = InMemoryCatalog::from_json_str(&json).unwrap();
        assert_eq!(back.entities.len(), 3);
        assert_eq!(back.channels[0].entities, vec![EntityId(1), EntityId(2)]);
    }
}
