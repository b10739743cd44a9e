//! # Host Capability Interface
//!
//! The exporter reads the host catalog only through [`CatalogReader`]. The
//! trait is narrow and read-only: schema generation, serialization and
//! change propagation depend on it and never on concrete host types.
//!
//! ## Channel scoping
//!
//! Methods taking a [`ChannelId`] answer within that channel's structure.
//! [`CatalogReader::all_outbound_links`] is the only link query that
//! ignores channels; it backs the "has a specification" check, which looks
//! at the entity's data-level links.

use crate::error::HostError;
use crate::identity::{ChannelId, EntityId, FileId};
use crate::model::{
    Category, Cvl, CvlValue, Entity, EntityType, ImageConfiguration, LinkType, Link, LoadLevel,
    SpecificationField, SpecificationFieldType,
};

/// Read-only access to the host product-information catalog.
///
/// `Ok(None)` means "does not exist"; `Err` means the host could not answer.
pub trait CatalogReader: Send + Sync {
    // ── Entities ──

    /// Read one entity at the requested load depth.
    fn entity(&self, id: EntityId, level: LoadLevel) -> Result<Option<Entity>, HostError>;

    // ── Model ──

    /// All entity types, in host order.
    fn entity_types(&self) -> Result<Vec<EntityType>, HostError>;

    /// One entity type with its field and link types.
    fn entity_type(&self, id: &str) -> Result<Option<EntityType>, HostError>;

    /// One link type.
    fn link_type(&self, id: &str) -> Result<Option<LinkType>, HostError>;

    /// Codes of every language known to the host.
    fn languages(&self) -> Result<Vec<String>, HostError>;

    /// One controlled value list.
    fn cvl(&self, id: &str) -> Result<Option<Cvl>, HostError>;

    /// Values of a controlled value list, in list order.
    fn cvl_values(&self, cvl_id: &str) -> Result<Vec<CvlValue>, HostError>;

    // ── Channel structure ──

    /// Entity types with at least one entity in the channel.
    fn channel_entity_types(&self, channel: ChannelId) -> Result<Vec<String>, HostError>;

    /// Link-entity types attached to links in the channel.
    fn channel_link_entity_types(&self, channel: ChannelId) -> Result<Vec<String>, HostError>;

    /// Ids of the channel's entities of one type.
    fn channel_entities_of_type(
        &self,
        channel: ChannelId,
        entity_type_id: &str,
    ) -> Result<Vec<EntityId>, HostError>;

    /// Ids of the link entities of one type attached to the channel's links.
    fn channel_link_entities_of_type(
        &self,
        channel: ChannelId,
        entity_type_id: &str,
    ) -> Result<Vec<EntityId>, HostError>;

    /// Links in the channel whose target is `id`.
    fn inbound_links(&self, channel: ChannelId, id: EntityId) -> Result<Vec<Link>, HostError>;

    /// Links in the channel whose source is `id`.
    fn outbound_links(&self, channel: ChannelId, id: EntityId) -> Result<Vec<Link>, HostError>;

    /// Links in the channel of one link type whose target is `id`.
    fn inbound_links_of_type(
        &self,
        channel: ChannelId,
        id: EntityId,
        link_type_id: &str,
    ) -> Result<Vec<Link>, HostError> {
        Ok(self
            .inbound_links(channel, id)?
            .into_iter()
            .filter(|l| l.link_type_id == link_type_id)
            .collect())
    }

    /// Every outbound link of `id`, regardless of channel.
    fn all_outbound_links(&self, id: EntityId) -> Result<Vec<Link>, HostError>;

    /// Whether `id` is part of the channel's structure.
    fn entity_in_channel(&self, channel: ChannelId, id: EntityId) -> Result<bool, HostError>;

    /// Number of structural positions `id` occupies in the channel.
    fn structure_parent_count(&self, channel: ChannelId, id: EntityId) -> Result<usize, HostError>;

    // ── Specifications ──

    /// All specification categories.
    fn specification_categories(&self) -> Result<Vec<Category>, HostError>;

    /// Every specification field type, across templates.
    fn specification_field_types(&self) -> Result<Vec<SpecificationFieldType>, HostError>;

    /// Template field types owned by a Specification entity.
    fn specification_template_field_types(
        &self,
        template: EntityId,
    ) -> Result<Vec<SpecificationFieldType>, HostError> {
        Ok(self
            .specification_field_types()?
            .into_iter()
            .filter(|f| f.entity_id == template)
            .collect())
    }

    /// Specification field types in one category.
    fn specification_field_types_for_category(
        &self,
        category_id: &str,
    ) -> Result<Vec<SpecificationFieldType>, HostError> {
        Ok(self
            .specification_field_types()?
            .into_iter()
            .filter(|f| f.category_id == category_id)
            .collect())
    }

    /// One specification field type.
    fn specification_field_type(
        &self,
        id: &str,
    ) -> Result<Option<SpecificationFieldType>, HostError> {
        Ok(self
            .specification_field_types()?
            .into_iter()
            .find(|f| f.id == id))
    }

    /// Specification values held by an entity.
    fn specification_fields(&self, entity: EntityId) -> Result<Vec<SpecificationField>, HostError>;

    /// Host-formatted rendering of a specification value.
    fn formatted_value(
        &self,
        field_type: &SpecificationFieldType,
        entity: EntityId,
    ) -> Result<Option<String>, HostError>;

    // ── Files ──

    /// Bytes of a stored file in one display configuration.
    fn file(&self, file_id: FileId, display_configuration: &str)
        -> Result<Option<Vec<u8>>, HostError>;

    /// Image renditions the host can produce.
    fn image_configurations(&self) -> Result<Vec<ImageConfiguration>, HostError>;

    /// Distinct names of the image renditions, in host order.
    fn image_configuration_names(&self) -> Result<Vec<String>, HostError> {
        let mut names: Vec<String> = Vec::new();
        for config in self.image_configurations()? {
            if !names.contains(&config.name) {
                names.push(config.name);
            }
        }
        Ok(names)
    }
}
