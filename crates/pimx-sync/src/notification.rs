//! # Notifications
//!
//! Change events delivered by the host. Serialized with an internal
//! `"kind"` tag so a sequence of events can be replayed from JSON:
//!
//! ```json
//! { "kind": "LinkAdded", "channel_id": 52906, "source": 10, "target": 11,
//!   "link_type_id": "ProductItem" }
//! ```

use pimx_core::{ChannelId, Entity, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Notification {
    // ── Channel structure ──
    EntityAdded {
        channel_id: ChannelId,
        entity_id: EntityId,
    },
    /// Carries the entity as it was before deletion.
    EntityDeleted {
        channel_id: ChannelId,
        entity: Entity,
    },
    EntityUpdated {
        channel_id: ChannelId,
        entity_id: EntityId,
    },
    FieldSetUpdated {
        channel_id: ChannelId,
        entity_id: EntityId,
        #[serde(default)]
        field_set_id: Option<String>,
    },
    SpecificationFieldAdded {
        channel_id: ChannelId,
        entity_id: EntityId,
        field_name: String,
    },
    SpecificationFieldUpdated {
        channel_id: ChannelId,
        entity_id: EntityId,
        field_name: String,
    },
    LinkAdded {
        channel_id: ChannelId,
        source: EntityId,
        target: EntityId,
        link_type_id: String,
        #[serde(default)]
        link_entity_id: Option<EntityId>,
    },
    LinkDeleted {
        channel_id: ChannelId,
        source: EntityId,
        target: EntityId,
        link_type_id: String,
        #[serde(default)]
        link_entity_id: Option<EntityId>,
    },
    LinkUpdated {
        channel_id: ChannelId,
        source: EntityId,
        target: EntityId,
        link_type_id: String,
        #[serde(default)]
        link_entity_id: Option<EntityId>,
    },

    // ── Controlled value lists ──
    CvlValueCreated {
        cvl_id: String,
        key: String,
    },
    CvlValueUpdated {
        cvl_id: String,
        key: String,
    },
    CvlValueDeleted {
        cvl_id: String,
        key: String,
    },
    CvlValuesDeletedAll {
        cvl_id: String,
    },

    // ── Specifications ──
    SpecificationCategoryUpdated {
        category_id: String,
    },
    SpecificationTemplateCreated {
        template_id: String,
    },
    SpecificationTemplateUpdated {
        template_id: String,
    },
}

impl Notification {
    /// Channel the notification is scoped to, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Notification::EntityAdded { channel_id, .. }
            | Notification::EntityDeleted { channel_id, .. }
            | Notification::EntityUpdated { channel_id, .. }
            | Notification::FieldSetUpdated { channel_id, .. }
            | Notification::SpecificationFieldAdded { channel_id, .. }
            | Notification::SpecificationFieldUpdated { channel_id, .. }
            | Notification::LinkAdded { channel_id, .. }
            | Notification::LinkDeleted { channel_id, .. }
            | Notification::LinkUpdated { channel_id, .. } => Some(*channel_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::EntityAdded { .. } => "EntityAdded",
            Notification::EntityDeleted { .. } => "EntityDeleted",
            Notification::EntityUpdated { .. } => "EntityUpdated",
            Notification::FieldSetUpdated { .. } => "FieldSetUpdated",
            Notification::SpecificationFieldAdded { .. } => "SpecificationFieldAdded",
            Notification::SpecificationFieldUpdated { .. } => "SpecificationFieldUpdated",
            Notification::LinkAdded { .. } => "LinkAdded",
            Notification::LinkDeleted { .. } => "LinkDeleted",
            Notification::LinkUpdated { .. } => "LinkUpdated",
            Notification::CvlValueCreated { .. } => "CvlValueCreated",
            Notification::CvlValueUpdated { .. } => "CvlValueUpdated",
            Notification::CvlValueDeleted { .. } => "CvlValueDeleted",
            Notification::CvlValuesDeletedAll { .. } => "CvlValuesDeletedAll",
            Notification::SpecificationCategoryUpdated { .. } => "SpecificationCategoryUpdated",
            Notification::SpecificationTemplateCreated { .. } => "SpecificationTemplateCreated",
            Notification::SpecificationTemplateUpdated { .. } => "SpecificationTemplateUpdated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_link_added() {
        let n: Notification = serde_json::from_str(
            r#"{"kind":"LinkAdded","channel_id":52906,"source":10,"target":11,"link_type_id":"ProductItem"}"#,
        )
        .unwrap();
        assert_eq!(
            n,
            Notification::LinkAdded {
                channel_id: ChannelId(52906),
                source: EntityId(10),
                target: EntityId(11),
                link_type_id: "ProductItem".to_string(),
                link_entity_id: None,
            }
        );
        assert_eq!(n.channel(), Some(ChannelId(52906)));
        assert_eq!(n.kind(), "LinkAdded");
    }

    #[test]
    fn test_parse_entity_deleted_snapshot() {
        let n: Notification = serde_json::from_str(
            r#"{"kind":"EntityDeleted","channel_id":1,"entity":{"id":5,"entity_type_id":"Item","fields":{"ItemNumber":"I-5"}}}"#,
        )
        .unwrap();
        let Notification::EntityDeleted { entity, .. } = n else {
            panic!("wrong variant");
        };
        assert_eq!(entity.id, EntityId(5));
        assert_eq!(entity.field("ItemNumber").map(|d| d.as_text()).as_deref(), Some("I-5"));
    }

    #[test]
    fn test_cvl_notifications_are_unscoped() {
        let n: Notification =
            serde_json::from_str(r#"{"kind":"CvlValuesDeletedAll","cvl_id":"Colors"}"#).unwrap();
        assert_eq!(n.channel(), None);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(serde_json::from_str::<Notification>(r#"{"kind":"Bogus"}"#).is_err());
    }
}
