//! Integration test: serialized documents conform to their schema, carry
//! the resolved external identity, and land in a directory store under
//! the expected names.

use std::sync::Arc;

use pimx_core::model::{Cvl, CvlValue, DataType, EntityType, FieldType, LinkType};
use pimx_core::{
    ChannelId, Entity, EntityAction, EntityId, ExportMapping, InMemoryCatalog, Link,
    UniqueFieldEntry,
};
use pimx_export::{DirectoryStore, DocumentWriter, EntitySerializer, WriteOutcome};
use pimx_schema::SchemaCatalog;
use proptest::prelude::*;

const CHANNEL: ChannelId = ChannelId(52906);

fn make_field(id: &str, data_type: DataType) -> FieldType {
    FieldType {
        id: id.to_string(),
        data_type,
        multivalue: false,
        unique: false,
        mandatory: false,
        cvl_id: None,
    }
}

fn make_catalog(item: Entity) -> InMemoryCatalog {
    let mut number = make_field("ItemNumber", DataType::Scalar);
    number.unique = true;
    number.mandatory = true;
    let mut tags = make_field("ItemTags", DataType::Cvl);
    tags.cvl_id = Some("Tags".to_string());
    tags.multivalue = true;

    let values = ["A", "B"]
        .iter()
        .enumerate()
        .map(|(i, k)| CvlValue {
            key: k.to_string(),
            value: (*k).into(),
            parent_key: None,
            index: i as i32,
        })
        .collect();

    InMemoryCatalog::new()
        .with_languages(&["en"])
        .with_entity_type(EntityType {
            id: "Product".to_string(),
            field_types: vec![make_field("ProductName", DataType::LocaleString)],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_entity_type(EntityType {
            id: "Item".to_string(),
            field_types: vec![number, tags],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_link_type(LinkType {
            id: "ProductItem".to_string(),
            source_entity_type_id: "Product".to_string(),
            target_entity_type_id: "Item".to_string(),
            link_entity_type_id: None,
        })
        .with_cvl(
            Cvl {
                id: "Tags".to_string(),
                parent_id: None,
                data_type: "String".to_string(),
                custom_value_list: false,
            },
            values,
        )
        .with_entity(Entity::new(1, "Product"))
        .with_entity(item)
        .with_link(Link::new(1, 2, "ProductItem"))
        .with_channel_members(52906, &[1, 2])
}

fn make_mapping() -> ExportMapping {
    ExportMapping {
        external_unique_field_types: vec![UniqueFieldEntry {
            entity_type_id: "Item".to_string(),
            field_type_id: "ItemNumber".to_string(),
        }],
        entity_types_to_export: vec!["Product".to_string(), "Item".to_string()],
        image_configurations: vec![],
        excluded_field_types: vec![],
    }
}

#[test]
fn test_documents_written_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = make_catalog(Entity::new(2, "Item").with_field("ItemNumber", "I:2"));
    let schemas = Arc::new(SchemaCatalog::new(Arc::new(catalog)).with_unique_fields(make_mapping().unique_field_map()));
    let store = Arc::new(DirectoryStore::new(dir.path()));
    let writer = DocumentWriter::new(schemas, store, &make_mapping(), "Publish");

    let item = Entity::new(2, "Item").with_field("ItemNumber", "I:2");
    let outcome = writer.write_entity(&item, EntityAction::New, CHANNEL, None).unwrap();
    let WriteOutcome::Written(path) = outcome else {
        panic!("item should be written");
    };
    assert!(path.ends_with("_Item_I.2.json"), "{path}");

    let bytes = std::fs::read(dir.path().join(&path)).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc["Items"][0]["Links"]["ParentLinks"][0]["SourceEntityId"], 1);

    let (batch, count) = writer
        .write_batch("Product", &[EntityId(1)], EntityAction::New, CHANNEL, true, None)
        .unwrap();
    assert_eq!(count, 1);
    assert!(dir.path().join(batch.path().unwrap()).exists());
}

proptest! {
    #[test]
    fn serialized_documents_validate(number in "[a-z0-9]{0,6}", tags in "[AB;]{0,8}") {
        let mut item = Entity::new(2, "Item").with_field("ItemTags", tags.as_str());
        if !number.is_empty() {
            item = item.with_field("ItemNumber", number.as_str());
        }
        let catalog = Arc::new(make_catalog(item));
        let map = make_mapping().unique_field_map();
        let schemas = Arc::new(SchemaCatalog::new(catalog).with_unique_fields(map.clone()));
        let serializer = EntitySerializer::new(Arc::clone(&schemas), Vec::new());

        let fragment = serializer
            .serialize_by_id(EntityId(2), EntityAction::Updated, &map, CHANNEL)
            .unwrap();
        let schema = schemas.get_or_build("Item", false).unwrap();
        prop_assert!(schema.is_valid(&fragment.document));
        prop_assert_eq!(fragment.schema_generation, schema.generation());

        let expected = if number.is_empty() { None } else { Some(number.clone()) };
        prop_assert_eq!(fragment.external_unique_value(), expected);

        let entity = &fragment.entities()[0];
        let tag_field = entity["Fields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["FieldTypeId"] == "ItemTags")
            .unwrap();
        let keys: Vec<String> = tag_field["Data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        prop_assert!(!keys.is_empty());
        prop_assert_eq!(keys.concat(), tags.replace(';', ""));
    }
}
