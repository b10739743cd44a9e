//! Integration test: notifications and publishes driven through the
//! engine against an in-memory catalog and object store.

use std::sync::Arc;

use pimx_core::config::keys;
use pimx_core::model::{DataType, EntityType, FieldType, LinkType, RESOURCE_ENTITY_TYPE};
use pimx_core::{ChannelId, Entity, EntityId, FieldData, ImageConfiguration, InMemoryCatalog, Link, SettingsMap};
use pimx_export::MemoryStore;
use pimx_sync::{progress_percentage, BranchFailurePolicy, Dispatch, ExportEngine, Notification};
use proptest::prelude::*;
use serde_json::Value;

const CHANNEL: ChannelId = ChannelId(52906);

const MAPPING: &str = "\
external_unique_field_types:
  - entity_type_id: Product
    field_type_id: ProductNumber
  - entity_type_id: Item
    field_type_id: ItemNumber
entity_types_to_export: [Product, Item, Resource]
image_configurations: [Original, Thumbnail]
";

fn make_number_field(id: &str) -> FieldType {
    FieldType {
        id: id.to_string(),
        data_type: DataType::Scalar,
        multivalue: false,
        unique: true,
        mandatory: true,
        cvl_id: None,
    }
}

fn make_scalar_field(id: &str) -> FieldType {
    FieldType {
        id: id.to_string(),
        data_type: DataType::Scalar,
        multivalue: false,
        unique: false,
        mandatory: false,
        cvl_id: None,
    }
}

fn make_link_type(id: &str, source: &str, target: &str) -> LinkType {
    LinkType {
        id: id.to_string(),
        source_entity_type_id: source.to_string(),
        target_entity_type_id: target.to_string(),
        link_entity_type_id: None,
    }
}

fn make_model() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_languages(&["en"])
        .with_entity_type(EntityType {
            id: "Product".to_string(),
            field_types: vec![make_number_field("ProductNumber")],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_entity_type(EntityType {
            id: "Item".to_string(),
            field_types: vec![make_number_field("ItemNumber")],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_entity_type(EntityType {
            id: RESOURCE_ENTITY_TYPE.to_string(),
            field_types: vec![
                make_scalar_field("ResourceFileId"),
                make_scalar_field("ResourceFilename"),
            ],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_link_type(make_link_type("ProductItem", "Product", "Item"))
        .with_link_type(make_link_type("ItemItem", "Item", "Item"))
}

fn make_item(id: i64) -> Entity {
    Entity::new(id, "Item").with_field("ItemNumber", format!("I-{id}").as_str())
}

fn make_settings(extra: &[(&str, &str)]) -> SettingsMap {
    let mut settings = SettingsMap::defaults().with(keys::MAPPING, MAPPING);
    for (key, value) in extra {
        settings.set(key, value);
    }
    settings
}

fn make_engine(catalog: InMemoryCatalog, store: Arc<MemoryStore>, extra: &[(&str, &str)]) -> ExportEngine {
    let engine = ExportEngine::initialize(&make_settings(extra), Arc::new(catalog), store);
    assert!(engine.is_enabled(), "{:?}", engine.disabled_reason());
    engine
}

/// First element of the document's single collection.
fn first_element(doc: &Value) -> &Value {
    doc.as_object()
        .and_then(|root| root.values().next())
        .map(|items| &items[0])
        .unwrap_or(&Value::Null)
}

// ── Change propagation ──

#[test]
fn test_added_entity_with_self_link_written_once() {
    let catalog = make_model()
        .with_entity(make_item(7))
        .with_link(Link::new(7, 7, "ItemItem"))
        .with_channel_members(52906, &[7]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[(keys::UPDATE_PARENT_WHEN_ADD_ENTITY, "True")]);

    let dispatch = engine.handle(&Notification::EntityAdded {
        channel_id: CHANNEL,
        entity_id: EntityId(7),
    });
    assert_eq!(dispatch, Dispatch::Handled);
    assert_eq!(store.len(), 1, "{:?}", store.paths());

    let doc = store.objects()[0].json().unwrap();
    let element = first_element(&doc);
    assert_eq!(element["EntityId"], 7);
    assert_eq!(element["Action"], "New");
}

#[test]
fn test_added_entity_without_parents_writes_one_document() {
    let catalog = make_model()
        .with_entity(make_item(8))
        .with_channel_members(52906, &[8]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[]);

    engine.handle(&Notification::EntityAdded {
        channel_id: CHANNEL,
        entity_id: EntityId(8),
    });
    assert_eq!(store.len(), 1);
    assert!(store.paths()[0].ends_with("_Item_I-8.json"));
}

#[test]
fn test_deleted_link_marks_target_and_child_entry() {
    // The link 1 → 2 was removed and Item 2 left the channel with it.
    let catalog = make_model()
        .with_entity(Entity::new(1, "Product").with_field("ProductNumber", "P-1"))
        .with_entity(make_item(2))
        .with_entity(make_item(3))
        .with_link(Link::new(1, 3, "ProductItem"))
        .with_channel_members(52906, &[1, 3]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[]);

    let dispatch = engine.handle(&Notification::LinkDeleted {
        channel_id: CHANNEL,
        source: EntityId(1),
        target: EntityId(2),
        link_type_id: "ProductItem".to_string(),
        link_entity_id: None,
    });
    assert_eq!(dispatch, Dispatch::Handled);
    assert_eq!(store.len(), 2);

    let source = store.objects()[0].json().unwrap();
    let source = first_element(&source);
    assert_eq!(source["Action"], "Updated");
    let children = source["Links"]["ChildLinks"].as_array().unwrap();
    let deleted: Vec<&Value> = children.iter().filter(|c| c["Action"] == "Deleted").collect();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["TargetEntityId"], 2);
    assert_eq!(deleted[0]["UniqueValue"], "I-2");
    assert_eq!(children.len(), 2, "the remaining link stays listed");

    let target = store.objects()[1].json().unwrap();
    assert_eq!(first_element(&target)["Action"], "Deleted");
}

#[test]
fn test_link_to_entity_outside_channel_fails() {
    let catalog = make_model()
        .with_entity(Entity::new(1, "Product").with_field("ProductNumber", "P-1"))
        .with_entity(make_item(2))
        .with_channel_members(52906, &[1]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[]);

    let dispatch = engine.handle(&Notification::LinkAdded {
        channel_id: CHANNEL,
        source: EntityId(1),
        target: EntityId(2),
        link_type_id: "ProductItem".to_string(),
        link_entity_id: None,
    });
    assert_eq!(dispatch, Dispatch::Failed);
    assert!(store.is_empty());
}

// ── Loosely flagged unique fields ──

const LOOSE_MAPPING: &str = "\
external_unique_field_types:
  - entity_type_id: Product
    field_type_id: ProductCode
  - entity_type_id: Item
    field_type_id: ItemNumber
entity_types_to_export: [Product, Item]
";

/// Product identified by an unflagged code, Item by a unique but optional
/// number; Product 1 → Item 2.
fn make_loose_model(members: &[i64]) -> InMemoryCatalog {
    let mut item_number = make_number_field("ItemNumber");
    item_number.mandatory = false;
    InMemoryCatalog::new()
        .with_languages(&["en"])
        .with_entity_type(EntityType {
            id: "Product".to_string(),
            field_types: vec![make_scalar_field("ProductCode")],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_entity_type(EntityType {
            id: "Item".to_string(),
            field_types: vec![item_number],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_link_type(make_link_type("ProductItem", "Product", "Item"))
        .with_entity(Entity::new(1, "Product").with_field("ProductCode", "PC-1"))
        .with_entity(make_item(2))
        .with_channel_members(52906, members)
}

fn make_loose_engine(catalog: InMemoryCatalog, store: Arc<MemoryStore>) -> ExportEngine {
    let settings = SettingsMap::defaults().with(keys::MAPPING, LOOSE_MAPPING);
    let engine = ExportEngine::initialize(&settings, Arc::new(catalog), store);
    assert!(engine.is_enabled(), "{:?}", engine.disabled_reason());
    engine
}

#[test]
fn test_loosely_flagged_unique_fields_propagate() {
    let catalog = make_loose_model(&[1, 2]).with_link(Link::new(1, 2, "ProductItem"));
    let store = Arc::new(MemoryStore::new());
    let engine = make_loose_engine(catalog, store.clone());

    let dispatch = engine.handle(&Notification::EntityAdded {
        channel_id: CHANNEL,
        entity_id: EntityId(1),
    });
    assert_eq!(dispatch, Dispatch::Handled);
    assert_eq!(written_entity_ids(&store), vec![1, 2]);

    let product = store.objects()[0].json().unwrap();
    let product = first_element(&product);
    assert_eq!(product["ExternalUniqueIdField"], "ProductCode");
    assert_eq!(product["Links"]["ChildLinks"][0]["UniqueFieldName"], "ItemNumber");

    let item = store.objects()[1].json().unwrap();
    let item = first_element(&item);
    assert_eq!(item["ExternalUniqueIdField"], "ItemNumber");
    assert_eq!(item["Links"]["ParentLinks"][0]["UniqueFieldName"], "ProductCode");
    assert_eq!(item["Links"]["ParentLinks"][0]["UniqueValue"], "PC-1");
}

#[test]
fn test_loosely_flagged_removed_link_entry_validates() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_loose_engine(make_loose_model(&[1]), store.clone());

    let dispatch = engine.handle(&Notification::LinkDeleted {
        channel_id: CHANNEL,
        source: EntityId(1),
        target: EntityId(2),
        link_type_id: "ProductItem".to_string(),
        link_entity_id: None,
    });
    assert_eq!(dispatch, Dispatch::Handled);
    assert_eq!(store.len(), 2);

    let source = store.objects()[0].json().unwrap();
    let removed = &first_element(&source)["Links"]["ChildLinks"][0];
    assert_eq!(removed["Action"], "Deleted");
    assert_eq!(removed["UniqueFieldName"], "ItemNumber");
    assert_eq!(removed["UniqueValue"], "I-2");
}

/// Product 1 → Items 2, 3, 4 in sort order; writes of Item 3 fail.
fn make_fan_out() -> InMemoryCatalog {
    let mut catalog = make_model().with_entity(Entity::new(1, "Product").with_field("ProductNumber", "P-1"));
    for (index, id) in [2, 3, 4].into_iter().enumerate() {
        let mut link = Link::new(1, id, "ProductItem");
        link.index = index as i32;
        catalog = catalog.with_entity(make_item(id)).with_link(link);
    }
    catalog.with_channel_members(52906, &[1, 2, 3, 4])
}

fn written_entity_ids(store: &MemoryStore) -> Vec<i64> {
    store
        .objects()
        .iter()
        .filter_map(|o| o.json().ok())
        .filter_map(|doc| first_element(&doc)["EntityId"].as_i64())
        .collect()
}

#[test]
fn test_branch_failure_continues_siblings_by_default() {
    let store = Arc::new(MemoryStore::failing_when(|p| p.ends_with("_Item_I-3.json")));
    let engine = make_engine(make_fan_out(), store.clone(), &[]);
    let dispatch = engine.handle(&Notification::EntityAdded {
        channel_id: CHANNEL,
        entity_id: EntityId(1),
    });
    assert_eq!(dispatch, Dispatch::Failed);
    assert_eq!(written_entity_ids(&store), vec![1, 2, 4]);
}

#[test]
fn test_branch_failure_skip_remaining() {
    let store = Arc::new(MemoryStore::failing_when(|p| p.ends_with("_Item_I-3.json")));
    let engine = make_engine(make_fan_out(), store.clone(), &[])
        .with_branch_failure_policy(BranchFailurePolicy::SkipRemaining);
    let dispatch = engine.handle(&Notification::EntityAdded {
        channel_id: CHANNEL,
        entity_id: EntityId(1),
    });
    assert_eq!(dispatch, Dispatch::Failed);
    assert_eq!(written_entity_ids(&store), vec![1, 2]);
}

#[test]
fn test_replayed_notifications_from_json() {
    let catalog = make_model()
        .with_entity(make_item(2))
        .with_channel_members(52906, &[2]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[]);

    let notifications: Vec<Notification> = serde_json::from_str(
        r#"[
            {"kind":"EntityUpdated","channel_id":52906,"entity_id":2},
            {"kind":"EntityUpdated","channel_id":1,"entity_id":2}
        ]"#,
    )
    .unwrap();
    let dispatches: Vec<Dispatch> = notifications.iter().map(|n| engine.handle(n)).collect();
    assert_eq!(dispatches, vec![Dispatch::Handled, Dispatch::Ignored]);
    assert_eq!(store.len(), 1);
}

// ── Publish ──

fn make_items_channel(count: i64) -> InMemoryCatalog {
    let mut catalog = make_model();
    let ids: Vec<i64> = (1..=count).collect();
    for id in &ids {
        catalog = catalog.with_entity(make_item(*id));
    }
    catalog.with_channel_members(52906, &ids)
}

#[test]
fn test_chunked_publish_numbers_parts() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(
        make_items_channel(7),
        store.clone(),
        &[(keys::MAX_ENTITIES_IN_PUBLISHED_FILE, "3")],
    );

    let report = engine.publish(CHANNEL).unwrap();
    assert!(report.is_clean(), "{:?}", report.failed_units);
    assert_eq!(report.documents_written, 3);

    let paths = store.paths();
    assert!(paths[0].ends_with("_Item_Published-1.json"), "{paths:?}");
    assert!(paths[1].ends_with("_Item_Published-2.json"));
    assert!(paths[2].ends_with("_Item_Published-3.json"));

    let counts: Vec<usize> = store
        .objects()
        .iter()
        .map(|o| o.json().unwrap()["Items"].as_array().map(Vec::len).unwrap_or(0))
        .collect();
    assert_eq!(counts, vec![3, 3, 1]);

    let schemas = engine.schemas().unwrap();
    assert_eq!(schemas.build_count(), 1, "schema built for the first chunk only");
}

#[test]
fn test_chunk_failure_does_not_consume_part_number() {
    let store = Arc::new(MemoryStore::failing_when(|p| p.ends_with("Published-1.json")));
    let engine = make_engine(
        make_items_channel(7),
        store.clone(),
        &[(keys::MAX_ENTITIES_IN_PUBLISHED_FILE, "3")],
    );
    let report = engine.publish(CHANNEL).unwrap();
    // Every chunk tries part 1 until one lands; all of them fail here.
    assert_eq!(report.documents_written, 0);
    assert_eq!(report.failed_units.len(), 3);
    assert!(report.failed_units.iter().all(|u| u.part == Some(1) && u.kind == "storage"));
}

#[test]
fn test_single_file_publish() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(make_items_channel(5), store.clone(), &[]);
    let report = engine.publish(CHANNEL).unwrap();
    assert_eq!(report.documents_written, 1);
    assert!(store.paths()[0].ends_with("_Item_Published.json"));
    assert_eq!(report.progress, vec![1, 100]);
}

#[test]
fn test_per_entity_publish() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(
        make_items_channel(3),
        store.clone(),
        &[(keys::PUBLISH_AS_SINGLE_FILE, "False")],
    );
    let report = engine.publish(CHANNEL).unwrap();
    assert_eq!(report.documents_written, 3);
    assert!(store.paths().iter().all(|p| !p.contains("Published")));
}

#[test]
fn test_publish_materializes_resources_and_reports_progress() {
    let resource = |id: i64, file_id: i64, name: &str| {
        Entity::new(id, RESOURCE_ENTITY_TYPE)
            .with_field("ResourceFileId", FieldData::Integer(file_id))
            .with_field("ResourceFilename", name)
    };
    let catalog = make_model()
        .with_entity(Entity::new(1, "Product").with_field("ProductNumber", "P-1"))
        .with_entity(resource(10, 100, "shoe.jpg"))
        .with_entity(resource(11, 101, "manual.pdf"))
        .with_entity(Entity::new(12, RESOURCE_ENTITY_TYPE))
        .with_image_configuration(ImageConfiguration {
            name: "Thumbnail".to_string(),
            extension: "jpg".to_string(),
            output_extension: Some("png".to_string()),
        })
        .with_file(100, "Thumbnail", "thumb")
        .with_file(101, "Original", "pdf")
        .with_channel_members(52906, &[1, 10, 11, 12]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[]);

    let report = engine.publish(CHANNEL).unwrap();
    assert_eq!(report.resource_files, 2);
    assert_eq!(store.under("Publish/Resources").len(), 2);
    assert!(store.get("Publish/Resources/Thumbnail/100_shoe.png").is_some());

    // total = 4 entities + 2 files; samples before Product, before
    // Resource, before materialization, and at the end.
    assert_eq!(report.progress, vec![1, 17, 67, 100]);
    assert!(report.progress.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_publish_skips_unexported_groups() {
    let catalog = make_model()
        .with_entity_type(EntityType {
            id: "Task".to_string(),
            field_types: vec![],
            link_types: vec![],
            field_sets: vec![],
        })
        .with_entity(make_item(1))
        .with_entity(Entity::new(2, "Task"))
        .with_channel_members(52906, &[1, 2]);
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(catalog, store.clone(), &[]);

    let report = engine.publish(CHANNEL).unwrap();
    assert_eq!(report.skipped_groups, vec!["Task".to_string()]);
    assert_eq!(report.documents_written, 1);
    assert_eq!(report.progress.last(), Some(&100));
}

// ── Progress ──

#[test]
fn test_progress_countdown_from_ten() {
    let samples: Vec<u8> = (0..=10).rev().map(|remaining| progress_percentage(10, remaining)).collect();
    assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
    assert_eq!(samples.last(), Some(&100));
    assert!(samples[..10].iter().all(|p| *p < 100));
}

proptest! {
    #[test]
    fn progress_is_monotonic(total in 1usize..5000, steps in proptest::collection::vec(0usize..50, 1..40)) {
        let mut remaining = total;
        let mut last = progress_percentage(total, remaining);
        for step in steps {
            remaining = remaining.saturating_sub(step);
            let next = progress_percentage(total, remaining);
            prop_assert!(next >= last);
            prop_assert_eq!(next == 100, remaining == 0);
            last = next;
        }
    }
}
