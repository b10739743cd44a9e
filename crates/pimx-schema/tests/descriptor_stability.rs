//! Integration test: descriptors built from arbitrary entity-type metadata
//! are stable across rebuilds and always compile to a validator.

use std::sync::Arc;

use pimx_core::model::{Cvl, CvlValue, DataType, EntityType, FieldType, LinkType};
use pimx_core::InMemoryCatalog;
use pimx_schema::{SchemaCatalog, SchemaDescriptor};
use proptest::prelude::*;
use serde_json::json;

fn make_cvl(values: &[&str]) -> (Cvl, Vec<CvlValue>) {
    let cvl = Cvl {
        id: "Sizes".to_string(),
        parent_id: None,
        data_type: "String".to_string(),
        custom_value_list: false,
    };
    let values = values
        .iter()
        .enumerate()
        .map(|(i, key)| CvlValue {
            key: key.to_string(),
            value: (*key).into(),
            parent_key: None,
            index: i as i32,
        })
        .collect();
    (cvl, values)
}

fn field_strategy() -> impl Strategy<Value = (u8, bool, bool, bool)> {
    (0u8..3, any::<bool>(), any::<bool>(), any::<bool>())
}

fn make_catalog(fields: &[(u8, bool, bool, bool)], field_sets: bool) -> InMemoryCatalog {
    let field_types = fields
        .iter()
        .enumerate()
        .map(|(i, (kind, multivalue, unique, mandatory))| {
            let (data_type, cvl_id) = match kind {
                0 => (DataType::Scalar, None),
                1 => (DataType::LocaleString, None),
                _ => (DataType::Cvl, Some("Sizes".to_string())),
            };
            FieldType {
                id: format!("ItemField{i}"),
                data_type,
                multivalue: *multivalue,
                unique: *unique,
                mandatory: *mandatory,
                cvl_id,
            }
        })
        .collect();

    let (cvl, values) = make_cvl(&["S", "M", "L"]);
    InMemoryCatalog::new()
        .with_languages(&["en", "de"])
        .with_entity_type(EntityType {
            id: "Item".to_string(),
            field_types,
            link_types: vec![],
            field_sets: if field_sets {
                vec!["Shoes".to_string()]
            } else {
                vec![]
            },
        })
        .with_entity_type(EntityType {
            id: "Product".to_string(),
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
        .with_cvl(cvl, values)
}

proptest! {
    #[test]
    fn rebuild_yields_identical_descriptor(
        fields in prop::collection::vec(field_strategy(), 0..6),
        field_sets in any::<bool>(),
    ) {
        let catalog = make_catalog(&fields, field_sets);
        let a = SchemaDescriptor::build(&catalog, "Item").unwrap();
        let b = SchemaDescriptor::build(&catalog, "Item").unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.fields.len(), fields.len());
    }

    #[test]
    fn every_descriptor_compiles(
        fields in prop::collection::vec(field_strategy(), 0..6),
        field_sets in any::<bool>(),
    ) {
        let catalog = SchemaCatalog::new(Arc::new(make_catalog(&fields, field_sets)));
        let item = catalog.get_or_build("Item", false).unwrap();
        let product = catalog.get_or_build("Product", false).unwrap();
        prop_assert_eq!(catalog.build_count(), 2);

        // An entity with no fields and no links is always well-formed.
        let empty = json!({ "Items": [{
            "EntityId": 1, "Action": "Updated", "Fields": [],
            "Links": { "ParentLinks": [], "ChildLinks": [] }
        }] });
        prop_assert!(item.is_valid(&empty));
        prop_assert!(!product.is_valid(&empty));
    }
}
