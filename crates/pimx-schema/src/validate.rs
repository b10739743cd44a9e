//! # Schema Validation
//!
//! Compiles a [`SchemaDescriptor`] into a Draft 2020-12 validator and checks
//! assembled documents against it.
//!
//! ## Invariant
//!
//! A document is either valid in full or rejected in full. Rejections carry
//! every violation with its instance path and schema path, so a failed
//! export can be traced to the offending field or link entry.

use std::fmt;

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::SchemaDescriptor;
use crate::error::SchemaError;

/// A document did not conform to its entity type's schema.
#[derive(Error, Debug, Clone)]
#[error("validation failed against schema '{entity_type_id}':\n{violations}")]
pub struct SchemaValidationError {
    /// Entity type whose schema rejected the document.
    pub entity_type_id: String,
    /// Structured list of individual violations.
    pub violations: ValidationViolations,
}

/// A single validation violation with structured context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// JSON Pointer path to the violating value in the instance.
    pub instance_path: String,
    /// JSON Pointer path within the schema that triggered the error.
    pub schema_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "  (root): {}", self.message)
        } else {
            write!(f, "  {}: {}", self.instance_path, self.message)
        }
    }
}

/// Collection of validation violations.
#[derive(Debug, Clone)]
pub struct ValidationViolations {
    violations: Vec<Violation>,
}

impl ValidationViolations {
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn into_inner(self) -> Vec<Violation> {
        self.violations
    }
}

impl fmt::Display for ValidationViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// A descriptor together with its rendered JSON Schema and compiled validator.
pub struct CompiledSchema {
    descriptor: SchemaDescriptor,
    json_schema: Value,
    validator: Validator,
    generation: u64,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("entity_type_id", &self.descriptor.entity_type_id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl CompiledSchema {
    /// Render and compile `descriptor`.
    ///
    /// `generation` is the catalog's build counter at the time of the build.
    pub fn compile(descriptor: SchemaDescriptor, generation: u64) -> Result<Self, SchemaError> {
        let json_schema = descriptor.to_json_schema();

        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        let validator = opts
            .build(&json_schema)
            .map_err(|e| SchemaError::ValidatorBuild {
                entity_type_id: descriptor.entity_type_id.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            descriptor,
            json_schema,
            validator,
            generation,
        })
    }

    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    /// Build counter value this schema was produced at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Validate a document, collecting every violation.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaValidationError> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(instance)
            .map(|e| Violation {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError {
                entity_type_id: self.descriptor.entity_type_id.clone(),
                violations: ValidationViolations { violations },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldKind, FieldShape, LinkShape};
    use serde_json::json;

    fn make_descriptor() -> SchemaDescriptor {
        SchemaDescriptor {
            entity_type_id: "Item".to_string(),
            field_sets: vec![],
            external_unique_id_fields: vec!["ItemNumber".to_string()],
            languages: vec!["en".to_string()],
            cvl_ids: vec!["Colors".to_string()],
            fields: vec![
                FieldShape {
                    field_type_id: "ItemNumber".to_string(),
                    kind: FieldKind::Scalar,
                },
                FieldShape {
                    field_type_id: "ItemName".to_string(),
                    kind: FieldKind::LocaleString,
                },
                FieldShape {
                    field_type_id: "ItemColor".to_string(),
                    kind: FieldKind::Cvl {
                        cvl_id: "Colors".to_string(),
                        values: vec!["".to_string(), "Red".to_string()],
                        multivalue: false,
                    },
                },
            ],
            parent_links: vec![LinkShape {
                link_type_id: "ProductItem".to_string(),
                source_entity_type_id: "Product".to_string(),
                target_entity_type_id: "Item".to_string(),
                unique_field_names: vec!["EntityId".to_string()],
            }],
            child_links: vec![],
        }
    }

    fn make_document() -> Value {
        json!({
            "Items": [{
                "EntityId": 5,
                "Action": "New",
                "ExternalUniqueIdField": "ItemNumber",
                "Fields": [
                    { "FieldTypeId": "ItemNumber", "Data": ["I-5"] },
                    { "FieldTypeId": "ItemName", "Data": [{ "Language": "en", "Value": "Shirt" }] },
                    { "FieldTypeId": "ItemColor", "Cvl": "Colors", "Data": ["Red"] }
                ],
                "Links": {
                    "ParentLinks": [{
                        "LinkTypeId": "ProductItem",
                        "SourceEntityTypeId": "Product",
                        "TargetEntityTypeId": "Item",
                        "UniqueFieldName": "EntityId",
                        "UniqueValue": "1",
                        "SourceEntityId": 1,
                        "SortOrder": 0
                    }],
                    "ChildLinks": []
                }
            }]
        })
    }

    fn make_schema() -> CompiledSchema {
        CompiledSchema::compile(make_descriptor(), 1).unwrap()
    }

    #[test]
    fn test_valid_document_passes() {
        let schema = make_schema();
        schema.validate(&make_document()).unwrap();
        assert!(schema.is_valid(&make_document()));
    }

    #[test]
    fn test_unknown_language_rejected() {
        let mut doc = make_document();
        doc["Items"][0]["Fields"][1]["Data"][0]["Language"] = json!("fr");
        let err = make_schema().validate(&doc).unwrap_err();
        assert_eq!(err.entity_type_id, "Item");
        assert!(!err.violations.is_empty());
    }

    #[test]
    fn test_unknown_cvl_key_rejected() {
        let mut doc = make_document();
        doc["Items"][0]["Fields"][2]["Data"] = json!(["Green"]);
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_single_value_cvl_rejects_two_keys() {
        let mut doc = make_document();
        doc["Items"][0]["Fields"][2]["Data"] = json!(["Red", ""]);
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_child_link_rejected_when_type_has_none() {
        let mut doc = make_document();
        doc["Items"][0]["Links"]["ChildLinks"] = doc["Items"][0]["Links"]["ParentLinks"].clone();
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_field_set_rejected_when_type_declares_none() {
        let mut doc = make_document();
        doc["Items"][0]["FieldSet"] = json!("Apparel");
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_undeclared_field_rejected() {
        let mut doc = make_document();
        doc["Items"][0]["Fields"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "FieldTypeId": "ItemWeight", "Data": ["3"] }));
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_deleted_link_action_accepted() {
        let mut doc = make_document();
        doc["Items"][0]["Links"]["ParentLinks"][0]["Action"] = json!("Deleted");
        assert!(make_schema().is_valid(&doc));
        doc["Items"][0]["Links"]["ParentLinks"][0]["Action"] = json!("New");
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_additionals_hold_one_block() {
        let mut doc = make_document();
        doc["Items"][0]["Additionals"] = json!({
            "SpecificationData": [{
                "SpecificationFieldTypeId": "Width",
                "Data": [{ "Value": "12 cm" }]
            }]
        });
        assert!(make_schema().is_valid(&doc));
        doc["Items"][0]["Additionals"]["SpecificationTemplate"] = json!([]);
        assert!(!make_schema().is_valid(&doc));
    }

    #[test]
    fn test_violation_display_format() {
        let v = Violation {
            instance_path: "/Items/0/Action".to_string(),
            schema_path: "/properties/Action/enum".to_string(),
            message: "\"Moved\" is not one of [\"New\",\"Updated\",\"Deleted\"]".to_string(),
        };
        assert!(v.to_string().starts_with("  /Items/0/Action: "));
    }

    #[test]
    fn test_violation_display_root() {
        let v = Violation {
            instance_path: String::new(),
            schema_path: "/required".to_string(),
            message: "\"Items\" is a required property".to_string(),
        };
        assert_eq!(v.to_string(), "  (root): \"Items\" is a required property");
    }
}
