//! Compiled-schema cache keyed by entity-type id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::validate::CompiledSchema;

/// Thread-safe map of entity-type id to compiled schema.
///
/// The lock is held only for the map operation itself, never across a
/// schema build.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: Mutex<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_type_id: &str) -> Option<Arc<CompiledSchema>> {
        self.entries.lock().get(entity_type_id).cloned()
    }

    /// Insert or replace, returning the replaced schema.
    pub fn put(&self, schema: Arc<CompiledSchema>) -> Option<Arc<CompiledSchema>> {
        let key = schema.descriptor().entity_type_id.clone();
        self.entries.lock().insert(key, schema)
    }

    pub fn invalidate(&self, entity_type_id: &str) -> Option<Arc<CompiledSchema>> {
        self.entries.lock().remove(entity_type_id)
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    pub fn contains(&self, entity_type_id: &str) -> bool {
        self.entries.lock().contains_key(entity_type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
