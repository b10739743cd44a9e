//! # Resource Materialization
//!
//! Copies the stored files behind Resource entities into the object store,
//! one copy per configured image rendition.
//!
//! A file whose extension has no image configuration is stored once, as
//! its `Original` rendition. Otherwise each configured rendition name
//! (other than `Original`) that exists for the extension is stored under
//! the rendition's output extension.
//!
//! Every failure here is local to one file: it is logged and the next file
//! proceeds.

use std::path::Path;
use std::sync::Arc;

use pimx_core::{CatalogReader, EntityId, FieldData, FileId, ImageConfiguration, LoadLevel};

use crate::document::resource_file_path;
use crate::store::ObjectStore;

/// Field holding the id of a resource's stored file.
pub const RESOURCE_FILE_ID_FIELD: &str = "ResourceFileId";

/// Field holding a resource's original file name.
pub const RESOURCE_FILENAME_FIELD: &str = "ResourceFilename";

/// Display configuration of the unconverted file.
pub const ORIGINAL_CONFIGURATION: &str = "Original";

/// Writes resource files to the object store.
pub struct ResourceMaterializer {
    reader: Arc<dyn CatalogReader>,
    store: Arc<dyn ObjectStore>,
    resource_folder: String,
    /// Rendition names to produce.
    configurations: Vec<String>,
}

impl std::fmt::Debug for ResourceMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMaterializer")
            .field("resource_folder", &self.resource_folder)
            .field("configurations", &self.configurations)
            .finish()
    }
}

impl ResourceMaterializer {
    pub fn new(
        reader: Arc<dyn CatalogReader>,
        store: Arc<dyn ObjectStore>,
        resource_folder: &str,
        configurations: Vec<String>,
    ) -> Self {
        Self {
            reader,
            store,
            resource_folder: resource_folder.to_string(),
            configurations,
        }
    }

    /// Materialize the files of the given resources.
    ///
    /// Returns the number of resources whose files were processed.
    pub fn materialize(&self, ids: &[EntityId]) -> usize {
        let image_configurations = match self.reader.image_configurations() {
            Ok(configs) => configs,
            Err(e) => {
                tracing::error!(error = %e, "image configurations unavailable, resources not materialized");
                return 0;
            }
        };

        let mut processed = 0;
        for id in ids {
            let Some((file_id, file_name)) = self.resource_file(*id) else {
                continue;
            };
            let extension = Path::new(&file_name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            if !image_configurations.iter().any(|c| c.extension == extension) {
                self.store_rendition(file_id, ORIGINAL_CONFIGURATION, &file_name, &file_name);
                processed += 1;
                continue;
            }

            for name in &self.configurations {
                if name == ORIGINAL_CONFIGURATION {
                    continue;
                }
                match find_configuration(&image_configurations, &extension, name) {
                    Some(config) => {
                        let output_name = rendition_file_name(&file_name, config);
                        self.store_rendition(file_id, name, &file_name, &output_name);
                    }
                    None => {
                        tracing::warn!(
                            entity_id = %id,
                            configuration = %name,
                            extension = %extension,
                            "no image configuration for extension"
                        );
                    }
                }
            }
            processed += 1;
        }
        processed
    }

    /// Number of resources that reference a stored file.
    pub fn count_with_file(&self, ids: &[EntityId]) -> usize {
        ids.iter()
            .filter(|id| match self.reader.entity(**id, LoadLevel::DataOnly) {
                Ok(Some(entity)) => entity.field(RESOURCE_FILE_ID_FIELD).is_some(),
                _ => false,
            })
            .count()
    }

    /// File id and file name of a resource, or `None` (logged) when either
    /// is missing.
    fn resource_file(&self, id: EntityId) -> Option<(FileId, String)> {
        let entity = match self.reader.entity(id, LoadLevel::DataOnly) {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                tracing::warn!(entity_id = %id, "resource not found");
                return None;
            }
            Err(e) => {
                tracing::error!(entity_id = %id, error = %e, "resource could not be read");
                return None;
            }
        };

        let file_id = entity.field(RESOURCE_FILE_ID_FIELD).and_then(file_id_of);
        let file_name = entity
            .field(RESOURCE_FILENAME_FIELD)
            .map(FieldData::as_text)
            .filter(|name| !name.is_empty());
        match (file_id, file_name) {
            (Some(file_id), Some(file_name)) => Some((file_id, file_name)),
            _ => {
                tracing::warn!(entity_id = %id, "resource has no file id or file name, skipped");
                None
            }
        }
    }

    fn store_rendition(&self, file_id: FileId, configuration: &str, file_name: &str, output_name: &str) {
        let bytes = match self.reader.file(file_id, configuration) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::warn!(file_id = file_id.0, configuration = %configuration, file = %file_name, "file not found");
                return;
            }
            Err(e) => {
                tracing::error!(file_id = file_id.0, configuration = %configuration, error = %e, "file retrieval failed");
                return;
            }
        };
        let path = resource_file_path(&self.resource_folder, configuration, file_id, output_name);
        match self.store.put(&path, &bytes) {
            Ok(()) => {
                metrics::counter!("pimx_resource_files_stored_total", "configuration" => configuration.to_string())
                    .increment(1);
                tracing::debug!(path = %path, "resource file stored");
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "resource file not stored");
            }
        }
    }
}

fn find_configuration<'a>(
    configs: &'a [ImageConfiguration],
    extension: &str,
    name: &str,
) -> Option<&'a ImageConfiguration> {
    configs.iter().find(|c| c.extension == extension && c.name == name)
}

/// File name of a rendition: the original stem with the configuration's
/// output extension, or the original name when none is set.
fn rendition_file_name(file_name: &str, config: &ImageConfiguration) -> String {
    match config.output_extension.as_deref() {
        Some(ext) if !ext.is_empty() => {
            let stem = Path::new(file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.to_string());
            format!("{stem}.{}", ext.trim_start_matches('.'))
        }
        _ => file_name.to_string(),
    }
}

fn file_id_of(data: &FieldData) -> Option<FileId> {
    match data {
        FieldData::Integer(n) => Some(FileId(*n)),
        other => other.as_text().trim().parse().ok().map(FileId),
    }
}
