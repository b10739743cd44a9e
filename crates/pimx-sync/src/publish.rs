//! # Full Publish
//!
//! Exports every entity of a channel, group by group, with progress
//! accounting.
//!
//! ## Groups
//!
//! Groups are the channel's entity types followed by its link-entity
//! types. Empty groups and repeated type ids are dropped.
//!
//! ## Modes
//!
//! | Setting | Documents per group |
//! |---|---|
//! | single file, max 0 | one batch document |
//! | single file, max n | batches of at most n, numbered from 1 |
//! | not single file | one document per entity |
//!
//! In chunked mode the schema is regenerated for chunks until the first
//! one of the group is written; a part number is consumed only by a
//! written chunk.
//!
//! ## Progress
//!
//! Total work is the number of entities plus the number of resources that
//! reference a file. A sample is taken before each group and before
//! resource materialization; the remaining work then drops by what the
//! step covers, whether or not it succeeded. Skipped groups count as
//! covered. Samples never decrease and reach 100 only once no work
//! remains.

use std::sync::Arc;

use pimx_core::model::RESOURCE_ENTITY_TYPE;
use pimx_core::{CatalogReader, ChannelId, EntityAction, EntityId, LoadLevel};
use pimx_export::{CvlExporter, DocumentWriter, ErrorKind, ExportError, ResourceMaterializer, WriteOutcome};
use serde::Serialize;

use crate::error::SyncError;

/// Progress percentage for `remaining` units left out of `total`.
///
/// The completed fraction is truncated and raised by one, except that a
/// finished run reports exactly 100. While work remains the result stays
/// at or below 99. An empty run is finished.
pub fn progress_percentage(total: usize, remaining: usize) -> u8 {
    if total == 0 || remaining == 0 {
        return 100;
    }
    let done = total.saturating_sub(remaining);
    let percent = (done * 100 / total).min(100) as u8;
    (percent + 1).min(99)
}

/// How a group is split into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// One batch document per group.
    SingleFile,
    /// Batches of at most this many entities.
    Chunked(usize),
    /// One document per entity.
    PerEntity,
}

impl PublishMode {
    pub fn from_settings(publish_as_single_file: bool, max_entities_per_file: usize) -> Self {
        match (publish_as_single_file, max_entities_per_file) {
            (false, _) => PublishMode::PerEntity,
            (true, 0) => PublishMode::SingleFile,
            (true, max) => PublishMode::Chunked(max),
        }
    }
}

/// A unit of publish work that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub entity_type_id: String,
    /// Chunk number, in chunked mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,
    /// Entity, in per-entity mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    pub kind: String,
    pub message: String,
}

/// Outcome of one publish run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub documents_written: usize,
    pub cvl_documents_written: usize,
    /// Resources whose files were materialized.
    pub resource_files: usize,
    pub failed_units: Vec<FailedUnit>,
    /// Groups whose entity type is not exported.
    pub skipped_groups: Vec<String>,
    /// Progress samples in the order they were reported.
    pub progress: Vec<u8>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failed_units.is_empty()
    }

    fn sample(&mut self, total: usize, remaining: usize) {
        let percent = progress_percentage(total, remaining);
        tracing::info!(progress = percent, remaining, total, "publish progress");
        self.progress.push(percent);
    }

    fn fail(&mut self, entity_type_id: &str, part: Option<usize>, entity_id: Option<EntityId>, kind: ErrorKind, message: String) {
        tracing::error!(
            entity_type = %entity_type_id,
            part = ?part,
            entity_id = ?entity_id,
            kind = %kind,
            error = %message,
            "publish unit failed"
        );
        self.failed_units.push(FailedUnit {
            entity_type_id: entity_type_id.to_string(),
            part,
            entity_id,
            kind: kind.to_string(),
            message,
        });
    }
}

/// One entity-type group of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishGroup {
    pub entity_type_id: String,
    pub ids: Vec<EntityId>,
}

/// Runs full channel publishes.
pub struct PublishOrchestrator {
    reader: Arc<dyn CatalogReader>,
    writer: Arc<DocumentWriter>,
    cvls: Arc<CvlExporter>,
    resources: Arc<ResourceMaterializer>,
    mode: PublishMode,
}

impl std::fmt::Debug for PublishOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishOrchestrator")
            .field("mode", &self.mode)
            .finish()
    }
}

impl PublishOrchestrator {
    pub fn new(
        reader: Arc<dyn CatalogReader>,
        writer: Arc<DocumentWriter>,
        cvls: Arc<CvlExporter>,
        resources: Arc<ResourceMaterializer>,
        mode: PublishMode,
    ) -> Self {
        Self {
            reader,
            writer,
            cvls,
            resources,
            mode,
        }
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Entity-type groups of the channel, in publish order.
    pub fn groups(&self, channel: ChannelId) -> Result<Vec<PublishGroup>, SyncError> {
        let mut groups: Vec<PublishGroup> = Vec::new();
        let seen = |groups: &[PublishGroup], id: &str| groups.iter().any(|g| g.entity_type_id == id);

        for entity_type_id in self.reader.channel_entity_types(channel)? {
            if seen(&groups, &entity_type_id) {
                continue;
            }
            let ids = self.reader.channel_entities_of_type(channel, &entity_type_id)?;
            if !ids.is_empty() {
                groups.push(PublishGroup { entity_type_id, ids });
            }
        }
        for entity_type_id in self.reader.channel_link_entity_types(channel)? {
            if seen(&groups, &entity_type_id) {
                continue;
            }
            let ids = self.reader.channel_link_entities_of_type(channel, &entity_type_id)?;
            if !ids.is_empty() {
                groups.push(PublishGroup { entity_type_id, ids });
            }
        }
        Ok(groups)
    }

    /// Publish the whole channel.
    ///
    /// Only enumerating the channel can fail the run; every later failure
    /// is recorded in the report and the run continues.
    pub fn publish(&self, channel: ChannelId) -> Result<PublishReport, SyncError> {
        let groups = self.groups(channel)?;
        let entity_count: usize = groups.iter().map(|g| g.ids.len()).sum();
        let file_counts: Vec<usize> = groups
            .iter()
            .map(|g| {
                if g.entity_type_id == RESOURCE_ENTITY_TYPE {
                    self.resources.count_with_file(&g.ids)
                } else {
                    0
                }
            })
            .collect();
        let file_count: usize = file_counts.iter().sum();
        let total = entity_count + file_count;
        let mut remaining = total;

        tracing::info!(
            channel_id = %channel,
            groups = groups.len(),
            entities = entity_count,
            resource_files = file_count,
            mode = ?self.mode,
            "publish started"
        );

        let mut report = PublishReport::default();
        for (group, files) in groups.iter().zip(file_counts) {
            report.sample(total, remaining);
            remaining = remaining.saturating_sub(group.ids.len());

            if !self.writer.is_exported(&group.entity_type_id) {
                tracing::info!(entity_type = %group.entity_type_id, "entity type not in export list, group skipped");
                report.skipped_groups.push(group.entity_type_id.clone());
                remaining = remaining.saturating_sub(files);
                continue;
            }

            match self.mode {
                PublishMode::SingleFile => self.publish_single(channel, group, &mut report),
                PublishMode::Chunked(max) => self.publish_chunked(channel, group, max, &mut report),
                PublishMode::PerEntity => self.publish_each(channel, group, &mut report),
            }

            match self.cvls.write_for_entity_type(&group.entity_type_id) {
                Ok(written) => report.cvl_documents_written += written,
                Err(e) => report.fail(&group.entity_type_id, None, None, e.kind(), e.to_string()),
            }

            if group.entity_type_id == RESOURCE_ENTITY_TYPE {
                report.sample(total, remaining);
                report.resource_files += self.resources.materialize(&group.ids);
                remaining = remaining.saturating_sub(files);
            }
        }
        report.sample(total, remaining);

        tracing::info!(
            channel_id = %channel,
            documents = report.documents_written,
            failed = report.failed_units.len(),
            skipped = report.skipped_groups.len(),
            "publish finished"
        );
        Ok(report)
    }

    fn publish_single(&self, channel: ChannelId, group: &PublishGroup, report: &mut PublishReport) {
        let result = self.writer.write_batch(
            &group.entity_type_id,
            &group.ids,
            EntityAction::New,
            channel,
            true,
            None,
        );
        self.record_batch(group, None, result, report);
    }

    fn publish_chunked(&self, channel: ChannelId, group: &PublishGroup, max: usize, report: &mut PublishReport) {
        let mut parts_written = 0;
        for chunk in group.ids.chunks(max) {
            let part = parts_written + 1;
            let result = self.writer.write_batch(
                &group.entity_type_id,
                chunk,
                EntityAction::New,
                channel,
                parts_written == 0,
                Some(part),
            );
            if self.record_batch(group, Some(part), result, report) {
                parts_written += 1;
            }
        }
    }

    fn publish_each(&self, channel: ChannelId, group: &PublishGroup, report: &mut PublishReport) {
        for id in &group.ids {
            let entity = match self.reader.entity(*id, LoadLevel::DataOnly) {
                Ok(Some(entity)) => entity,
                Ok(None) => {
                    tracing::warn!(entity_id = %id, "entity vanished during publish, skipped");
                    continue;
                }
                Err(e) => {
                    report.fail(&group.entity_type_id, None, Some(*id), ErrorKind::Host, e.to_string());
                    continue;
                }
            };
            match self.writer.write_entity(&entity, EntityAction::New, channel, None) {
                Ok(WriteOutcome::Written(_)) => report.documents_written += 1,
                Ok(WriteOutcome::NotExported) => {}
                Err(e) => report.fail(&group.entity_type_id, None, Some(*id), e.kind(), e.to_string()),
            }
        }
    }

    /// Whether the batch was written.
    fn record_batch(
        &self,
        group: &PublishGroup,
        part: Option<usize>,
        result: Result<(WriteOutcome, usize), ExportError>,
        report: &mut PublishReport,
    ) -> bool {
        match result {
            Ok((WriteOutcome::Written(_), _)) => {
                report.documents_written += 1;
                true
            }
            Ok((WriteOutcome::NotExported, _)) => false,
            Err(e) => {
                report.fail(&group.entity_type_id, part, None, e.kind(), e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── progress_percentage ──

    #[test]
    fn test_progress_empty_run_is_done() {
        assert_eq!(progress_percentage(0, 0), 100);
    }

    #[test]
    fn test_progress_truncates_and_offsets() {
        assert_eq!(progress_percentage(10, 10), 1);
        assert_eq!(progress_percentage(3, 2), 34);
        assert_eq!(progress_percentage(3, 1), 67);
        assert_eq!(progress_percentage(10, 0), 100);
    }

    #[test]
    fn test_progress_below_100_while_work_remains() {
        assert_eq!(progress_percentage(200, 1), 99);
        assert_eq!(progress_percentage(1000, 1), 99);
    }

    #[test]
    fn test_progress_remaining_above_total() {
        assert_eq!(progress_percentage(5, 9), 1);
    }

    // ── PublishMode ──

    #[test]
    fn test_mode_from_settings() {
        assert_eq!(PublishMode::from_settings(true, 0), PublishMode::SingleFile);
        assert_eq!(PublishMode::from_settings(true, 3), PublishMode::Chunked(3));
        assert_eq!(PublishMode::from_settings(false, 3), PublishMode::PerEntity);
    }
}
