//! # Change Propagation
//!
//! Translates one channel notification into the documents it affects.
//!
//! ## Design
//!
//! - A top-level trigger owns a fresh [`WrittenSet`] and passes it by
//!   `&mut` through the descendant walk. No state outlives the trigger, so
//!   concurrent triggers never see each other's bookkeeping.
//! - The walk is depth-first over outbound channel links. A target is
//!   skipped when it was already written in this run or is still on the
//!   recursion stack, which makes cyclic structures terminate.
//! - A child's subtree is written before the child itself.
//! - A failed write aborts its branch. [`BranchFailurePolicy`] decides
//!   whether siblings of the failed branch still run.
//! - Independent writes (parents refreshed on add, the two ends of a link
//!   change) are isolated: one failure is logged and counted, the rest
//!   proceed.

use std::collections::HashSet;
use std::sync::Arc;

use pimx_core::{CatalogReader, ChannelId, Entity, EntityAction, EntityId, Link, LoadLevel};
use pimx_export::{DocumentWriter, ExportError, ResourceMaterializer, WriteOutcome};
use uuid::Uuid;

use crate::error::SyncError;

/// What happens to sibling branches after a branch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BranchFailurePolicy {
    /// Log the failed branch and move on to its siblings.
    #[default]
    ContinueSiblings,
    /// Stop the walk at the failing level and all levels above it.
    SkipRemaining,
}

// ─── Written set ────────────────────────────────────────────────────

/// Entities handled during one top-level trigger.
#[derive(Debug)]
pub struct WrittenSet {
    run_id: Uuid,
    written: HashSet<EntityId>,
    visiting: HashSet<EntityId>,
}

impl WrittenSet {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            written: HashSet::new(),
            visiting: HashSet::new(),
        }
    }

    /// A set that already counts `id` as written.
    pub fn seeded(id: EntityId) -> Self {
        let mut set = Self::new();
        set.mark_written(id);
        set
    }

    /// Correlation id of the run, attached to its log events.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn mark_written(&mut self, id: EntityId) {
        self.written.insert(id);
    }

    pub fn is_written(&self, id: EntityId) -> bool {
        self.written.contains(&id)
    }

    pub fn is_visiting(&self, id: EntityId) -> bool {
        self.visiting.contains(&id)
    }

    /// Whether the walk must not descend into `id` again.
    pub fn should_skip(&self, id: EntityId) -> bool {
        self.is_written(id) || self.is_visiting(id)
    }

    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }

    fn enter(&mut self, id: EntityId) {
        self.visiting.insert(id);
    }

    fn leave(&mut self, id: EntityId) {
        self.visiting.remove(&id);
    }
}

impl Default for WrittenSet {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Summary ────────────────────────────────────────────────────────

/// Document counts of one trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    /// Documents stored.
    pub written: usize,
    /// Writes skipped because the entity type is not exported.
    pub not_exported: usize,
    /// Writes that failed and were logged.
    pub failed: usize,
}

impl PropagationSummary {
    /// No write failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, result: &Result<WriteOutcome, ExportError>) {
        match result {
            Ok(WriteOutcome::Written(_)) => self.written += 1,
            Ok(WriteOutcome::NotExported) => self.not_exported += 1,
            Err(_) => self.failed += 1,
        }
    }
}

// ─── Propagator ─────────────────────────────────────────────────────

/// Writes the documents affected by channel changes.
pub struct ChangePropagator {
    reader: Arc<dyn CatalogReader>,
    writer: Arc<DocumentWriter>,
    resources: Arc<ResourceMaterializer>,
    update_parent_on_add: bool,
    failure_policy: BranchFailurePolicy,
}

impl std::fmt::Debug for ChangePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePropagator")
            .field("update_parent_on_add", &self.update_parent_on_add)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl ChangePropagator {
    pub fn new(
        reader: Arc<dyn CatalogReader>,
        writer: Arc<DocumentWriter>,
        resources: Arc<ResourceMaterializer>,
        update_parent_on_add: bool,
    ) -> Self {
        Self {
            reader,
            writer,
            resources,
            update_parent_on_add,
            failure_policy: BranchFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: BranchFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn set_failure_policy(&mut self, policy: BranchFailurePolicy) {
        self.failure_policy = policy;
    }

    pub fn failure_policy(&self) -> BranchFailurePolicy {
        self.failure_policy
    }

    // ── Entity triggers ──

    /// An entity entered the channel.
    ///
    /// Writes the entity as `New`. When that produced a document, refreshes
    /// its structural parents (if configured), materializes its files when
    /// it is a resource, and exports its descendants.
    pub fn entity_added(
        &self,
        channel: ChannelId,
        id: EntityId,
    ) -> Result<PropagationSummary, SyncError> {
        let mut summary = PropagationSummary::default();
        let entity = self.load(id)?;
        let outcome = self.write(&entity, EntityAction::New, channel, None, &mut summary)?;
        if !outcome.is_written() {
            return Ok(summary);
        }

        if self.update_parent_on_add {
            for parent in self.structural_parents(channel, &entity)? {
                self.write_isolated(parent, EntityAction::Updated, channel, None, &mut summary);
            }
        }
        if entity.is_resource() {
            self.resources.materialize(&[id]);
        }

        let mut set = WrittenSet::seeded(id);
        tracing::debug!(run_id = %set.run_id(), entity_id = %id, "exporting descendants of added entity");
        self.export_descendants(id, channel, &mut set, &mut summary)?;
        Ok(summary)
    }

    /// An entity left the channel. `entity` is its last known state.
    pub fn entity_deleted(
        &self,
        channel: ChannelId,
        entity: &Entity,
    ) -> Result<PropagationSummary, SyncError> {
        let mut summary = PropagationSummary::default();
        self.write(entity, EntityAction::Deleted, channel, None, &mut summary)?;
        Ok(summary)
    }

    /// An entity's data changed.
    pub fn entity_updated(
        &self,
        channel: ChannelId,
        id: EntityId,
    ) -> Result<PropagationSummary, SyncError> {
        let mut summary = PropagationSummary::default();
        let entity = self.load(id)?;
        let outcome = self.write(&entity, EntityAction::Updated, channel, None, &mut summary)?;
        if outcome.is_written() && entity.is_resource() {
            self.resources.materialize(&[id]);
        }
        Ok(summary)
    }

    /// A field or the field set of an entity changed.
    ///
    /// Checks the export list on a shallow load before reading any data.
    pub fn field_set_updated(
        &self,
        channel: ChannelId,
        id: EntityId,
    ) -> Result<PropagationSummary, SyncError> {
        let shallow = self
            .reader
            .entity(id, LoadLevel::Shallow)?
            .ok_or(SyncError::EntityNotFound { entity_id: id })?;
        if !self.writer.is_exported(&shallow.entity_type_id) {
            tracing::info!(
                entity_id = %id,
                entity_type = %shallow.entity_type_id,
                "entity type not in export list, field change ignored"
            );
            return Ok(PropagationSummary {
                not_exported: 1,
                ..PropagationSummary::default()
            });
        }
        self.entity_updated(channel, id)
    }

    // ── Link triggers ──

    /// A link was added inside the channel.
    ///
    /// The target is written as `New` when this link is its only structural
    /// parent, otherwise as `Updated`. Only a `New` target has its link
    /// entity and descendants exported.
    pub fn link_added(&self, channel: ChannelId, link: &Link) -> Result<PropagationSummary, SyncError> {
        if !self.reader.entity_in_channel(channel, link.target)? {
            return Err(SyncError::TargetNotInChannel {
                entity_id: link.target,
                channel_id: channel,
            });
        }

        let mut summary = PropagationSummary::default();
        if self.update_parent_on_add {
            self.write_isolated(link.source, EntityAction::Updated, channel, None, &mut summary);
        }

        let action = self.classify_added(channel, link.target)?;
        let target = self.load(link.target)?;
        let outcome = self.write(&target, action, channel, None, &mut summary)?;
        if outcome.is_written() && target.is_resource() {
            self.resources.materialize(&[target.id]);
        }

        if action == EntityAction::New {
            let mut set = WrittenSet::seeded(link.target);
            if let Some(link_entity) = link.link_entity_id {
                if let Some(WriteOutcome::Written(_)) =
                    self.write_isolated(link_entity, EntityAction::New, channel, None, &mut summary)
                {
                    set.mark_written(link_entity);
                }
            }
            tracing::debug!(run_id = %set.run_id(), entity_id = %link.target, "exporting descendants of linked entity");
            self.export_descendants(link.target, channel, &mut set, &mut summary)?;
        }
        Ok(summary)
    }

    /// A link was removed from the channel.
    ///
    /// The source is written as `Updated` carrying the removed link as a
    /// `Deleted` child entry. The target is `Deleted` when it no longer
    /// belongs to the channel, otherwise `Updated`.
    pub fn link_deleted(&self, channel: ChannelId, link: &Link) -> Result<PropagationSummary, SyncError> {
        let mut summary = PropagationSummary::default();
        self.write_isolated(link.source, EntityAction::Updated, channel, Some(link), &mut summary);

        let action = if self.reader.entity_in_channel(channel, link.target)? {
            EntityAction::Updated
        } else {
            EntityAction::Deleted
        };
        self.write_isolated(link.target, action, channel, None, &mut summary);
        Ok(summary)
    }

    /// A link's data or order changed. Both ends are refreshed.
    pub fn link_updated(&self, channel: ChannelId, link: &Link) -> Result<PropagationSummary, SyncError> {
        let mut summary = PropagationSummary::default();
        self.write_isolated(link.source, EntityAction::Updated, channel, None, &mut summary);
        self.write_isolated(link.target, EntityAction::Updated, channel, None, &mut summary);
        Ok(summary)
    }

    // ── Specification triggers ──

    /// A specification category changed: every template with a field in
    /// the category is refreshed if it belongs to the channel.
    pub fn specification_category_updated(
        &self,
        channel: ChannelId,
        category_id: &str,
    ) -> Result<PropagationSummary, SyncError> {
        let mut templates: Vec<EntityId> = Vec::new();
        for field_type in self.reader.specification_field_types_for_category(category_id)? {
            if !templates.contains(&field_type.entity_id) {
                templates.push(field_type.entity_id);
            }
        }

        let mut summary = PropagationSummary::default();
        for template in templates {
            if self.reader.entity_in_channel(channel, template)? {
                self.write_isolated(template, EntityAction::Updated, channel, None, &mut summary);
            }
        }
        Ok(summary)
    }

    /// A template field was created or changed: its owning template is
    /// refreshed if it belongs to the channel.
    pub fn specification_template_changed(
        &self,
        channel: ChannelId,
        field_type_id: &str,
    ) -> Result<PropagationSummary, SyncError> {
        let Some(field_type) = self.reader.specification_field_type(field_type_id)? else {
            tracing::warn!(field_type = %field_type_id, "specification field type not found");
            return Ok(PropagationSummary::default());
        };
        if !self.reader.entity_in_channel(channel, field_type.entity_id)? {
            return Ok(PropagationSummary::default());
        }
        self.entity_updated(channel, field_type.entity_id)
    }

    // ── Descendant walk ──

    fn export_descendants(
        &self,
        id: EntityId,
        channel: ChannelId,
        set: &mut WrittenSet,
        summary: &mut PropagationSummary,
    ) -> Result<(), SyncError> {
        set.enter(id);
        let result = self.export_children(id, channel, set, summary);
        set.leave(id);
        result
    }

    fn export_children(
        &self,
        id: EntityId,
        channel: ChannelId,
        set: &mut WrittenSet,
        summary: &mut PropagationSummary,
    ) -> Result<(), SyncError> {
        for link in self.reader.outbound_links(channel, id)? {
            if set.should_skip(link.target) {
                continue;
            }
            if let Err(e) = self.export_branch(&link, channel, set, summary) {
                tracing::error!(
                    run_id = %set.run_id(),
                    parent_id = %id,
                    entity_id = %link.target,
                    error = %e,
                    "descendant branch aborted"
                );
                if self.failure_policy == BranchFailurePolicy::SkipRemaining {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn export_branch(
        &self,
        link: &Link,
        channel: ChannelId,
        set: &mut WrittenSet,
        summary: &mut PropagationSummary,
    ) -> Result<(), SyncError> {
        let target = link.target;
        if !self.reader.outbound_links(channel, target)?.is_empty() {
            self.export_descendants(target, channel, set, summary)?;
        }

        let action = self.classify_added(channel, target)?;
        let entity = self.load(target)?;
        self.write(&entity, action, channel, None, summary)?;
        set.mark_written(target);

        if let Some(link_entity_id) = link.link_entity_id {
            if !set.is_written(link_entity_id) {
                let link_entity = self.load(link_entity_id)?;
                self.write(&link_entity, action, channel, None, summary)?;
                set.mark_written(link_entity_id);
            }
        }

        if entity.is_resource() {
            self.resources.materialize(&[target]);
        }
        Ok(())
    }

    // ── Helpers ──

    /// `Updated` when the entity has more than one structural parent.
    fn classify_added(&self, channel: ChannelId, id: EntityId) -> Result<EntityAction, SyncError> {
        if self.reader.structure_parent_count(channel, id)? > 1 {
            Ok(EntityAction::Updated)
        } else {
            Ok(EntityAction::New)
        }
    }

    /// Sources of inbound channel links over any of the entity type's link
    /// types, excluding the entity itself.
    fn structural_parents(&self, channel: ChannelId, entity: &Entity) -> Result<Vec<EntityId>, SyncError> {
        let Some(entity_type) = self.reader.entity_type(&entity.entity_type_id)? else {
            return Ok(Vec::new());
        };
        let mut parents: Vec<EntityId> = Vec::new();
        for link_type in &entity_type.link_types {
            for link in self.reader.inbound_links_of_type(channel, entity.id, &link_type.id)? {
                if link.source != entity.id && !parents.contains(&link.source) {
                    parents.push(link.source);
                }
            }
        }
        Ok(parents)
    }

    fn load(&self, id: EntityId) -> Result<Entity, SyncError> {
        self.reader
            .entity(id, LoadLevel::DataOnly)?
            .ok_or(SyncError::EntityNotFound { entity_id: id })
    }

    fn write(
        &self,
        entity: &Entity,
        action: EntityAction,
        channel: ChannelId,
        removed_link: Option<&Link>,
        summary: &mut PropagationSummary,
    ) -> Result<WriteOutcome, SyncError> {
        let result = self.writer.write_entity(entity, action, channel, removed_link);
        summary.record(&result);
        Ok(result?)
    }

    /// Load and write one entity; failures are logged and counted.
    fn write_isolated(
        &self,
        id: EntityId,
        action: EntityAction,
        channel: ChannelId,
        removed_link: Option<&Link>,
        summary: &mut PropagationSummary,
    ) -> Option<WriteOutcome> {
        let entity = match self.load(id) {
            Ok(entity) => entity,
            Err(e) => {
                summary.failed += 1;
                tracing::error!(entity_id = %id, action = %action, error = %e, "entity not written");
                return None;
            }
        };
        match self.write(&entity, action, channel, removed_link, summary) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(entity_id = %id, action = %action, error = %e, "entity not written");
                None
            }
        }
    }
}
