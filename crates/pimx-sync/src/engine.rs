//! # Export Engine
//!
//! Owns the components of one connector instance and dispatches host
//! notifications to them.
//!
//! ## Lifecycle
//!
//! [`ExportEngine::initialize`] resolves settings and the mapping once. A
//! configuration failure does not surface as an error: the engine starts
//! disabled and every later call is a logged no-op.
//!
//! ## Dispatch
//!
//! Channel-scoped notifications for any channel other than the configured
//! one are ignored. Every handled notification logs its start, and any
//! failure is logged and reported as [`Dispatch::Failed`] rather than
//! returned to the host.

use std::sync::Arc;

use pimx_core::{CatalogReader, ChannelId, EntityId, ExportSettings, Link, SettingsMap};
use pimx_export::{CvlAction, CvlExporter, DocumentWriter, ObjectStore, ResourceMaterializer};
use pimx_schema::SchemaCatalog;

use crate::error::SyncError;
use crate::notification::Notification;
use crate::propagator::{BranchFailurePolicy, ChangePropagator, PropagationSummary};
use crate::publish::{PublishMode, PublishOrchestrator, PublishReport};

/// Result of handing one notification to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Every affected document was handled.
    Handled,
    /// The trigger failed, or some of its writes did. Details are logged.
    Failed,
    /// The notification concerns another channel.
    Ignored,
    /// The engine failed to initialize.
    Disabled,
}

/// Components of an initialized engine.
struct Components {
    settings: ExportSettings,
    schemas: Arc<SchemaCatalog>,
    cvls: Arc<CvlExporter>,
    propagator: ChangePropagator,
    publisher: PublishOrchestrator,
}

enum State {
    Ready(Box<Components>),
    Disabled { reason: String },
}

/// A connector instance.
pub struct ExportEngine {
    state: State,
}

impl std::fmt::Debug for ExportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            State::Ready(c) => f
                .debug_struct("ExportEngine")
                .field("channel_id", &c.settings.channel_id)
                .field("propagator", &c.propagator)
                .field("publisher", &c.publisher)
                .finish(),
            State::Disabled { reason } => f
                .debug_struct("ExportEngine")
                .field("disabled", reason)
                .finish(),
        }
    }
}

impl ExportEngine {
    /// Resolve settings and build every component.
    pub fn initialize(
        settings: &SettingsMap,
        reader: Arc<dyn CatalogReader>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        match Self::build(settings, reader, store) {
            Ok(components) => {
                tracing::info!(
                    channel_id = %components.settings.channel_id,
                    exported_types = components.settings.mapping.entity_types_to_export.len(),
                    mode = ?components.publisher.mode(),
                    "export engine initialized"
                );
                Self {
                    state: State::Ready(Box::new(components)),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "export engine disabled");
                Self {
                    state: State::Disabled {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    fn build(
        settings: &SettingsMap,
        reader: Arc<dyn CatalogReader>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Components, SyncError> {
        let settings = ExportSettings::from_settings(settings)?;
        let mapping = &settings.mapping;

        for entry in mapping.unflagged_unique_fields(reader.as_ref())? {
            tracing::warn!(
                entity_type = %entry.entity_type_id,
                field_type = %entry.field_type_id,
                "mapped unique field is not flagged unique"
            );
        }

        let schemas = Arc::new(SchemaCatalog::new(reader.clone()).with_unique_fields(mapping.unique_field_map()));
        let writer = Arc::new(DocumentWriter::new(
            schemas.clone(),
            store.clone(),
            mapping,
            &settings.publish_folder,
        ));
        let cvls = Arc::new(CvlExporter::new(reader.clone(), store.clone(), &settings.cvl_folder));
        let resources = Arc::new(ResourceMaterializer::new(
            reader.clone(),
            store,
            &settings.resource_folder,
            mapping.image_configurations.clone(),
        ));
        let propagator = ChangePropagator::new(
            reader.clone(),
            writer.clone(),
            resources.clone(),
            settings.update_parent_on_add,
        );
        let publisher = PublishOrchestrator::new(
            reader,
            writer,
            cvls.clone(),
            resources,
            PublishMode::from_settings(settings.publish_as_single_file, settings.max_entities_per_file),
        );

        Ok(Components {
            settings,
            schemas,
            cvls,
            propagator,
            publisher,
        })
    }

    /// Set how far a failed descendant branch aborts the walk.
    pub fn with_branch_failure_policy(mut self, policy: BranchFailurePolicy) -> Self {
        if let State::Ready(components) = &mut self.state {
            components.propagator.set_failure_policy(policy);
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Why initialization failed, for a disabled engine.
    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.state {
            State::Disabled { reason } => Some(reason),
            State::Ready(_) => None,
        }
    }

    pub fn settings(&self) -> Option<&ExportSettings> {
        self.components().map(|c| &c.settings)
    }

    pub fn schemas(&self) -> Option<&Arc<SchemaCatalog>> {
        self.components().map(|c| &c.schemas)
    }

    fn components(&self) -> Option<&Components> {
        match &self.state {
            State::Ready(components) => Some(components),
            State::Disabled { .. } => None,
        }
    }

    /// Handle one host notification.
    pub fn handle(&self, notification: &Notification) -> Dispatch {
        let Some(components) = self.components() else {
            tracing::warn!(notification = notification.kind(), "export engine disabled, notification dropped");
            return Dispatch::Disabled;
        };
        let channel = components.settings.channel_id;
        if let Some(target) = notification.channel() {
            if target != channel {
                tracing::debug!(
                    notification = notification.kind(),
                    channel_id = %target,
                    "notification for another channel ignored"
                );
                return Dispatch::Ignored;
            }
        }

        tracing::info!(notification = notification.kind(), channel_id = %channel, "notification received");
        match components.dispatch(channel, notification) {
            Ok(summary) if summary.is_clean() => Dispatch::Handled,
            Ok(summary) => {
                tracing::error!(
                    notification = notification.kind(),
                    failed = summary.failed,
                    written = summary.written,
                    "notification handled with failures"
                );
                Dispatch::Failed
            }
            Err(e) => {
                tracing::error!(notification = notification.kind(), error = %e, "notification failed");
                Dispatch::Failed
            }
        }
    }

    /// Publish the whole channel.
    ///
    /// `None` when the engine is disabled, the channel is not the
    /// configured one, or the channel could not be enumerated.
    pub fn publish(&self, channel: ChannelId) -> Option<PublishReport> {
        let Some(components) = self.components() else {
            tracing::warn!(channel_id = %channel, "export engine disabled, publish skipped");
            return None;
        };
        if channel != components.settings.channel_id {
            tracing::info!(channel_id = %channel, "publish for another channel ignored");
            return None;
        }
        tracing::info!(channel_id = %channel, "publish requested");
        match components.publisher.publish(channel) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(channel_id = %channel, error = %e, "publish failed");
                None
            }
        }
    }
}

impl Components {
    fn dispatch(&self, channel: ChannelId, notification: &Notification) -> Result<PropagationSummary, SyncError> {
        let propagator = &self.propagator;
        match notification {
            Notification::EntityAdded { entity_id, .. } => propagator.entity_added(channel, *entity_id),
            Notification::EntityDeleted { entity, .. } => propagator.entity_deleted(channel, entity),
            Notification::EntityUpdated { entity_id, .. }
            | Notification::SpecificationFieldAdded { entity_id, .. }
            | Notification::SpecificationFieldUpdated { entity_id, .. } => {
                propagator.entity_updated(channel, *entity_id)
            }
            Notification::FieldSetUpdated { entity_id, .. } => propagator.field_set_updated(channel, *entity_id),
            Notification::LinkAdded {
                source,
                target,
                link_type_id,
                link_entity_id,
                ..
            } => propagator.link_added(channel, &make_link(*source, *target, link_type_id, *link_entity_id)),
            Notification::LinkDeleted {
                source,
                target,
                link_type_id,
                link_entity_id,
                ..
            } => propagator.link_deleted(channel, &make_link(*source, *target, link_type_id, *link_entity_id)),
            Notification::LinkUpdated {
                source,
                target,
                link_type_id,
                link_entity_id,
                ..
            } => propagator.link_updated(channel, &make_link(*source, *target, link_type_id, *link_entity_id)),
            Notification::CvlValueCreated { cvl_id, .. } => self.cvl_changed(cvl_id, CvlAction::NewValue),
            Notification::CvlValueUpdated { cvl_id, .. } => self.cvl_changed(cvl_id, CvlAction::Updated),
            Notification::CvlValueDeleted { cvl_id, .. } => self.cvl_changed(cvl_id, CvlAction::DeletedValue),
            Notification::CvlValuesDeletedAll { cvl_id } => self.cvl_changed(cvl_id, CvlAction::DeletedAll),
            Notification::SpecificationCategoryUpdated { category_id } => {
                propagator.specification_category_updated(channel, category_id)
            }
            Notification::SpecificationTemplateCreated { template_id }
            | Notification::SpecificationTemplateUpdated { template_id } => {
                propagator.specification_template_changed(channel, template_id)
            }
        }
    }

    /// A CVL changed: every exported schema may embed its values.
    fn cvl_changed(&self, cvl_id: &str, action: CvlAction) -> Result<PropagationSummary, SyncError> {
        let rebuilt = self.schemas.regenerate_all(&self.settings.mapping.entity_types_to_export);
        tracing::debug!(cvl = %cvl_id, rebuilt, "schemas regenerated after cvl change");
        self.cvls.write_by_id(cvl_id, action)?;
        Ok(PropagationSummary {
            written: 1,
            ..PropagationSummary::default()
        })
    }
}

fn make_link(source: EntityId, target: EntityId, link_type_id: &str, link_entity_id: Option<EntityId>) -> Link {
    Link {
        source,
        target,
        link_type_id: link_type_id.to_string(),
        link_entity_id,
        index: 0,
    }
}
