//! # Error Types
//!
//! Failures of one change-propagation trigger or one publish run. They
//! never escape the engine: [`ExportEngine::handle`](crate::ExportEngine::handle)
//! logs them and reports a [`Dispatch`](crate::Dispatch).

use pimx_core::{ChannelId, ConfigError, EntityId, HostError};
use pimx_export::ExportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A link was added whose target is not part of the channel.
    #[error("entity {entity_id} does not exist in channel {channel_id}")]
    TargetNotInChannel {
        /// Link target.
        entity_id: EntityId,
        /// Channel the link was added to.
        channel_id: ChannelId,
    },

    /// An entity named by a notification could not be read.
    #[error("entity {entity_id} not found")]
    EntityNotFound {
        /// Missing entity.
        entity_id: EntityId,
    },

    /// Writing a document, CVL or resource failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The host could not answer a lookup.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Settings or mapping could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
