//! Type-safe message system for c4hearth
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::device::Device;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        device: Device,
    },

    /// An entity was removed
    EntityRemoved { entity_id: String },

    /// A cover published its state
    CoverStateChanged {
        entity_id: String,
        closed: bool,
        attributes: BTreeMap<String, serde_json::Value>,
    },
}

/// Commands understood by cover entities
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CoverCommand {
    Open,
    Close,
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Command to move a cover
    CoverCommand {
        entity_id: String,
        command: CoverCommand,
    },
}
