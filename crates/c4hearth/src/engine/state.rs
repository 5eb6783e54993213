use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::device::Device;

/// State of a cover entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverState {
    /// Whether the cover reports itself closed.
    pub closed: bool,

    /// Integration-specific attributes (director variables for Control4).
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub covers: HashMap<String, CoverState>,

    /// Devices keyed by device id
    pub devices: BTreeMap<String, Device>,
}
