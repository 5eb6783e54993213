//! Entity abstraction for c4hearth
//!
//! All entities implement the Entity trait; platform traits such as [`Cover`]
//! add the commands that platform supports.

use async_trait::async_trait;

use super::device::Device;
use super::message::CoverCommand;

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Engine-wide id, e.g. "cover.c4_42"
    fn entity_id(&self) -> &str;

    /// Stable id within the owning integration
    fn unique_id(&self) -> String;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Return the platform type of this entity (e.g. "cover")
    fn platform(&self) -> &'static str;

    /// Device this entity belongs to
    fn device(&self) -> Device;

    /// Serialize current state to JSON
    fn state_json(&self) -> serde_json::Value;
}

/// A window covering (blind, shade, curtain)
#[async_trait]
pub trait Cover: Entity {
    fn is_closed(&self) -> bool;

    async fn open(&self) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

impl CoverCommand {
    /// Run this command against a cover
    pub async fn apply(self, cover: &dyn Cover) -> anyhow::Result<()> {
        match self {
            CoverCommand::Open => cover.open().await,
            CoverCommand::Close => cover.close().await,
        }
    }
}
