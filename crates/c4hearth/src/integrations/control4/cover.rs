use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::blind::Blind;
use super::director::DirectorConnector;
use super::director::DirectorError;
use super::discovery::ResolvedCoverInfo;
use crate::engine::Cover;
use crate::engine::Device;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;

/// Connection details shared by every entity of one Control4 integration
pub struct EntryData {
    pub connector: Arc<dyn DirectorConnector>,

    /// Unique name of the controller, if known
    pub controller_name: Option<String>,
}

/// Control4 blind or shade exposed as a cover entity
pub struct Control4Cover {
    entity_id: String,
    info: ResolvedCoverInfo,
    entry: Arc<EntryData>,
    to_engine: FromIntegrationSender,
}

impl Control4Cover {
    pub fn new(
        info: ResolvedCoverInfo,
        entry: Arc<EntryData>,
        to_engine: FromIntegrationSender,
    ) -> Self {
        Self {
            entity_id: format!("cover.c4_{}", info.id),
            info,
            entry,
            to_engine,
        }
    }

    /// Build a command handle bound to the director's current token.
    fn create_api_object(&self) -> Result<Blind, DirectorError> {
        let director = self.entry.connector.connect()?;
        Ok(Blind::new(director, self.info.id.clone()))
    }

    /// Push this entity's current state to the engine.
    pub async fn publish_state(&self) {
        let msg = FromIntegrationMessage::CoverStateChanged {
            entity_id: self.entity_id.clone(),
            closed: self.is_closed(),
            attributes: self.info.attributes.clone(),
        };
        if let Err(e) = self.to_engine.send(msg).await {
            warn!("Failed to send CoverStateChanged message: {}", e);
        }
    }
}

impl Entity for Control4Cover {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn unique_id(&self) -> String {
        self.info.id.to_string()
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn platform(&self) -> &'static str {
        "cover"
    }

    fn device(&self) -> Device {
        // Covers without a known parent get a device of their own.
        let (device_id, device_name) = match &self.info.device_name {
            Some(name) => (self.info.parent_id.to_string(), name.clone()),
            None => (self.info.id.to_string(), self.info.name.clone()),
        };

        let mut device = Device::new(device_id.clone(), device_name);
        device.identifiers.push((DOMAIN.to_string(), device_id));
        device.manufacturer = self.info.manufacturer.clone();
        device.model = self.info.model.clone();
        device.suggested_area = Some(self.info.area.clone());
        device.via_device = self
            .entry
            .controller_name
            .as_ref()
            .map(|controller| (DOMAIN.to_string(), controller.clone()));
        device
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::json!({
            "closed": self.is_closed(),
            "attributes": self.info.attributes,
        })
    }
}

#[async_trait]
impl Cover for Control4Cover {
    /// Always closed: position is not read back from the director yet.
    fn is_closed(&self) -> bool {
        true
    }

    async fn open(&self) -> anyhow::Result<()> {
        let blind = self
            .create_api_object()
            .with_context(|| format!("Failed to connect to director for {}", self.entity_id))?;
        blind
            .open()
            .await
            .with_context(|| format!("Failed to open {}", self.entity_id))?;
        info!("Opened cover {} ({})", self.info.name, self.entity_id);

        self.publish_state().await;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let blind = self
            .create_api_object()
            .with_context(|| format!("Failed to connect to director for {}", self.entity_id))?;
        blind
            .close()
            .await
            .with_context(|| format!("Failed to close {}", self.entity_id))?;
        info!("Closed cover {} ({})", self.info.name, self.entity_id);

        self.publish_state().await;
        Ok(())
    }
}
