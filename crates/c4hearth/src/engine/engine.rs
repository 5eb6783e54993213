use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::sync::PoisonError;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::CoverCommand;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::CoverState;
use super::state::State;
use crate::engine::IntegrationContext;

/// Errors routing a command to an integration
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration channel not found: {0}")]
    IntegrationUnavailable(String),

    #[error("Engine routing table is poisoned")]
    Poisoned,
}

/// c4hearth engine
///
/// This structure handles the flow of events, sending commands to the correct
/// integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every registered integration factory against the config and
    /// registers the ones that are configured.
    pub fn register_integrations_from_config(&self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Number of registered integrations
    pub fn integration_count(&self) -> usize {
        self.integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop all integrations and wait for their shutdown hooks to finish.
    ///
    /// Dropping the command senders ends each integration's command loop.
    pub async fn shutdown(&self) {
        self.integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let handles = std::mem::take(
            &mut *self
                .integration_handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task failed: {}", e);
            }
        }
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), CommandError> {
        let entity_id = match &msg {
            ToIntegrationMessage::CoverCommand { entity_id, .. } => entity_id.clone(),
        };

        let integration_name = self
            .entity_integration_map
            .lock()
            .map_err(|_| CommandError::Poisoned)?
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?;

        let channels = self
            .integration_channels
            .lock()
            .map_err(|_| CommandError::Poisoned)?;
        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| CommandError::IntegrationUnavailable(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| CommandError::IntegrationUnavailable(integration_name))
    }

    /// Send an open/close command to a cover entity
    pub fn send_cover_command(
        &self,
        entity_id: String,
        command: CoverCommand,
    ) -> Result<(), CommandError> {
        self.send_command(ToIntegrationMessage::CoverCommand { entity_id, command })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                device,
            } => {
                info!(
                    "Entity discovered: {} (from {}, device {})",
                    entity_id, integration_name, device.id
                );

                {
                    let mut state = State::clone(&self.state.load());
                    state
                        .devices
                        .entry(device.id.clone())
                        .or_insert(device)
                        .add_entity(entity_id.clone());
                    self.state.store(Arc::new(state));
                }

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                self.entity_integration_map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(entity_id, integration_name);
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                {
                    let mut state = State::clone(&self.state.load());
                    state.covers.remove(&entity_id);
                    for device in state.devices.values_mut() {
                        device.remove_entity(&entity_id);
                    }
                    state.devices.retain(|_, device| !device.entity_ids.is_empty());
                    self.state.store(Arc::new(state));
                }

                // Remove from routing map
                self.entity_integration_map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&entity_id);
            }
            FromIntegrationMessage::CoverStateChanged {
                entity_id,
                closed,
                attributes,
            } => {
                // Late updates for removed entities must not bring them back.
                let registered = self
                    .entity_integration_map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains_key(&entity_id);
                if !registered {
                    debug!("Ignoring state for unregistered entity: {}", entity_id);
                    return;
                }

                info!("Cover state changed: {} -> closed={}", entity_id, closed);

                let mut state = State::clone(&self.state.load());
                state
                    .covers
                    .insert(entity_id, CoverState { closed, attributes });
                self.state.store(Arc::new(state));
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::Device;

    /// Integration that forwards every command it receives to a channel
    struct RecordingIntegration {
        seen: mpsc::UnboundedSender<ToIntegrationMessage>,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        fn name(&self) -> &str {
            "recording"
        }

        async fn setup(&mut self, _tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            let _ = self.seen.send(msg);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    fn discovered(entity_id: &str, device_id: &str) -> FromIntegrationMessage {
        FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.to_string(),
            integration_name: "recording".to_string(),
            device: Device::new(device_id.to_string(), "Hub".to_string()),
        }
    }

    #[test]
    fn test_entities_are_grouped_by_device() {
        let engine = Engine::new();
        engine.handle_event(discovered("cover.c4_5", "2"));
        engine.handle_event(discovered("cover.c4_6", "2"));
        engine.handle_event(discovered("cover.c4_7", "3"));

        let state = engine.state_snapshot();
        assert_eq!(state.devices.len(), 2);
        assert_eq!(state.devices["2"].entity_ids, vec!["cover.c4_5", "cover.c4_6"]);
        assert!(state.covers.is_empty());
    }

    #[test]
    fn test_cover_state_and_removal() {
        let engine = Engine::new();
        engine.handle_event(discovered("cover.c4_5", "2"));

        let mut attributes = BTreeMap::new();
        attributes.insert("Level".to_string(), serde_json::json!(0));
        engine.handle_event(FromIntegrationMessage::CoverStateChanged {
            entity_id: "cover.c4_5".to_string(),
            closed: true,
            attributes: attributes.clone(),
        });

        let state = engine.state_snapshot();
        assert_eq!(
            state.covers["cover.c4_5"],
            CoverState {
                closed: true,
                attributes
            }
        );

        engine.handle_event(FromIntegrationMessage::EntityRemoved {
            entity_id: "cover.c4_5".to_string(),
        });
        let state = engine.state_snapshot();
        assert!(state.covers.is_empty());
        assert!(state.devices.is_empty());
        assert!(matches!(
            engine.send_cover_command("cover.c4_5".to_string(), CoverCommand::Open),
            Err(CommandError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_state_for_removed_entity_is_ignored() {
        let engine = Engine::new();
        engine.handle_event(discovered("cover.c4_5", "2"));
        engine.handle_event(FromIntegrationMessage::EntityRemoved {
            entity_id: "cover.c4_5".to_string(),
        });
        engine.handle_event(FromIntegrationMessage::CoverStateChanged {
            entity_id: "cover.c4_5".to_string(),
            closed: true,
            attributes: BTreeMap::new(),
        });
        engine.handle_event(FromIntegrationMessage::CoverStateChanged {
            entity_id: "cover.never_seen".to_string(),
            closed: true,
            attributes: BTreeMap::new(),
        });

        let state = engine.state_snapshot();
        assert!(state.covers.is_empty());
        assert!(state.devices.is_empty());
    }

    #[test]
    fn test_unknown_entity_is_rejected() {
        let engine = Engine::new();
        let result = engine.send_cover_command("cover.nope".to_string(), CoverCommand::Close);
        assert!(matches!(result, Err(CommandError::UnknownEntity(id)) if id == "cover.nope"));
    }

    #[tokio::test]
    async fn test_command_is_routed_to_owning_integration() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let engine = Engine::new();
        engine.register_integration(
            "recording".to_string(),
            Box::new(RecordingIntegration { seen: seen_tx }),
        );
        assert_eq!(engine.integration_count(), 1);

        engine.handle_event(discovered("cover.c4_5", "2"));
        engine
            .send_cover_command("cover.c4_5".to_string(), CoverCommand::Close)
            .unwrap();

        match seen_rx.recv().await {
            Some(ToIntegrationMessage::CoverCommand { entity_id, command }) => {
                assert_eq!(entity_id, "cover.c4_5");
                assert_eq!(command, CoverCommand::Close);
            }
            None => panic!("integration never saw the command"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_runs_integration_shutdown() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let engine = Engine::new();
        engine.register_integration(
            "recording".to_string(),
            Box::new(RecordingIntegration { seen: seen_tx }),
        );

        engine.shutdown().await;
        assert_eq!(engine.integration_count(), 0);
    }
}
