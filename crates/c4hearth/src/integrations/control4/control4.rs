use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::info;
use tracing::warn;

use super::Control4Config;
use super::cover::Control4Cover;
use super::cover::EntryData;
use super::director::DirectorConnector;
use super::director::get_items_of_category;
use super::discovery::discover;
use crate::engine::Cover;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Control4 integration for c4hearth
///
/// Discovers the blinds and shades of one director at setup and forwards
/// open/close commands to them.
pub struct Control4Integration {
    config: Control4Config,
    entry: Arc<EntryData>,
    covers: HashMap<String, Arc<dyn Cover>>,
    to_engine: Option<FromIntegrationSender>,

    /// In-flight cover commands, drained before entities are removed
    commands: JoinSet<()>,
}

impl Control4Integration {
    pub fn new(config: &Control4Config, connector: Arc<dyn DirectorConnector>) -> Self {
        Self {
            entry: Arc::new(EntryData {
                connector,
                controller_name: config.controller_name.clone(),
            }),
            config: config.clone(),
            covers: HashMap::new(),
            to_engine: None,
            commands: JoinSet::new(),
        }
    }

    /// Entity ids of the discovered covers
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.covers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register an entity with the engine
    async fn register_entity(&self, cover: &dyn Cover, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: cover.entity_id().to_string(),
            integration_name: self.name().to_string(),
            device: cover.device(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            info!(
                "Registered {} entity: {} (unique id {})",
                cover.platform(),
                cover.entity_id(),
                cover.unique_id()
            );
        }
    }
}

fn boxed<E: Error + Send + 'static>(e: E) -> Box<dyn Error + Send> {
    Box::new(e)
}

#[async_trait]
impl Integration for Control4Integration {
    fn name(&self) -> &str {
        "control4"
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        info!(
            "Querying Control4 director at {} for category '{}'",
            self.config.base_url(),
            self.config.category
        );
        let director = self.entry.connector.connect().map_err(boxed)?;
        let items = get_items_of_category(director.as_ref(), &self.config.category)
            .await
            .map_err(boxed)?;
        let resolved = discover(director.as_ref(), &items, &self.config.entity_type)
            .await
            .map_err(boxed)?;
        info!(
            "Discovered {} covers among {} items",
            resolved.len(),
            items.len()
        );

        let mut added = Vec::with_capacity(resolved.len());
        for info in resolved {
            let cover = Arc::new(Control4Cover::new(info, self.entry.clone(), tx.clone()));
            self.register_entity(cover.as_ref(), &tx).await;
            added.push(cover);
        }

        // Entities publish their state once before they are used.
        for cover in added {
            cover.publish_state().await;
            self.covers.insert(cover.entity_id().to_string(), cover);
        }

        info!("Control4 integration ready to handle commands");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::CoverCommand { entity_id, command } => {
                let cover = self.covers.get(&entity_id).cloned().ok_or_else(|| {
                    boxed(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Cover not found: {}", entity_id),
                    ))
                })?;

                info!("Handling cover command for {}: {}", entity_id, command);

                // Reap finished commands so the set only holds in-flight ones.
                while self.commands.try_join_next().is_some() {}

                // Commands run on their own task so one slow director call
                // does not hold up other entities.
                self.commands.spawn(async move {
                    if let Err(e) = command.apply(cover.as_ref()).await {
                        warn!("Cover command {} for {} failed: {:#}", command, entity_id, e);
                    }
                });
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Control4 integration shutting down");

        // Let in-flight commands finish so their state refreshes land before
        // the entities are removed. Each is bounded by the request timeout.
        if !self.commands.is_empty() {
            info!("Waiting for {} cover commands to finish", self.commands.len());
        }
        while let Some(result) = self.commands.join_next().await {
            if let Err(e) = result {
                warn!("Cover command task failed: {}", e);
            }
        }

        if let Some(tx) = self.to_engine.take() {
            for entity_id in self.entity_ids() {
                let msg = FromIntegrationMessage::EntityRemoved {
                    entity_id: entity_id.clone(),
                };
                if let Err(e) = tx.send(msg).await {
                    warn!("Failed to send EntityRemoved message: {}", e);
                }
            }
        }
        self.covers.clear();
        Ok(())
    }
}
