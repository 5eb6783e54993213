use serde_json::json;

use super::descriptor::ItemId;
use super::director::DirectorApi;
use super::director::DirectorError;

const SET_LEVEL_TARGET: &str = "SET_LEVEL_TARGET";
const LEVEL_TARGET_OPEN: &str = "LEVEL_TARGET_OPEN";
const LEVEL_TARGET_CLOSED: &str = "LEVEL_TARGET_CLOSED";

/// Short-lived command handle for one blind item.
///
/// Built per command so it always carries the director's current token.
pub struct Blind {
    director: Box<dyn DirectorApi>,
    item_id: ItemId,
}

impl Blind {
    pub fn new(director: Box<dyn DirectorApi>, item_id: ItemId) -> Self {
        Self { director, item_id }
    }

    /// Drive the blind fully open
    pub async fn open(&self) -> Result<(), DirectorError> {
        self.set_level_target(LEVEL_TARGET_OPEN).await
    }

    /// Drive the blind fully closed
    pub async fn close(&self) -> Result<(), DirectorError> {
        self.set_level_target(LEVEL_TARGET_CLOSED).await
    }

    async fn set_level_target(&self, target: &str) -> Result<(), DirectorError> {
        self.director
            .send_item_command(
                &self.item_id,
                SET_LEVEL_TARGET,
                json!({ "LEVEL_TARGET": target }),
            )
            .await
    }
}
