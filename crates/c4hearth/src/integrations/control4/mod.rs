mod blind;
mod config;
// Private module, named after the integration like its siblings
#[allow(clippy::module_inception)]
mod control4;
mod cover;
mod credentials;
mod descriptor;
mod director;
mod discovery;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
pub use config::Config as Control4Config;
pub use control4::Control4Integration;
pub use credentials::FileToken;
pub use credentials::SharedToken;
pub use credentials::StaticToken;
pub use credentials::TokenProvider;
pub use descriptor::ItemId;
pub use discovery::ResolvedCoverInfo;
use linkme::distributed_slice;

use crate::engine;

/// Identifier namespace for Control4 devices
pub const DOMAIN: &str = "control4";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_control4(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let c4_config = if let Some(c) = &ctx.config.integrations.control4 {
        c
    } else {
        return Ok(None);
    };

    let tokens: Arc<dyn TokenProvider> = match (&c4_config.bearer_token, &c4_config.token_file) {
        (Some(token), _) => Arc::new(StaticToken::new(token.clone())),
        (None, Some(path)) => Arc::new(FileToken::new(path.clone())),
        (None, None) => anyhow::bail!("Control4 integration has no bearer token configured"),
    };

    let connector = director::HttpDirectorConnector::new(
        c4_config.base_url(),
        tokens,
        Duration::from_secs(c4_config.timeout_secs),
        c4_config.accept_invalid_certs,
    )
    .context("Failed to create Control4 director client")?;

    Ok(Some(Box::new(Control4Integration::new(
        c4_config,
        Arc::new(connector),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_skips_unconfigured() {
        let config = crate::config::Config::default();
        let ctx = engine::IntegrationContext { config: &config };
        assert!(init_control4(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_factory_builds_integration() {
        let config: crate::config::Config = r#"
            [integrations.control4]
            host = "192.168.1.25"
            bearer_token = "token"
        "#
        .parse()
        .unwrap();
        let ctx = engine::IntegrationContext { config: &config };

        let integration = init_control4(&ctx).unwrap().unwrap();
        assert_eq!(integration.name(), "control4");
    }
}
