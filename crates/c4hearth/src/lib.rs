pub mod api;
pub mod config;
mod engine;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::CommandError;
pub use engine::CoverCommand;
pub use engine::CoverState;
pub use engine::Device;
pub use engine::Engine;
pub use engine::State;
