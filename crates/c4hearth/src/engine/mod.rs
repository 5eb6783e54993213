mod device;
mod engine;
mod entity;
mod integration;
mod message;
pub mod state;

pub use device::Device;
pub use engine::CommandError;
pub use engine::Engine;
pub use entity::Cover;
pub use entity::Entity;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::CoverCommand;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::CoverState;
pub use state::State;
