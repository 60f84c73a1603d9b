#![allow(clippy::must_use_candidate)]

pub mod backends;
pub mod consultation;
pub mod cors;
mod env;
pub mod health;
mod loader;
pub mod routing;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub(crate) use loader::parse_duration;

pub use backends::*;
pub use consultation::*;
pub use cors::*;
pub use health::*;
pub use routing::*;
pub use server::*;
pub use telemetry::TelemetryConfig;

/// Top-level carepath configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Inference backend configuration
    #[serde(default)]
    pub backends: BackendsConfig,
    /// Model routing for the chat gateway
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Consultation pipeline configuration
    #[serde(default)]
    pub consultation: ConsultationConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
