//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! manifest file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServeConfig (validated, immutable)
//!     → ListenerConfig handed to Controls::start / serve
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DispatchConfig, ListenerConfig, ObservabilityConfig, PemSource, ServeConfig, StaticRouteConfig,
    TlsConfig,
};
