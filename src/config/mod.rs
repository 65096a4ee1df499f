//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or legacy JSON settings)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → MintConfig (validated, immutable for the run)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{MintConfig, MintSection, ObservabilityConfig, RpcConfig, WalletConfig};
pub use validation::{validate_config, ValidationError};
