//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline stages produce:
//!     → logging.rs (structured log events, one span per run)
//!     → metrics.rs (counters, histograms through the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never key material
//! - Metrics are no-ops until an embedding application installs a recorder

pub mod logging;
pub mod metrics;
