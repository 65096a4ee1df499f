//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Ctrl-C (signals.rs)
//!     → Shutdown::trigger (shutdown.rs)
//!     → confirmation wait resolves with Cancelled
//!     → subscription handle dropped, node unsubscribed
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
