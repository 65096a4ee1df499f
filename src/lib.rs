//! Token mint submission library.
//!
//! Builds a token program `MintTo` instruction, packages it against a fresh
//! blockhash, signs it, submits it and waits for the requested commitment.

pub mod chain;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use chain::{Commitment, Confirmation, MintError, MintResult, Pubkey, Signature};
pub use config::schema::MintConfig;
pub use lifecycle::Shutdown;
pub use pipeline::{MintPipeline, MintRequest, PipelineOptions};
