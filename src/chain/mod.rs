//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! mint parameters
//!     → instruction.rs (validated MintTo instruction)
//!     → transaction.rs (message compiled against a fresh checkpoint)
//!     → wallet.rs (every signer slot filled)
//!     → confirm.rs (submit via client.rs, await via subscription.rs)
//! ```
//!
//! # Security Constraints
//! - Private keys from the environment or the config file only
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - Nothing reaches the network until every signature is present

pub mod client;
pub mod confirm;
pub mod instruction;
pub mod subscription;
pub mod transaction;
pub mod transport;
pub mod types;
pub mod wallet;

pub use client::RpcClient;
pub use confirm::Confirmer;
pub use instruction::{Instruction, MintToBuilder, TOKEN_PROGRAM_ID};
pub use subscription::PubsubClient;
pub use transaction::Transaction;
pub use transport::{
    BroadcastTransport, CheckpointProvider, MintAccountReader, SignatureSubscription,
    SubscriptionTransport,
};
pub use types::{
    Checkpoint, Commitment, Confirmation, MintError, MintResult, Pubkey, RpcError, Signature,
    StatusUpdate, WalletError,
};
pub use wallet::{KeyLookup, KeyRing, Keypair, TxSigner};
