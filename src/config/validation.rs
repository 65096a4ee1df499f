//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every address field is a well-formed pubkey
//! - Validate endpoint schemes and value ranges (timeouts > 0)
//! - Check that key material is available
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MintConfig → Result<(), Vec<ValidationError>>
//! - Amount is passed through unchecked; the token program decides what it accepts

use std::fmt;

use crate::chain::types::Pubkey;
use crate::chain::wallet::PRIVATE_KEY_ENV_VAR;
use crate::config::schema::MintConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `rpc.ws_url`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a loaded configuration.
pub fn validate_config(config: &MintConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.wallet.private_key.is_none() && std::env::var_os(PRIVATE_KEY_ENV_VAR).is_none() {
        errors.push(ValidationError::new(
            "wallet.private_key",
            format!("not set and {} is empty", PRIVATE_KEY_ENV_VAR),
        ));
    }

    let mint = &config.mint;
    if mint.token_mint.is_empty() {
        errors.push(ValidationError::new("mint.token_mint", "required"));
    } else {
        check_pubkey(&mut errors, "mint.token_mint", &mint.token_mint);
    }
    if let Some(destination) = &mint.destination {
        check_pubkey(&mut errors, "mint.destination", destination);
    }
    if let Some(authority) = &mint.authority {
        check_pubkey(&mut errors, "mint.authority", authority);
    }
    for (i, signer) in mint.multisig_signers.iter().enumerate() {
        check_pubkey(&mut errors, &format!("mint.multisig_signers[{}]", i), signer);
    }
    check_pubkey(&mut errors, "mint.token_program", &mint.token_program);

    let rpc = &config.rpc;
    check_scheme(&mut errors, "rpc.rpc_url", &rpc.rpc_url, &["http", "https"]);
    check_scheme(&mut errors, "rpc.ws_url", &rpc.ws_url, &["ws", "wss"]);
    if rpc.request_timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.request_timeout_secs", "must be greater than 0"));
    }
    if rpc.confirm_timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.confirm_timeout_secs", "must be greater than 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_pubkey(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = value.parse::<Pubkey>() {
        errors.push(ValidationError::new(field, format!("'{}' is not a valid address: {}", value, e)));
    }
}

fn check_scheme(errors: &mut Vec<ValidationError>, field: &str, value: &str, schemes: &[&str]) {
    match url::Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("scheme '{}' not supported (expected {})", url.scheme(), schemes.join(" or ")),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e))),
    }
}
