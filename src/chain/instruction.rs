//! Token program `MintTo` instruction construction and validation.
//!
//! # Responsibilities
//! - Parse account references, failing closed on malformed text
//! - Check the account combination before anything touches the network
//! - Hand the checked accounts to `spl_token` for the instruction encoding

use std::collections::HashSet;
use std::str::FromStr;

pub use solana_sdk::instruction::{AccountMeta, Instruction};

use crate::chain::types::{MintError, MintResult, Pubkey};

/// SPL token program id (`TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`).
pub const TOKEN_PROGRAM_ID: Pubkey = spl_token::ID;

/// Maximum number of signers in a token program multisig account.
pub const MAX_SIGNERS: usize = spl_token::instruction::MAX_SIGNERS;

/// Mint authority as recorded in the on-chain mint account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintAuthority {
    /// Supply is fixed; nobody can mint.
    Disabled,
    Key(Pubkey),
}

impl From<Option<Pubkey>> for MintAuthority {
    fn from(authority: Option<Pubkey>) -> Self {
        authority.map_or(MintAuthority::Disabled, MintAuthority::Key)
    }
}

/// Builder for a token program `MintTo` instruction.
#[derive(Debug, Clone)]
pub struct MintToBuilder {
    amount: u64,
    mint: Pubkey,
    destination: Pubkey,
    authority: Pubkey,
    multisig_signers: Option<Vec<Pubkey>>,
    token_program: Pubkey,
    onchain_authority: Option<MintAuthority>,
}

impl MintToBuilder {
    pub fn new(amount: u64, mint: Pubkey, destination: Pubkey, authority: Pubkey) -> Self {
        Self {
            amount,
            mint,
            destination,
            authority,
            multisig_signers: None,
            token_program: TOKEN_PROGRAM_ID,
            onchain_authority: None,
        }
    }

    /// Build from address text. Any malformed address is an `InvalidInstruction`.
    pub fn from_strs(
        amount: u64,
        mint: &str,
        destination: &str,
        authority: &str,
        multisig_signers: &[String],
    ) -> MintResult<Self> {
        let mint = parse_address("mint", mint)?;
        let destination = parse_address("destination", destination)?;
        let authority = parse_address("authority", authority)?;

        let mut builder = Self::new(amount, mint, destination, authority);
        if !multisig_signers.is_empty() {
            let signers = multisig_signers
                .iter()
                .map(|s| parse_address("multisig signer", s))
                .collect::<MintResult<Vec<_>>>()?;
            builder = builder.with_multisig_signers(signers);
        }
        Ok(builder)
    }

    /// Mint through a multisig authority; `signers` are its participating keys.
    pub fn with_multisig_signers(mut self, signers: Vec<Pubkey>) -> Self {
        self.multisig_signers = Some(signers);
        self
    }

    pub fn with_token_program(mut self, program_id: Pubkey) -> Self {
        self.token_program = program_id;
        self
    }

    /// Require `authority` to match the authority read from the mint account.
    pub fn with_onchain_authority(mut self, authority: MintAuthority) -> Self {
        self.onchain_authority = Some(authority);
        self
    }

    pub fn mint(&self) -> &Pubkey {
        &self.mint
    }

    pub fn authority(&self) -> &Pubkey {
        &self.authority
    }

    /// Check the account combination and produce the instruction.
    pub fn validate_and_build(self) -> MintResult<Instruction> {
        if self.destination == self.mint {
            return Err(MintError::InvalidInstruction(format!(
                "destination {} is the mint itself",
                self.destination
            )));
        }

        match self.onchain_authority {
            Some(MintAuthority::Disabled) => {
                return Err(MintError::InvalidInstruction(format!(
                    "mint {} has no mint authority",
                    self.mint
                )));
            }
            Some(MintAuthority::Key(expected)) if expected != self.authority => {
                return Err(MintError::InvalidInstruction(format!(
                    "{} is not the mint authority of {} (expected {})",
                    self.authority, self.mint, expected
                )));
            }
            _ => {}
        }

        if let Some(list) = &self.multisig_signers {
            validate_multisig(&self.authority, list)?;
        }
        let signers: Vec<&Pubkey> = self.multisig_signers.iter().flatten().collect();

        spl_token::instruction::mint_to(
            &self.token_program,
            &self.mint,
            &self.destination,
            &self.authority,
            &signers,
            self.amount,
        )
        .map_err(|e| {
            MintError::InvalidInstruction(format!(
                "token program {} rejected MintTo: {}",
                self.token_program, e
            ))
        })
    }
}

fn parse_address(field: &str, value: &str) -> MintResult<Pubkey> {
    Pubkey::from_str(value.trim()).map_err(|e| {
        MintError::InvalidInstruction(format!("malformed {} address '{}': {}", field, value, e))
    })
}

fn validate_multisig(authority: &Pubkey, signers: &[Pubkey]) -> MintResult<()> {
    if signers.is_empty() {
        return Err(MintError::InvalidInstruction(
            "multisig signer list is empty".to_string(),
        ));
    }
    if signers.len() > MAX_SIGNERS {
        return Err(MintError::InvalidInstruction(format!(
            "{} multisig signers exceed the maximum of {}",
            signers.len(),
            MAX_SIGNERS
        )));
    }

    let mut seen = HashSet::with_capacity(signers.len());
    for signer in signers {
        if signer == authority {
            return Err(MintError::InvalidInstruction(format!(
                "multisig authority {} listed as its own signer",
                signer
            )));
        }
        if !seen.insert(signer) {
            return Err(MintError::InvalidInstruction(format!(
                "duplicate multisig signer {}",
                signer
            )));
        }
    }
    Ok(())
}
