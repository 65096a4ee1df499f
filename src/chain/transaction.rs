//! Transaction assembly, signer slots and the wire encoding.
//!
//! # Responsibilities
//! - Compile instructions into a legacy `solana_sdk` message
//! - Hold one signature slot per required signer
//! - Serialize the signed transaction for `sendTransaction`
//!
//! Unfilled slots hold `Signature::default()` until a key fills them.

use std::collections::HashMap;

use solana_sdk::message::Message;
use solana_sdk::signature::Signer as _;
use solana_sdk::transaction::Transaction as LedgerTransaction;

use crate::chain::instruction::Instruction;
use crate::chain::types::{Checkpoint, Hash, MintError, MintResult, Pubkey, Signature};
use crate::chain::wallet::KeyLookup;

/// Compiled instructions address accounts with a single byte.
const MAX_ACCOUNT_KEYS: usize = u8::MAX as usize + 1;

/// The header counts required signers in a single byte.
const MAX_REQUIRED_SIGNERS: usize = u8::MAX as usize;

/// A legacy transaction built against a checkpoint, signed slot by slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    inner: LedgerTransaction,
}

impl Transaction {
    /// Package validated instructions against a freshly fetched checkpoint.
    ///
    /// The fee payer defaults to the first signer account of the instructions.
    pub fn assemble(
        instructions: &[Instruction],
        checkpoint: &Checkpoint,
        fee_payer: Option<Pubkey>,
    ) -> MintResult<Self> {
        if instructions.is_empty() {
            return Err(MintError::Assembly("instruction list is empty".to_string()));
        }
        if checkpoint.blockhash == Hash::default() {
            return Err(MintError::Assembly(
                "checkpoint blockhash is missing".to_string(),
            ));
        }
        check_account_limits(instructions, fee_payer.as_ref())?;

        let message =
            Message::new_with_blockhash(instructions, fee_payer.as_ref(), &checkpoint.blockhash);
        Ok(Self {
            inner: LedgerTransaction::new_unsigned(message),
        })
    }

    pub fn message(&self) -> &Message {
        &self.inner.message
    }

    /// Canonical bytes covered by every signature.
    pub fn message_bytes(&self) -> Vec<u8> {
        self.inner.message_data()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.inner.signatures
    }

    /// Keys whose signatures the transaction requires, in slot order.
    pub fn signer_keys(&self) -> &[Pubkey] {
        let message = &self.inner.message;
        let required = usize::from(message.header.num_required_signatures);
        &message.account_keys[..required.min(message.account_keys.len())]
    }

    /// The transaction id: the fee payer's signature, once present.
    pub fn signature(&self) -> Option<Signature> {
        self.inner
            .signatures
            .first()
            .copied()
            .filter(|sig| *sig != Signature::default())
    }

    /// Fill every slot whose key `lookup` holds. Returns the number of slots filled.
    ///
    /// Slots for keys the lookup does not hold are left as they are.
    pub fn sign_with(&mut self, lookup: &dyn KeyLookup) -> usize {
        let bytes = self.inner.message_data();
        let keys = self.signer_keys().to_vec();
        let mut filled = 0;
        for (slot, key) in self.inner.signatures.iter_mut().zip(&keys) {
            if let Some(signer) = lookup.lookup(key) {
                *slot = signer.sign_message(&bytes);
                filled += 1;
            }
        }
        filled
    }

    /// Required signers whose slot is still empty.
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.inner
            .signatures
            .iter()
            .zip(self.signer_keys())
            .filter(|(slot, _)| **slot == Signature::default())
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.missing_signers().is_empty()
    }

    /// Check every present signature against its signer key.
    pub fn verify(&self) -> bool {
        let bytes = self.inner.message_data();
        self.inner
            .signatures
            .iter()
            .zip(self.signer_keys())
            .all(|(sig, key)| *sig == Signature::default() || sig.verify(key.as_ref(), &bytes))
    }

    /// Serialize for broadcast. Refuses to encode a partially signed transaction.
    pub fn to_wire_bytes(&self) -> MintResult<Vec<u8>> {
        let missing = self.missing_signers();
        if !missing.is_empty() {
            return Err(MintError::MissingSignature { missing });
        }

        bincode::serialize(&self.inner)
            .map_err(|e| MintError::Assembly(format!("wire encoding failed: {}", e)))
    }
}

/// Reject instruction sets whose keys or signers overflow the message header.
///
/// Message compilation panics on overflow, so the counts are checked first.
fn check_account_limits(instructions: &[Instruction], payer: Option<&Pubkey>) -> MintResult<()> {
    let mut keys: HashMap<Pubkey, bool> = HashMap::new();
    if let Some(payer) = payer {
        keys.insert(*payer, true);
    }
    for ix in instructions {
        keys.entry(ix.program_id).or_insert(false);
        for meta in &ix.accounts {
            *keys.entry(meta.pubkey).or_insert(false) |= meta.is_signer;
        }
    }

    let signers = keys.values().filter(|is_signer| **is_signer).count();
    if signers == 0 {
        return Err(MintError::Assembly(
            "no instruction account is a signer".to_string(),
        ));
    }
    if signers > MAX_REQUIRED_SIGNERS {
        return Err(MintError::Assembly(format!(
            "{} signers exceed the limit of {}",
            signers,
            MAX_REQUIRED_SIGNERS
        )));
    }
    if keys.len() > MAX_ACCOUNT_KEYS {
        return Err(MintError::Assembly(format!(
            "{} account keys exceed the limit of {}",
            keys.len(),
            MAX_ACCOUNT_KEYS
        )));
    }
    Ok(())
}
