//! End-to-end mint workflow.
//!
//! # Data Flow
//! ```text
//! MintRequest
//!     → preflight (optional mint-authority read)
//!     → MintToBuilder::validate_and_build
//!     → CheckpointProvider::latest_checkpoint (fetched right before assembly)
//!     → Transaction::assemble
//!     → TxSigner::sign
//!     → Confirmer::send_and_confirm
//! ```
//!
//! Every stage fails fast with a stage-tagged [`MintError`]; nothing is
//! retried. A caller that wants another attempt runs the pipeline again,
//! which fetches a new checkpoint.

use std::str::FromStr;
use std::time::Duration;

use spl_associated_token_account::get_associated_token_address_with_program_id;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::chain::confirm::Confirmer;
use crate::chain::instruction::{MintAuthority, MintToBuilder};
use crate::chain::transaction::Transaction;
use crate::chain::transport::{
    BroadcastTransport, CheckpointProvider, MintAccountReader, SubscriptionTransport,
};
use crate::chain::types::{Commitment, Confirmation, MintError, MintResult, Pubkey};
use crate::chain::wallet::{KeyLookup, TxSigner};
use crate::config::schema::{MintSection, RpcConfig};
use crate::observability::metrics;

/// Parameters of one mint, as address text.
///
/// Addresses are parsed by the instruction stage so malformed input fails
/// there, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub amount: u64,
    pub mint: String,
    pub destination: String,
    pub authority: String,
    pub multisig_signers: Vec<String>,
    pub token_program: String,
}

impl MintRequest {
    /// Build from the `[mint]` section.
    ///
    /// The authority defaults to `wallet`. The destination defaults to the
    /// wallet's associated token account for the mint. If the mint or program
    /// text does not parse, the mint text is kept as the destination so the
    /// instruction stage reports the malformed address.
    pub fn from_config(section: &MintSection, wallet: &Pubkey) -> Self {
        let destination = section.destination.clone().unwrap_or_else(|| {
            associated_token_account(wallet, &section.token_mint, &section.token_program)
                .map(|ata| ata.to_string())
                .unwrap_or_else(|| section.token_mint.clone())
        });
        Self {
            amount: section.amount,
            mint: section.token_mint.clone(),
            destination,
            authority: section.authority.clone().unwrap_or_else(|| wallet.to_string()),
            multisig_signers: section.multisig_signers.clone(),
            token_program: section.token_program.clone(),
        }
    }
}

/// The token account `owner` holds for `mint` under `token_program`.
fn associated_token_account(owner: &Pubkey, mint: &str, token_program: &str) -> Option<Pubkey> {
    let mint = Pubkey::from_str(mint.trim()).ok()?;
    let program = Pubkey::from_str(token_program.trim()).ok()?;
    Some(get_associated_token_address_with_program_id(owner, &mint, &program))
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Commitment awaited before the run reports success.
    pub commitment: Commitment,
    pub confirm_timeout: Duration,
    pub verify_mint_authority: bool,
    /// Account paying the fee. Defaults to the first signer.
    pub fee_payer: Option<Pubkey>,
}

impl PipelineOptions {
    pub fn from_config(config: &RpcConfig) -> Self {
        Self {
            commitment: config.commitment,
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
            verify_mint_authority: config.verify_mint_authority,
            fee_payer: None,
        }
    }

    pub fn with_fee_payer(mut self, payer: Pubkey) -> Self {
        self.fee_payer = Some(payer);
        self
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&RpcConfig::default())
    }
}

/// Drives one mint request through every stage.
pub struct MintPipeline<'a, R> {
    rpc: &'a R,
    signer: TxSigner<'a>,
    options: PipelineOptions,
}

impl<'a, R> MintPipeline<'a, R>
where
    R: CheckpointProvider + MintAccountReader + BroadcastTransport,
{
    pub fn new(rpc: &'a R, keys: &'a dyn KeyLookup, options: PipelineOptions) -> Self {
        Self {
            rpc,
            signer: TxSigner::new(keys),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Build, assemble and sign without submitting.
    pub async fn prepare(&self, request: &MintRequest) -> MintResult<Transaction> {
        let span = tracing::info_span!("mint", run_id = %Uuid::new_v4(), dry_run = true);
        self.signed_transaction(request)
            .instrument(span)
            .await
            .inspect_err(report_failure)
    }

    /// Run every stage and wait for the target commitment.
    ///
    /// `shutdown` cancels the confirmation wait.
    pub async fn run(
        &self,
        pubsub: &dyn SubscriptionTransport,
        request: &MintRequest,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> MintResult<Confirmation> {
        let span = tracing::info_span!("mint", run_id = %Uuid::new_v4(), dry_run = false);
        async {
            let tx = self.signed_transaction(request).await?;
            let confirmer = Confirmer::new(
                self.rpc,
                pubsub,
                self.options.commitment,
                self.options.confirm_timeout,
            );
            confirmer.send_and_confirm(&tx, shutdown).await
        }
        .instrument(span)
        .await
        .inspect_err(report_failure)
    }

    async fn signed_transaction(&self, request: &MintRequest) -> MintResult<Transaction> {
        let token_program = Pubkey::from_str(request.token_program.trim()).map_err(|e| {
            MintError::InvalidInstruction(format!(
                "malformed token program address '{}': {}",
                request.token_program, e
            ))
        })?;
        let mut builder = MintToBuilder::from_strs(
            request.amount,
            &request.mint,
            &request.destination,
            &request.authority,
            &request.multisig_signers,
        )?
        .with_token_program(token_program);

        if self.options.verify_mint_authority {
            let onchain = self
                .rpc
                .mint_authority(builder.mint())
                .await
                .map_err(MintError::Preflight)?;
            tracing::debug!(mint = %builder.mint(), authority = ?onchain, "Mint authority read");
            builder = builder.with_onchain_authority(MintAuthority::from(onchain));
        }

        let instruction = builder.validate_and_build()?;
        tracing::info!(amount = request.amount, mint = %request.mint, destination = %request.destination, "Mint instruction built");

        let checkpoint = self
            .rpc
            .latest_checkpoint(self.options.commitment)
            .await
            .map_err(MintError::Checkpoint)?;
        tracing::debug!(
            blockhash = %checkpoint.blockhash,
            last_valid_block_height = checkpoint.last_valid_block_height,
            "Checkpoint fetched"
        );

        let mut tx = Transaction::assemble(&[instruction], &checkpoint, self.options.fee_payer)?;
        self.signer.sign(&mut tx)?;
        Ok(tx)
    }
}

fn report_failure(err: &MintError) {
    metrics::record_stage_failure(err.stage());
    tracing::error!(stage = err.stage(), error = %err, "Mint failed");
}
