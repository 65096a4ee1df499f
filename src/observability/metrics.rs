//! Pipeline metrics.
//!
//! # Metrics
//! - `mint_submit_stage_failures_total` (counter): failures by stage
//! - `mint_submit_submissions_total` (counter): transactions accepted by the node
//! - `mint_submit_confirmations_total` (counter): terminal outcomes by kind
//! - `mint_submit_confirmation_seconds` (histogram): submit-to-outcome latency

use std::time::Duration;

pub fn record_stage_failure(stage: &'static str) {
    metrics::counter!("mint_submit_stage_failures_total", "stage" => stage).increment(1);
}

pub fn record_submission() {
    metrics::counter!("mint_submit_submissions_total").increment(1);
}

pub fn record_confirmation(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("mint_submit_confirmations_total", "outcome" => outcome).increment(1);
    metrics::histogram!("mint_submit_confirmation_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}
