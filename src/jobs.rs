//! Cron job wrapper around the priming run.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use cron::Schedule;

use crate::error::AppError;
use crate::prime::{PrimeContext, run_prime};

/// Marker struct for the cron-triggered priming job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct PrimeCacheJob;

impl From<chrono::DateTime<chrono::Utc>> for PrimeCacheJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Context for the priming job worker.
#[derive(Clone)]
pub struct PrimeJobContext {
    pub prime: Arc<PrimeContext>,
}

/// Process a scheduled priming tick. Skips and per-route failures are
/// already folded into the outcome, so the job itself never fails.
pub async fn process_prime_cache_job(
    _job: PrimeCacheJob,
    ctx: Data<PrimeJobContext>,
) -> Result<(), apalis::prelude::Error> {
    let outcome = run_prime(&ctx.prime).await;
    if outcome.is_failure() {
        tracing::warn!(?outcome, "scheduled cache prime finished with failures");
    }
    Ok(())
}

/// Parse the configured cron expression for the priming job.
pub fn prime_schedule(expression: &str) -> Result<Schedule, AppError> {
    Schedule::from_str(expression).map_err(|err| AppError::Schedule {
        expression: expression.to_owned(),
        reason: err.to_string(),
    })
}
