//! Route attempt bookkeeping shared by the three primers.

use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::cache::{ResponseCache, ResponseEnvelope};
use crate::upstream::{RequestDescriptor, ResponseProducer};

/// One concrete route worth pre-computing, with the key the live read
/// path would use for an equivalent real request.
#[derive(Debug, Clone)]
pub struct PrimeRouteEntry {
    pub label: String,
    pub request: RequestDescriptor,
    pub cache_key: String,
}

#[derive(Debug)]
pub enum RouteOutcome {
    Fulfilled(ResponseEnvelope),
    Rejected(String),
}

/// Exactly one of these per route attempt; a rejection never aborts
/// sibling attempts.
#[derive(Debug)]
pub struct SettledResult {
    pub entry: PrimeRouteEntry,
    pub outcome: RouteOutcome,
}

impl SettledResult {
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match &self.outcome {
            RouteOutcome::Fulfilled(response) => Some(response),
            RouteOutcome::Rejected(_) => None,
        }
    }
}

/// Executes one route through the producer, storing a successful response
/// under the entry's cache key. Transport errors and timeouts settle as
/// rejections; non-2xx responses settle fulfilled and are judged by the
/// orchestrator.
pub(crate) async fn warm_route(
    producer: &dyn ResponseProducer,
    cache: &ResponseCache,
    per_call_timeout: Duration,
    entry: PrimeRouteEntry,
) -> SettledResult {
    debug!(route = %entry.label, "priming route");
    let outcome = match timeout(per_call_timeout, producer.produce(&entry.request)).await {
        Ok(Ok(response)) => {
            if response.is_success() {
                cache.write(&entry.cache_key, &response).await;
            }
            RouteOutcome::Fulfilled(response)
        }
        Ok(Err(err)) => RouteOutcome::Rejected(err.to_string()),
        Err(_) => RouteOutcome::Rejected(format!(
            "timed out after {}ms",
            per_call_timeout.as_millis()
        )),
    };
    SettledResult { entry, outcome }
}
