//! Priming orchestrator: marker comparison, invalidation, warming, and
//! the final summary.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{
    CONCEPT_KEY_PREFIX, CONCEPTS_KEY_PREFIX, ConnectionManager, ResponseCache, TREE_KEY_PREFIX,
    read_version_marker, write_version_marker,
};
use crate::config::PrimeSettings;
use crate::telemetry::{METRIC_PRIME_FAILED_TOTAL, METRIC_PRIME_RUN_MS, METRIC_PRIME_WARMED_TOTAL};
use crate::upstream::{ResponseProducer, UpstreamMetadata};

use super::PRIME_VERSION;
use super::concepts::prime_concepts;
use super::full_paths::prime_full_paths;
use super::routes::{RouteOutcome, SettledResult};
use super::trees::prime_trees;

/// Everything one priming run needs, assembled by the composition root.
pub struct PrimeContext {
    pub manager: Arc<ConnectionManager>,
    pub producer: Arc<dyn ResponseProducer>,
    pub metadata: Arc<dyn UpstreamMetadata>,
    pub settings: PrimeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimeSummary {
    pub marker: String,
    pub deleted_keys: u64,
    pub warmed: u64,
    pub failed: u64,
    pub schemes: usize,
    pub max_pages_fallback: u32,
}

/// A run either completes with a summary or skips early; a skip is a
/// normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PrimeOutcome {
    Skipped { reason: String },
    Completed { summary: PrimeSummary },
}

impl PrimeOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// True when the run completed with at least one failed route.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Completed { summary } if summary.failed > 0)
    }
}

/// Classifies settled results: 2xx warmed, 400 ignored (a scheme/pattern
/// combination that legitimately has no data), everything else failed.
fn tally(settled: &[SettledResult]) -> (u64, u64) {
    let mut warmed = 0;
    let mut failed = 0;
    for result in settled {
        match &result.outcome {
            RouteOutcome::Fulfilled(response) if response.is_success() => warmed += 1,
            RouteOutcome::Fulfilled(response) if response.status == 400 => {}
            RouteOutcome::Fulfilled(response) => {
                failed += 1;
                warn!(
                    route = %result.entry.label,
                    key = %result.entry.cache_key,
                    status = response.status,
                    "prime route returned non-success"
                );
            }
            RouteOutcome::Rejected(reason) => {
                failed += 1;
                error!(route = %result.entry.label, reason = %reason, "prime route rejected");
            }
        }
    }
    (warmed, failed)
}

/// Runs one priming pass end to end. Never returns an error: every early
/// exit is a skip outcome and every per-route problem lands in the
/// failure count.
pub async fn run_prime(context: &PrimeContext) -> PrimeOutcome {
    info!("cache prime start");
    let started = Instant::now();

    let store = match context.manager.acquire().await {
        Ok(Some(store)) => store,
        Ok(None) => {
            info!(reason = "store not configured", "cache prime skipped");
            return PrimeOutcome::skipped("store not configured");
        }
        Err(err) => {
            warn!(error = %err, "cache prime skipped, store unavailable");
            return PrimeOutcome::skipped(format!("store unavailable: {err}"));
        }
    };

    let version = match context.metadata.version_metadata(PRIME_VERSION).await {
        Ok(Some(version)) => version,
        Ok(None) => {
            info!(
                reason = "missing published version metadata",
                "cache prime skipped"
            );
            return PrimeOutcome::skipped("published version metadata not found");
        }
        Err(err) => {
            warn!(error = %err, "cache prime skipped, metadata unavailable");
            return PrimeOutcome::skipped(format!("version metadata unavailable: {err}"));
        }
    };

    let marker = version.version_name;
    let current = match read_version_marker(store.as_ref()).await {
        Ok(current) => current,
        Err(err) => {
            warn!(error = %err, "version marker unreadable, assuming unprimed");
            None
        }
    };
    info!(
        current = current.as_deref().unwrap_or("none"),
        target = %marker,
        "cache prime marker"
    );
    if current.as_deref() == Some(marker.as_str()) {
        info!(reason = "already primed", "cache prime skipped");
        return PrimeOutcome::skipped("already primed for current published version");
    }

    let concepts_cache = ResponseCache::new(
        Arc::clone(&context.manager),
        "concepts",
        CONCEPTS_KEY_PREFIX,
    );
    let concept_cache =
        ResponseCache::new(Arc::clone(&context.manager), "concept", CONCEPT_KEY_PREFIX);
    let tree_cache = ResponseCache::new(Arc::clone(&context.manager), "tree", TREE_KEY_PREFIX);

    debug!("clearing response domains");
    // The three domains have disjoint prefixes and share no state, so
    // this is the one place the run fans out.
    let (concepts_cleared, concept_cleared, tree_cleared) = tokio::join!(
        concepts_cache.clear_all(),
        concept_cache.clear_all(),
        tree_cache.clear_all(),
    );
    let deleted_keys = [concepts_cleared, concept_cleared, tree_cleared]
        .into_iter()
        .map(|cleared| match cleared {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "domain clear failed");
                0
            }
        })
        .sum();
    info!(deleted_keys, "cleared stale entries");

    let schemes = match context.metadata.concept_schemes(PRIME_VERSION).await {
        Ok(schemes) => schemes,
        Err(err) => {
            warn!(error = %err, "concept scheme details unavailable, priming root routes only");
            Vec::new()
        }
    };

    let producer = context.producer.as_ref();
    let list_settled =
        prime_concepts(producer, &concepts_cache, &schemes, &context.settings).await;
    let tree_settled = prime_trees(producer, &tree_cache, &schemes, &context.settings).await;
    let full_path_settled = prime_full_paths(
        producer,
        &concepts_cache,
        &concept_cache,
        &schemes,
        &context.settings,
    )
    .await;

    let (list_warmed, list_failed) = tally(&list_settled);
    let (tree_warmed, tree_failed) = tally(&tree_settled);
    let (full_path_warmed, full_path_failed) = tally(&full_path_settled);
    let warmed = list_warmed + tree_warmed + full_path_warmed;
    let failed = list_failed + tree_failed + full_path_failed;

    // A partially warmed cache still beats a stale one, so the marker is
    // written regardless of the failure count; rerunning would skip.
    if let Err(err) = write_version_marker(store.as_ref(), &marker).await {
        warn!(error = %err, "version marker write failed");
    }

    counter!(METRIC_PRIME_WARMED_TOTAL).increment(warmed);
    counter!(METRIC_PRIME_FAILED_TOTAL).increment(failed);
    histogram!(METRIC_PRIME_RUN_MS).record(started.elapsed().as_millis() as f64);

    let summary = PrimeSummary {
        marker,
        deleted_keys,
        warmed,
        failed,
        schemes: schemes.len(),
        max_pages_fallback: context.settings.fallback_max_pages,
    };
    info!(
        marker = %summary.marker,
        deleted_keys = summary.deleted_keys,
        warmed = summary.warmed,
        failed = summary.failed,
        schemes = summary.schemes,
        "cache prime finished"
    );
    PrimeOutcome::Completed { summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseEnvelope;
    use crate::prime::concepts::list_entry;
    use crate::prime::routes::PrimeRouteEntry;

    fn settle(entry: PrimeRouteEntry, outcome: RouteOutcome) -> SettledResult {
        SettledResult { entry, outcome }
    }

    #[test]
    fn tally_splits_warmed_ignored_and_failed() {
        let settled = vec![
            settle(
                list_entry(None, "rdf", 1, 2000),
                RouteOutcome::Fulfilled(ResponseEnvelope::new(200, "ok")),
            ),
            settle(
                list_entry(None, "json", 1, 2000),
                RouteOutcome::Fulfilled(ResponseEnvelope::new(400, "no data")),
            ),
            settle(
                list_entry(None, "csv", 1, 2000),
                RouteOutcome::Fulfilled(ResponseEnvelope::new(502, "bad gateway")),
            ),
            settle(
                list_entry(Some("platforms"), "rdf", 2, 2000),
                RouteOutcome::Rejected("timed out after 30000ms".to_owned()),
            ),
        ];
        assert_eq!(tally(&settled), (1, 2));
    }

    #[test]
    fn failure_flag_tracks_the_failed_count() {
        let completed = PrimeOutcome::Completed {
            summary: PrimeSummary {
                marker: "20.6".to_owned(),
                deleted_keys: 10,
                warmed: 4,
                failed: 1,
                schemes: 2,
                max_pages_fallback: 25,
            },
        };
        assert!(completed.is_failure());
        assert!(!PrimeOutcome::skipped("already primed").is_failure());
    }

    #[test]
    fn summary_serializes_with_original_field_names() {
        let summary = PrimeSummary {
            marker: "20.6".to_owned(),
            deleted_keys: 3,
            warmed: 12,
            failed: 0,
            schemes: 4,
            max_pages_fallback: 25,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["deletedKeys"], 3);
        assert_eq!(json["maxPagesFallback"], 25);
    }
}
