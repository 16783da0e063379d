//! Tree primer: the all-schemes tree plus one tree per concept scheme.

use crate::cache::{ResponseCache, TreeKey};
use crate::config::PrimeSettings;
use crate::upstream::{ConceptScheme, RequestDescriptor, ResponseProducer};

use super::PRIME_VERSION;
use super::routes::{PrimeRouteEntry, SettledResult, warm_route};

const TREE_RESOURCE: &str = "/tree/concept_scheme/{conceptScheme}";

pub(crate) fn tree_entry(scheme: &str) -> PrimeRouteEntry {
    let path = format!("/tree/concept_scheme/{scheme}");
    let request = RequestDescriptor::new(TREE_RESOURCE, path.clone())
        .with_query("version", PRIME_VERSION);
    let cache_key = TreeKey {
        version: Some(PRIME_VERSION.to_owned()),
        scheme: Some(scheme.to_owned()),
        filter: None,
    }
    .cache_key();
    PrimeRouteEntry {
        label: path,
        request,
        cache_key,
    }
}

/// Warms every keyword tree, sequentially. No pagination.
pub async fn prime_trees(
    producer: &dyn ResponseProducer,
    cache: &ResponseCache,
    schemes: &[ConceptScheme],
    settings: &PrimeSettings,
) -> Vec<SettledResult> {
    let mut settled = Vec::with_capacity(schemes.len() + 1);
    settled.push(warm_route(producer, cache, settings.request_timeout, tree_entry("all")).await);
    for scheme in schemes {
        let entry = tree_entry(&scheme.notation);
        settled.push(warm_route(producer, cache, settings.request_timeout, entry).await);
    }
    settled
}
