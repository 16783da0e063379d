//! List primer: the root `/concepts` listing plus every
//! scheme × format × page combination.

use tracing::info;

use crate::cache::{ConceptsKey, ResponseCache};
use crate::config::PrimeSettings;
use crate::upstream::{ConceptScheme, RequestDescriptor, ResponseProducer};

use super::routes::{PrimeRouteEntry, SettledResult, warm_route};
use super::{LIST_FORMATS, PRIME_VERSION};

const ROOT_RESOURCE: &str = "/concepts";
const SCHEME_RESOURCE: &str = "/concepts/concept_scheme/{conceptScheme}";

pub(crate) fn list_entry(
    scheme: Option<&str>,
    format: &str,
    page_num: u32,
    page_size: u32,
) -> PrimeRouteEntry {
    let (resource, path, label) = match scheme {
        Some(name) => (
            SCHEME_RESOURCE,
            format!("/concepts/concept_scheme/{name}"),
            format!("/concepts/concept_scheme/{name}?format={format}&page_num={page_num}"),
        ),
        None => (
            ROOT_RESOURCE,
            ROOT_RESOURCE.to_owned(),
            format!("/concepts?format={format}"),
        ),
    };
    let request = RequestDescriptor::new(resource, path.clone())
        .with_query("version", PRIME_VERSION)
        .with_query("page_num", page_num.to_string())
        .with_query("page_size", page_size.to_string())
        .with_query("format", format);
    let cache_key = ConceptsKey {
        version: Some(PRIME_VERSION.to_owned()),
        path: Some(resource.to_owned()),
        endpoint_path: Some(path),
        scheme: scheme.map(str::to_owned),
        pattern: None,
        page_num,
        page_size,
        format: Some(format.to_owned()),
    }
    .cache_key();
    PrimeRouteEntry {
        label,
        request,
        cache_key,
    }
}

/// Page count discovered from a page-1 response, falling back when the
/// header is absent or unparseable.
fn total_pages(first: &SettledResult, fallback: u32) -> u32 {
    first
        .response()
        .and_then(|response| response.header("X-Total-Pages"))
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|pages| *pages > 0)
        .unwrap_or(fallback)
}

/// Warms every listing route. Requests run strictly one after another;
/// the serialization is deliberate backpressure on the producer, not an
/// accident to optimize away.
pub async fn prime_concepts(
    producer: &dyn ResponseProducer,
    cache: &ResponseCache,
    schemes: &[ConceptScheme],
    settings: &PrimeSettings,
) -> Vec<SettledResult> {
    let mut settled = Vec::new();

    for format in LIST_FORMATS {
        let entry = list_entry(None, format, 1, settings.page_size);
        settled.push(warm_route(producer, cache, settings.request_timeout, entry).await);
    }

    for scheme in schemes {
        for format in LIST_FORMATS {
            let first = warm_route(
                producer,
                cache,
                settings.request_timeout,
                list_entry(Some(&scheme.notation), format, 1, settings.page_size),
            )
            .await;
            let pages = total_pages(&first, settings.fallback_max_pages);
            let page_one_rejected = first.response().is_none();
            settled.push(first);
            if page_one_rejected {
                // Without page 1 there is no page count worth trusting.
                continue;
            }
            for page_num in 2..=pages {
                let entry = list_entry(Some(&scheme.notation), format, page_num, settings.page_size);
                settled.push(warm_route(producer, cache, settings.request_timeout, entry).await);
            }
            info!(
                scheme = %scheme.notation,
                format,
                pages,
                "primed scheme listing"
            );
        }
    }

    settled
}
