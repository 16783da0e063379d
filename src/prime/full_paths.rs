//! Full-path primer: sources full-path values from each scheme's CSV
//! listing, then warms a capped number of individual lookups.

use tracing::{info, warn};

use crate::cache::keys::encode_component;
use crate::cache::{ConceptKey, ResponseCache};
use crate::config::PrimeSettings;
use crate::upstream::{ConceptScheme, RequestDescriptor, ResponseProducer};

use super::concepts::list_entry;
use super::routes::{PrimeRouteEntry, SettledResult, warm_route};
use super::{FULL_PATH_FORMATS, PRIME_VERSION};

const FULL_PATH_RESOURCE: &str = "/concept/full_path/{fullPath+}";

/// CSV rows before the data: one metadata row, one header row.
const CSV_PREAMBLE_ROWS: usize = 2;

const FULL_PATH_SEPARATOR: &str = "|";

/// Extracts full-path values from a scheme's CSV listing body. The
/// populated columns of each data row join into one path value. Malformed
/// CSV degrades to zero paths for the scheme, never an error.
fn parse_csv_full_paths(body: &str) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(record),
            Err(err) => {
                warn!(error = %err, "discarding unparseable scheme csv");
                return Vec::new();
            }
        }
    }
    if rows.len() <= CSV_PREAMBLE_ROWS {
        return Vec::new();
    }
    rows[CSV_PREAMBLE_ROWS..]
        .iter()
        .map(|row| {
            row.iter()
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
                .join(FULL_PATH_SEPARATOR)
        })
        .filter(|value| !value.is_empty())
        .collect()
}

fn full_path_entry(full_path: &str, format: &str) -> PrimeRouteEntry {
    let encoded = encode_component(full_path);
    let path = format!("/concept/full_path/{encoded}");
    let request = RequestDescriptor::new(FULL_PATH_RESOURCE, path)
        .with_query("version", PRIME_VERSION)
        .with_query("format", format);
    let cache_key = ConceptKey {
        version: Some(PRIME_VERSION.to_owned()),
        path: Some(FULL_PATH_RESOURCE.to_owned()),
        endpoint_path: Some(request.path.clone()),
        format: Some(format.to_owned()),
        full_path: Some(full_path.to_owned()),
        ..ConceptKey::default()
    }
    .cache_key();
    PrimeRouteEntry {
        label: format!("/concept/full_path/{full_path}?format={format}"),
        request,
        cache_key,
    }
}

/// Warms full-path lookups. One CSV page per scheme feeds the path list;
/// the warm fan-out is capped by `max_full_paths`. All requests run
/// sequentially, as deliberate backpressure.
pub async fn prime_full_paths(
    producer: &dyn ResponseProducer,
    list_cache: &ResponseCache,
    concept_cache: &ResponseCache,
    schemes: &[ConceptScheme],
    settings: &PrimeSettings,
) -> Vec<SettledResult> {
    let mut settled = Vec::new();
    let mut warm_entries = Vec::new();

    for scheme in schemes {
        let csv_page = warm_route(
            producer,
            list_cache,
            settings.request_timeout,
            list_entry(Some(&scheme.notation), "csv", 1, settings.page_size),
        )
        .await;
        let full_paths = csv_page
            .response()
            .map(|response| parse_csv_full_paths(&response.body))
            .unwrap_or_default();
        info!(
            scheme = %scheme.notation,
            csv_paths = full_paths.len(),
            "collected full paths from scheme csv"
        );
        settled.push(csv_page);

        for full_path in &full_paths {
            for format in FULL_PATH_FORMATS {
                warm_entries.push(full_path_entry(full_path, format));
            }
        }
    }

    warm_entries.truncate(settings.max_full_paths);
    for entry in warm_entries {
        settled.push(warm_route(producer, concept_cache, settings.request_timeout, entry).await);
    }

    settled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_rows_are_skipped_and_columns_joined() {
        let body = "\
Keyword Version: 20.6,Revision: 2024-02-01,,
Category,Topic,Term,UUID
Earth Science,Atmosphere,Clouds,abc-123
Earth Science,,Aerosols,def-456
";
        let paths = parse_csv_full_paths(body);
        assert_eq!(
            paths,
            vec![
                "Earth Science|Atmosphere|Clouds|abc-123",
                "Earth Science|Aerosols|def-456",
            ]
        );
    }

    #[test]
    fn short_or_empty_bodies_yield_no_paths() {
        assert!(parse_csv_full_paths("").is_empty());
        assert!(parse_csv_full_paths("only,meta\nonly,header\n").is_empty());
    }

    #[test]
    fn malformed_csv_degrades_to_no_paths() {
        // The unclosed quote swallows the rest of the body into one record,
        // which never clears the preamble.
        assert!(parse_csv_full_paths("a,\"b\nc,d\n").is_empty());
    }

    #[test]
    fn full_path_entry_encodes_the_path_segment() {
        let entry = full_path_entry("Earth Science|Atmosphere", "json");
        assert_eq!(
            entry.request.path,
            "/concept/full_path/Earth%20Science%7CAtmosphere"
        );
        assert!(
            entry
                .cache_key
                .contains(":earth%20science%7Catmosphere:")
        );
        assert_eq!(entry.label, "/concept/full_path/Earth Science|Atmosphere?format=json");
    }
}
