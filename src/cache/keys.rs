//! Cache key derivation.
//!
//! Keys are colon-delimited with a fixed field order per domain. Every
//! free-text dimension is lower-cased and percent-encoded before
//! concatenation so that no value can collide with the delimiter and
//! case variants of the same request share one entry.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

pub const CONCEPT_KEY_PREFIX: &str = "kms:concept";
pub const CONCEPTS_KEY_PREFIX: &str = "kms:concepts";
pub const TREE_KEY_PREFIX: &str = "kms:tree";
/// Marker key holding the published version name the cache was last primed for.
pub const VERSION_MARKER_KEY: &str = "kms:concepts:published:version";

const DEFAULT_VERSION: &str = "published";
const DEFAULT_FORMAT: &str = "rdf";

// Same escape set as JavaScript's encodeURIComponent.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a value for use inside a request path segment.
pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

fn normalize_version(version: Option<&str>) -> String {
    match version {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DEFAULT_VERSION.to_string(),
    }
}

fn normalize_format(format: Option<&str>) -> String {
    match format {
        Some(value) if !value.is_empty() => value.to_lowercase(),
        _ => DEFAULT_FORMAT.to_string(),
    }
}

fn normalize_path(path: Option<&str>) -> String {
    path.unwrap_or_default().to_lowercase()
}

/// Lower-case then percent-encode a free-text dimension; absent values
/// collapse to the empty string.
fn normalize_value(value: Option<&str>) -> String {
    match value {
        Some(value) if !value.is_empty() => {
            utf8_percent_encode(&value.to_lowercase(), COMPONENT).to_string()
        }
        _ => String::new(),
    }
}

/// A listing scheme may arrive under two external spellings of the same
/// underlying scheme; canonicalize so both hit one cache entry.
fn normalize_concepts_scheme(scheme: Option<&str>) -> String {
    match scheme {
        Some(value) if !value.is_empty() => {
            let lowered = value.to_lowercase();
            if lowered == "granuledataformat" {
                "dataformat".to_string()
            } else {
                utf8_percent_encode(&lowered, COMPONENT).to_string()
            }
        }
        _ => String::new(),
    }
}

/// Dimensions of a single-item (concept) response.
#[derive(Debug, Clone, Default)]
pub struct ConceptKey {
    pub version: Option<String>,
    pub path: Option<String>,
    pub endpoint_path: Option<String>,
    pub format: Option<String>,
    pub concept_id: Option<String>,
    pub short_name: Option<String>,
    pub alt_label: Option<String>,
    pub full_path: Option<String>,
    pub scheme: Option<String>,
}

impl ConceptKey {
    pub fn cache_key(&self) -> String {
        format!(
            "{CONCEPT_KEY_PREFIX}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            normalize_version(self.version.as_deref()),
            normalize_path(self.path.as_deref()),
            normalize_path(self.endpoint_path.as_deref()),
            normalize_format(self.format.as_deref()),
            normalize_value(self.concept_id.as_deref()),
            normalize_value(self.short_name.as_deref()),
            normalize_value(self.alt_label.as_deref()),
            normalize_value(self.full_path.as_deref()),
            normalize_value(self.scheme.as_deref()),
        )
    }
}

/// Dimensions of a paginated listing (concepts) response.
#[derive(Debug, Clone)]
pub struct ConceptsKey {
    pub version: Option<String>,
    pub path: Option<String>,
    pub endpoint_path: Option<String>,
    pub scheme: Option<String>,
    pub pattern: Option<String>,
    pub page_num: u32,
    pub page_size: u32,
    pub format: Option<String>,
}

impl Default for ConceptsKey {
    fn default() -> Self {
        Self {
            version: None,
            path: None,
            endpoint_path: None,
            scheme: None,
            pattern: None,
            page_num: 1,
            page_size: 2000,
            format: None,
        }
    }
}

impl ConceptsKey {
    pub fn cache_key(&self) -> String {
        format!(
            "{CONCEPTS_KEY_PREFIX}:{}:{}:{}:{}:{}:{}:{}:{}",
            normalize_version(self.version.as_deref()),
            normalize_path(self.path.as_deref()),
            normalize_path(self.endpoint_path.as_deref()),
            normalize_concepts_scheme(self.scheme.as_deref()),
            normalize_value(self.pattern.as_deref()),
            self.page_num,
            self.page_size,
            normalize_format(self.format.as_deref()),
        )
    }
}

/// Dimensions of a keyword-tree response.
#[derive(Debug, Clone, Default)]
pub struct TreeKey {
    pub version: Option<String>,
    pub scheme: Option<String>,
    pub filter: Option<String>,
}

impl TreeKey {
    pub fn cache_key(&self) -> String {
        format!(
            "{TREE_KEY_PREFIX}:{}:{}:{}",
            normalize_version(self.version.as_deref()),
            normalize_value(self.scheme.as_deref()),
            normalize_value(self.filter.as_deref()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_concepts_key() -> ConceptsKey {
        ConceptsKey {
            version: Some("published".to_string()),
            path: Some("/concepts/concept_scheme/{conceptScheme}".to_string()),
            endpoint_path: Some("/concepts/concept_scheme/instruments".to_string()),
            scheme: Some("instruments".to_string()),
            pattern: None,
            page_num: 1,
            page_size: 2000,
            format: Some("json".to_string()),
        }
    }

    #[test]
    fn identical_dimensions_yield_identical_keys() {
        assert_eq!(
            sample_concepts_key().cache_key(),
            sample_concepts_key().cache_key()
        );
    }

    #[test]
    fn each_dimension_changes_the_key() {
        let base = sample_concepts_key().cache_key();

        let mut key = sample_concepts_key();
        key.version = Some("draft".to_string());
        assert_ne!(key.cache_key(), base);

        let mut key = sample_concepts_key();
        key.scheme = Some("platforms".to_string());
        assert_ne!(key.cache_key(), base);

        let mut key = sample_concepts_key();
        key.pattern = Some("aqua".to_string());
        assert_ne!(key.cache_key(), base);

        let mut key = sample_concepts_key();
        key.page_num = 2;
        assert_ne!(key.cache_key(), base);

        let mut key = sample_concepts_key();
        key.page_size = 100;
        assert_ne!(key.cache_key(), base);

        let mut key = sample_concepts_key();
        key.format = Some("csv".to_string());
        assert_ne!(key.cache_key(), base);

        let mut key = sample_concepts_key();
        key.endpoint_path = Some("/concepts/concept_scheme/platforms".to_string());
        assert_ne!(key.cache_key(), base);
    }

    #[test]
    fn version_difference_is_confined_to_the_version_field() {
        let published = sample_concepts_key().cache_key();
        let mut draft_key = sample_concepts_key();
        draft_key.version = Some("draft".to_string());
        let draft = draft_key.cache_key();

        assert_eq!(
            published.replacen("published", "draft", 1),
            draft,
            "keys should differ only in the version field"
        );
    }

    #[test]
    fn granule_data_format_aliases_collapse() {
        let build = |scheme: &str| ConceptsKey {
            scheme: Some(scheme.to_string()),
            ..sample_concepts_key()
        };

        let canonical = build("dataformat").cache_key();
        assert_eq!(build("GranuleDataFormat").cache_key(), canonical);
        assert_eq!(build("granuledataformat").cache_key(), canonical);
    }

    #[test]
    fn missing_dimensions_use_sentinels() {
        let key = ConceptsKey::default().cache_key();
        assert!(key.starts_with("kms:concepts:published:"));
        assert!(key.ends_with(":rdf"));

        let key = ConceptKey::default().cache_key();
        assert_eq!(key, "kms:concept:published:::rdf:::::");
    }

    #[test]
    fn reserved_delimiters_are_escaped() {
        let key = ConceptKey {
            full_path: Some("Earth Science|Atmosphere:Clouds".to_string()),
            ..Default::default()
        }
        .cache_key();

        // The encoded full path must not introduce extra `:` fields.
        assert_eq!(key.matches(':').count(), 10);
        assert!(key.contains("earth%20science%7Catmosphere%3Aclouds"));
    }

    #[test]
    fn case_variants_share_one_entry() {
        let upper = TreeKey {
            scheme: Some("ScienceKeywords".to_string()),
            ..Default::default()
        };
        let lower = TreeKey {
            scheme: Some("sciencekeywords".to_string()),
            ..Default::default()
        };
        assert_eq!(upper.cache_key(), lower.cache_key());
    }

    #[test]
    fn tree_key_shape() {
        let key = TreeKey {
            version: Some("9.1.5".to_string()),
            scheme: Some("all".to_string()),
            filter: None,
        }
        .cache_key();
        assert_eq!(key, "kms:tree:9.1.5:all:");
    }
}
