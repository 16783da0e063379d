//! Cache priming: route enumeration per response domain and the
//! orchestrator that ties invalidation, warming, and the version marker
//! together.

mod concepts;
mod full_paths;
mod orchestrator;
mod routes;
mod trees;

pub use orchestrator::{PrimeContext, PrimeOutcome, PrimeSummary, run_prime};
pub use routes::{PrimeRouteEntry, RouteOutcome, SettledResult};

/// Only the published version is ever primed.
pub(crate) const PRIME_VERSION: &str = "published";

/// Formats warmed for paginated listings.
pub(crate) const LIST_FORMATS: [&str; 3] = ["rdf", "json", "csv"];

/// Formats warmed for individual full-path lookups.
pub(crate) const FULL_PATH_FORMATS: [&str; 2] = ["rdf", "json"];
