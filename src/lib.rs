//! Response cache and scheduled cache-priming job for a keyword metadata API.
//!
//! The keyword API itself (SPARQL querying, RDF/JSON serialization, request
//! routing) lives upstream; this crate owns the Redis-backed response cache
//! in front of it and the job that re-warms hot routes whenever the published
//! keyword version changes.

pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod prime;
pub mod telemetry;
pub mod upstream;
