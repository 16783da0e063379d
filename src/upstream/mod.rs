//! Boundary to the external collaborators: the response-producing keyword
//! API and the SPARQL metadata endpoint. Everything behind these traits is
//! out of this crate's hands; it only sees normalized request descriptors
//! going out and response envelopes coming back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::cache::ResponseEnvelope;
use crate::config::UpstreamSettings;

/// A normalized request aimed at one keyword API route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Route template, e.g. `/concepts/concept_scheme/{conceptScheme}`.
    pub resource: String,
    /// Concrete request path with parameters substituted.
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl RequestDescriptor {
    pub fn new(resource: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("producer request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Request(String),
    #[error("metadata response undecodable: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMetadata {
    pub version: String,
    pub version_name: String,
    pub version_type: String,
    pub created: String,
    pub modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptScheme {
    pub uri: String,
    pub pref_label: String,
    pub notation: String,
    pub modified: String,
    pub csv_headers: Option<String>,
}

/// Computes one route's full response, including any cache-miss work.
#[async_trait]
pub trait ResponseProducer: Send + Sync {
    async fn produce(&self, request: &RequestDescriptor) -> Result<ResponseEnvelope, ProducerError>;
}

/// Source of published-version metadata and concept-scheme details.
#[async_trait]
pub trait UpstreamMetadata: Send + Sync {
    async fn version_metadata(
        &self,
        version: &str,
    ) -> Result<Option<VersionMetadata>, MetadataError>;

    async fn concept_schemes(&self, version: &str) -> Result<Vec<ConceptScheme>, MetadataError>;
}

/// Forwards request descriptors to the keyword API over HTTP.
pub struct HttpProducer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProducer {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ProducerError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| ProducerError::Request(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl ResponseProducer for HttpProducer {
    async fn produce(&self, request: &RequestDescriptor) -> Result<ResponseEnvelope, ProducerError> {
        let url = format!("{}{}", self.base_url, request.path);
        let response = self
            .client
            .get(&url)
            .query(&request.query)
            .send()
            .await
            .map_err(|err| ProducerError::Request(err.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_owned());
            }
        }
        let body = response
            .text()
            .await
            .map_err(|err| ProducerError::Request(err.to_string()))?;

        Ok(ResponseEnvelope {
            status,
            headers,
            body,
        })
    }
}

const VERSION_METADATA_QUERY: &str = r#"
PREFIX gcmd: <https://gcmd.earthdata.nasa.gov/kms#>
PREFIX dcterms: <http://purl.org/dc/terms/>

SELECT ?versionType ?versionName ?created ?modified
WHERE {
  <https://gcmd.earthdata.nasa.gov/kms/version_metadata> a gcmd:Version ;
                  gcmd:versionName ?versionName ;
                  gcmd:versionType ?versionType ;
                  dcterms:created ?created ;
                  dcterms:modified ?modified .
}
"#;

const CONCEPT_SCHEMES_QUERY: &str = r#"
PREFIX skos: <http://www.w3.org/2004/02/skos/core#>
PREFIX gcmd: <https://gcmd.earthdata.nasa.gov/kms#>
PREFIX dcterms: <http://purl.org/dc/terms/>

SELECT ?scheme ?prefLabel ?notation ?modified ?csvHeaders
WHERE {
  ?scheme a skos:ConceptScheme ;
          skos:prefLabel ?prefLabel ;
          skos:notation ?notation ;
          dcterms:modified ?modified .
  OPTIONAL { ?scheme gcmd:csvHeaders ?csvHeaders }
}
"#;

/// Issues the two fixed metadata queries against an RDF4J SPARQL endpoint.
pub struct SparqlMetadata {
    client: reqwest::Client,
    endpoint: String,
}

impl SparqlMetadata {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| MetadataError::Request(err.to_string()))?;
        let base = settings.sparql_base_url.trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{base}/rdf4j-server/repositories/kms"),
        })
    }

    /// Scopes a query to one version's named graph by rewriting its WHERE
    /// clause into `FROM <graph> WHERE`.
    fn scope_to_version(query: &str, version: &str) -> String {
        let graph = format!("https://gcmd.earthdata.nasa.gov/kms/version/{version}");
        query.replacen("WHERE {", &format!("FROM <{graph}> WHERE {{"), 1)
    }

    async fn select(&self, query: &str, version: &str) -> Result<Vec<Value>, MetadataError> {
        let body = Self::scope_to_version(query, version);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/sparql-query")
            .header("Accept", "application/sparql-results+json")
            .body(body)
            .send()
            .await
            .map_err(|err| MetadataError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MetadataError::Request(format!("status {status}: {detail}")));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|err| MetadataError::Decode(err.to_string()))?;
        let bindings = result["results"]["bindings"]
            .as_array()
            .cloned()
            .ok_or_else(|| MetadataError::Decode("missing results.bindings".to_owned()))?;
        Ok(bindings)
    }
}

fn binding_value(binding: &Value, name: &str) -> Option<String> {
    binding[name]["value"].as_str().map(str::to_owned)
}

fn required_binding(binding: &Value, name: &str) -> Result<String, MetadataError> {
    binding_value(binding, name)
        .ok_or_else(|| MetadataError::Decode(format!("binding missing {name}")))
}

#[async_trait]
impl UpstreamMetadata for SparqlMetadata {
    async fn version_metadata(
        &self,
        version: &str,
    ) -> Result<Option<VersionMetadata>, MetadataError> {
        let bindings = self.select(VERSION_METADATA_QUERY, version).await?;
        let Some(binding) = bindings.first() else {
            return Ok(None);
        };
        Ok(Some(VersionMetadata {
            version: version.to_owned(),
            version_name: required_binding(binding, "versionName")?,
            version_type: required_binding(binding, "versionType")?,
            created: required_binding(binding, "created")?,
            modified: required_binding(binding, "modified")?,
        }))
    }

    async fn concept_schemes(&self, version: &str) -> Result<Vec<ConceptScheme>, MetadataError> {
        let bindings = self.select(CONCEPT_SCHEMES_QUERY, version).await?;
        let mut schemes = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            match (
                binding_value(binding, "scheme"),
                binding_value(binding, "prefLabel"),
                binding_value(binding, "notation"),
                binding_value(binding, "modified"),
            ) {
                (Some(uri), Some(pref_label), Some(notation), Some(modified)) => {
                    schemes.push(ConceptScheme {
                        uri,
                        pref_label,
                        notation,
                        modified,
                        csv_headers: binding_value(binding, "csvHeaders"),
                    });
                }
                _ => {
                    warn!(?binding, "skipping concept scheme with incomplete bindings");
                }
            }
        }
        Ok(schemes)
    }
}
