//! Web search plugin.

use std::sync::Arc;
use std::time::Duration;
use std::{env, fmt};

use async_trait::async_trait;
use live_primitives::{Declarations, FunctionDeclaration, ParameterSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::http_client::{HyperClient, build_https_client, post_json, sanitize_endpoint};
use crate::plugin::{Arguments, PluginError, PluginResult, ToolPlugin};

/// Operation name advertised to the model.
pub const OPERATION: &str = "web_search";

/// Environment variable holding the search endpoint.
pub const SEARCH_API_URL_ENV: &str = "SEARCH_API_URL";
/// Environment variable holding the optional search API key.
pub const SEARCH_API_KEY_ENV: &str = "SEARCH_API_KEY";

/// Upper bound accepted for `max_results`.
pub const MAX_RESULTS_LIMIT: u64 = 10;

const SERVICE: &str = "search backend";

/// Configuration for the search plugin.
#[derive(Clone)]
pub struct SearchConfig {
    endpoint: Option<String>,
    api_key: Option<String>,
    max_results: u64,
    timeout: Duration,
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key_set", &self.api_key.is_some())
            .field("max_results", &self.max_results)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchConfig {
    /// Creates a configuration without an endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            max_results: 5,
            timeout: Duration::from_secs(15),
        }
    }

    /// Loads the endpoint and API key from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::new();
        cfg.endpoint = env::var(SEARCH_API_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        cfg.api_key = env::var(SEARCH_API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        cfg
    }

    /// Overrides the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Configuration`] if the URL is not an absolute
    /// http(s) URL.
    pub fn with_endpoint(mut self, url: impl AsRef<str>) -> PluginResult<Self> {
        self.endpoint = Some(sanitize_endpoint(url.as_ref(), SERVICE)?);
        Ok(self)
    }

    /// Supplies an API key sent as a bearer token.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the default number of results, clamped to `1..=10`.
    #[must_use]
    pub fn with_max_results(mut self, max_results: u64) -> Self {
        self.max_results = max_results.clamp(1, MAX_RESULTS_LIMIT);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One search result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// Short excerpt.
    #[serde(default, alias = "content")]
    pub snippet: String,
}

/// Source of search results.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Runs `query`, returning at most `max_results` hits.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the backend is misconfigured or the
    /// request fails.
    async fn search(&self, query: &str, max_results: u64) -> PluginResult<Vec<SearchHit>>;
}

/// Backend that POSTs queries to a JSON search endpoint.
pub struct HttpSearchBackend {
    client: HyperClient,
    endpoint: Option<String>,
    authorization: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for HttpSearchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSearchBackend")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpSearchBackend {
    /// Creates a backend for the endpoint named in `config`.
    #[must_use]
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: build_https_client(),
            endpoint: config.endpoint.clone(),
            authorization: config.api_key.as_ref().map(|key| format!("Bearer {key}")),
            timeout: config.timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, query: &str, max_results: u64) -> PluginResult<Vec<SearchHit>> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            PluginError::configuration(format!(
                "search endpoint is missing; set {SEARCH_API_URL_ENV}"
            ))
        })?;

        let bytes = post_json(
            &self.client,
            endpoint,
            self.authorization.as_deref(),
            &SearchRequest { query, max_results },
            self.timeout,
            SERVICE,
        )
        .await?;

        let response: SearchResponse = serde_json::from_slice(&bytes).map_err(|err| {
            PluginError::response(format!("failed to decode search response: {err}"))
        })?;
        Ok(response.results)
    }
}

/// Plugin answering `web_search` calls.
pub struct SearchPlugin {
    default_max_results: u64,
    backend: Arc<dyn SearchBackend>,
}

impl fmt::Debug for SearchPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchPlugin")
            .field("default_max_results", &self.default_max_results)
            .finish_non_exhaustive()
    }
}

impl SearchPlugin {
    /// Creates the plugin using the HTTP backend.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        let backend = Arc::new(HttpSearchBackend::new(&config));
        Self::with_backend(&config, backend)
    }

    /// Creates the plugin with a custom backend.
    #[must_use]
    pub fn with_backend(config: &SearchConfig, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            default_max_results: config.max_results,
            backend,
        }
    }
}

#[async_trait]
impl ToolPlugin for SearchPlugin {
    fn describe(&self) -> PluginResult<Declarations> {
        let declaration = FunctionDeclaration::builder(OPERATION)
            .description("Search the web and return the most relevant pages with short excerpts.")
            .parameters(
                ParameterSchema::object()
                    .required_property(
                        "query",
                        json!({ "type": "string", "description": "Search terms" }),
                    )
                    .property(
                        "max_results",
                        json!({
                            "type": "integer",
                            "description": "Number of results to return (1-10)"
                        }),
                    ),
            )
            .build()
            .map_err(|err| PluginError::describe(err.to_string()))?;
        Ok(declaration.into())
    }

    async fn execute(&self, args: Arguments) -> PluginResult<Value> {
        let query = args.require_str("query")?.trim();
        let max_results = match args.optional_u64("max_results")? {
            Some(n) if (1..=MAX_RESULTS_LIMIT).contains(&n) => n,
            Some(n) => {
                return Err(PluginError::invalid_argument(
                    "max_results",
                    format!("must be between 1 and {MAX_RESULTS_LIMIT}, got {n}"),
                ));
            }
            None => self.default_max_results,
        };

        let mut results = self.backend.search(query, max_results).await?;
        results.truncate(usize::try_from(max_results).unwrap_or(usize::MAX));

        Ok(json!({
            "query": query,
            "results": results,
        }))
    }
}
