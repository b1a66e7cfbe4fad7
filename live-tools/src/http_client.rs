use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Bytes, to_bytes};
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::Serialize;
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::plugin::{PluginError, PluginResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

pub(crate) fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder().build::<_, Body>(connector)
}

/// Checks that `input` is an absolute http(s) URL and trims surrounding space.
pub(crate) fn sanitize_endpoint(input: &str, service: &str) -> PluginResult<String> {
    let endpoint = input.trim().to_owned();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(PluginError::configuration(format!(
            "{service} endpoint must start with http:// or https://"
        )));
    }
    endpoint.parse::<Uri>().map_err(|err| {
        PluginError::configuration(format!("invalid {service} endpoint: {err}"))
    })?;
    Ok(endpoint)
}

/// POSTs `payload` as JSON and returns the body of a successful response.
pub(crate) async fn post_json<T>(
    client: &HyperClient,
    endpoint: &str,
    authorization: Option<&str>,
    payload: &T,
    deadline: Duration,
    service: &str,
) -> PluginResult<Bytes>
where
    T: Serialize + ?Sized,
{
    let uri = sanitize_endpoint(endpoint, service)?
        .parse::<Uri>()
        .map_err(|err| PluginError::configuration(format!("invalid {service} endpoint: {err}")))?;

    let body = serde_json::to_vec(payload).map_err(|err| {
        PluginError::execution(format!("failed to encode {service} request: {err}"))
    })?;

    let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    let req = builder
        .body(Body::from(body))
        .map_err(|err| PluginError::transport(format!("failed to build {service} request: {err}")))?;

    let response = timeout(deadline, client.request(req))
        .await
        .map_err(|_| PluginError::transport(format!("{service} request timed out")))?
        .map_err(|err| PluginError::transport(format!("{service} request failed: {err}")))?;

    let status = response.status();
    let bytes = to_bytes(response.into_body()).await.map_err(|err| {
        PluginError::transport(format!("failed to read {service} response: {err}"))
    })?;

    if !status.is_success() {
        let reason = String::from_utf8_lossy(&bytes).to_string();
        return Err(PluginError::response(format!(
            "{service} returned {status}: {reason}"
        )));
    }

    Ok(bytes)
}
