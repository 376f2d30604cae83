//! HTTP client for the remote key-value store (Firebase Realtime Database
//! REST or anything speaking the same contract).
//!
//! Reads return the whole keyed listing under the configured resource;
//! writes `POST` one record to the same resource.  Transport and status
//! failures are turned into [`FetchError`] / [`WriteError`] values so that
//! callers can report them without ever tearing down their loop.

use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::record::{RawRecord, SensorRecord};

/// Resource path appended to the base URL when none is configured.
pub const DEFAULT_RESOURCE: &str = "sensors";

/// Per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Longest slice of a response body kept in an error for diagnostics.
const MAX_BODY_IN_ERROR: usize = 300;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A read that did not produce a listing.
///
/// `status` is the HTTP status when the store answered with a non-success
/// code, and `None` for transport failures or an unusable body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed ({}): {message}", describe_status(.status))]
pub struct FetchError {
    pub status: Option<u16>,
    pub message: String,
}

/// A write the store did not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("write failed ({}): {body}", describe_status(.status))]
pub struct WriteError {
    pub status: Option<u16>,
    pub body: String,
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "transport".to_string(),
    }
}

fn transport_message(e: reqwest::Error) -> String {
    // The URL may carry the credential as a query parameter.
    e.without_url().to_string()
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_BODY_IN_ERROR).collect()
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// How the credential travels with each request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialTransport {
    /// `?auth=<token>`, the Firebase database-secret convention.  The token
    /// ends up in proxy and server access logs.
    #[default]
    Query,
    /// `Authorization: Bearer <token>`.
    Bearer,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    transport: CredentialTransport,
}

impl Credential {
    pub fn new(token: impl Into<String>, transport: CredentialTransport) -> Self {
        Self {
            token: token.into(),
            transport,
        }
    }

    pub fn transport(&self) -> CredentialTransport {
        self.transport
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("transport", &self.transport)
            .finish()
    }
}

/// Where and how to reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub base_url: String,
    pub resource: String,
    pub credential: Option<Credential>,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            resource: DEFAULT_RESOURCE.to_string(),
            credential: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full resource URL, without the credential.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resource.trim_start_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
    pub body: String,
}

impl Ack {
    /// Key the store assigned to the new record (Firebase answers
    /// `{"name": "<key>"}`), if the body carries one.
    pub fn key(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        value.get("name")?.as_str().map(str::to_owned)
    }
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: Client,
    endpoint: Endpoint,
}

impl StoreClient {
    pub fn new(endpoint: Endpoint) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(endpoint.timeout).build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let req = self.http.request(method, self.endpoint.url());
        match &self.endpoint.credential {
            Some(c) => match c.transport {
                CredentialTransport::Query => req.query(&[("auth", c.token.as_str())]),
                CredentialTransport::Bearer => req.bearer_auth(&c.token),
            },
            None => req,
        }
    }

    /// Fetch every record under the resource as `(store key, record)`
    /// pairs.  A `null` or empty body means "no data yet".
    pub async fn read(&self) -> Result<Vec<(String, RawRecord)>, FetchError> {
        let resp = self
            .request(Method::GET)
            .send()
            .await
            .map_err(|e| FetchError {
                status: None,
                message: transport_message(e),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| FetchError {
            status: None,
            message: transport_message(e),
        })?;

        if !status.is_success() {
            return Err(FetchError {
                status: Some(status.as_u16()),
                message: truncate_body(&body),
            });
        }

        let records = parse_listing(&body)?;
        tracing::debug!(records = records.len(), "store read");
        Ok(records)
    }

    /// `POST` one record.  Any 2xx status is success.
    pub async fn write(&self, record: &SensorRecord) -> Result<Ack, WriteError> {
        let resp = self
            .request(Method::POST)
            .json(record)
            .send()
            .await
            .map_err(|e| WriteError {
                status: None,
                body: transport_message(e),
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        if (200..300).contains(&status) {
            Ok(Ack { status, body })
        } else {
            Err(WriteError {
                status: Some(status),
                body: truncate_body(&body),
            })
        }
    }
}

/// Split a listing body into keyed records.
///
/// The store answers with an object keyed by record id.  Firebase turns a
/// listing whose keys are all small integers into a (possibly sparse) JSON
/// array, so arrays are accepted too, keyed by index with holes skipped.
fn parse_listing(body: &str) -> Result<Vec<(String, RawRecord)>, FetchError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(body).map_err(|e| FetchError {
        status: None,
        message: format!("invalid JSON body: {e}"),
    })?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, RawRecord::from_value(v)))
            .collect()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), RawRecord::from_value(v)))
            .collect()),
        other => Err(FetchError {
            status: None,
            message: format!("expected an object keyed by record id, got {other}"),
        }),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
