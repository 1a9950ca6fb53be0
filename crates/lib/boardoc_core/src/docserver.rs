//! Document server client.
//!
//! Every request body is signed with the board's shared secret and sent as
//! `{"token": <jwt>}`; the same token goes in the configured header as a
//! bearer credential. A random `shardKey` spreads requests across
//! document server shards.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::distr::{Alphanumeric, SampleString};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::settings::DocServerTarget;
use crate::transport::{RetryableTransport, TransportError};

const SHARD_KEY_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum DocServerError {
    #[error("invalid document server address: {0}")]
    Address(String),

    #[error("invalid document server header name: {0}")]
    Header(String),

    #[error("failed to sign document server request: {0}")]
    Signing(String),

    #[error("document server reported error code {0}")]
    Conversion(i64),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Conversion parameters, signed into the request token.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertRequest {
    #[serde(rename = "async")]
    pub is_async: bool,
    pub filetype: String,
    pub outputtype: String,
    /// Document key; identical keys hit the document server's cache.
    pub key: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    #[serde(default)]
    pub end_convert: bool,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub percent: i64,
    #[serde(default)]
    pub error: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionResponse {
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub version: String,
}

#[derive(Serialize)]
struct CommandPayload<'a> {
    c: &'a str,
}

#[derive(Serialize)]
struct SignedBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    c: Option<&'a str>,
    token: &'a str,
}

#[derive(Debug, Clone)]
pub struct DocServerClient {
    transport: RetryableTransport,
}

impl DocServerClient {
    pub fn new(transport: RetryableTransport) -> Self {
        Self { transport }
    }

    pub async fn get_version(
        &self,
        cancel: &CancellationToken,
        target: &DocServerTarget,
    ) -> Result<VersionResponse, DocServerError> {
        let token = sign(&CommandPayload { c: "version" }, &target.secret)?;
        let body = SignedBody {
            c: Some("version"),
            token: &token,
        };
        let response: VersionResponse = self.post(cancel, target, "command", &body, &token).await?;
        if response.error != 0 {
            warn!(address = %target.address, code = response.error, "version command failed");
            return Err(DocServerError::Conversion(response.error));
        }
        info!(address = %target.address, version = %response.version, "document server version");
        Ok(response)
    }

    pub async fn convert_file(
        &self,
        cancel: &CancellationToken,
        target: &DocServerTarget,
        request: &ConvertRequest,
    ) -> Result<ConvertResponse, DocServerError> {
        let token = sign(request, &target.secret)?;
        let body = SignedBody {
            c: None,
            token: &token,
        };
        let response: ConvertResponse =
            self.post(cancel, target, "converter", &body, &token).await?;
        if response.error != 0 {
            warn!(address = %target.address, code = response.error, "conversion failed");
            return Err(DocServerError::Conversion(response.error));
        }
        debug!(
            address = %target.address,
            end_convert = response.end_convert,
            percent = response.percent,
            "conversion response"
        );
        Ok(response)
    }

    async fn post<T>(
        &self,
        cancel: &CancellationToken,
        target: &DocServerTarget,
        path: &str,
        body: &SignedBody<'_>,
        token: &str,
    ) -> Result<T, DocServerError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = endpoint(&target.address, path)?;
        let header = HeaderName::from_bytes(target.header.trim().as_bytes())
            .map_err(|e| DocServerError::Header(e.to_string()))?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| DocServerError::Signing(e.to_string()))?;
        value.set_sensitive(true);

        let response = self
            .transport
            .send_json(cancel, |c| {
                c.post(url.clone())
                    .header(header.clone(), value.clone())
                    .json(body)
            })
            .await?;
        Ok(response)
    }
}

/// `<address>/<path>?shardKey=<random>`.
fn endpoint(address: &str, path: &str) -> Result<Url, DocServerError> {
    let base = format!("{}/{path}", address.trim().trim_end_matches('/'));
    let mut url = Url::parse(&base).map_err(|e| DocServerError::Address(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DocServerError::Address(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    let shard = Alphanumeric.sample_string(&mut rand::rng(), SHARD_KEY_LEN);
    url.query_pairs_mut().append_pair("shardKey", &shard);
    Ok(url)
}

fn sign<T: Serialize>(payload: &T, secret: &str) -> Result<String, DocServerError> {
    encode(
        &Header::new(Algorithm::HS256),
        payload,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| DocServerError::Signing(e.to_string()))
}
