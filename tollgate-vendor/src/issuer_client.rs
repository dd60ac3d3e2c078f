//! An HTTP client for the issuer, used on a local cache miss to fetch a
//! channel's metadata and to submit settlement/closure requests.
//!
//! Grounded on the same shape as a remote-facilitator client: one shared
//! `reqwest::Client`, one base URL, and a small set of named endpoint
//! methods that each serialize a request, send it, and map the response
//! (or transport failure) into a typed error.

use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use url::Url;

use tollgate_proto::channel::ChannelSummary;
use tollgate_proto::channel::CloseChannelResponse;

/// Errors arising from talking to the issuer over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum IssuerClientError {
    /// The configured base URL (or a path joined onto it) did not parse.
    #[error("issuer URL error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The issuer could not be reached at all (connection refused, DNS
    /// failure, timeout).
    #[error("could not connect to issuer: {context}: {source}")]
    Connect {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// No channel exists at the requested id.
    #[error("channel not found at issuer")]
    ChannelNotFound,
    /// The issuer responded with an unexpected, non-2xx status.
    #[error("issuer returned {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },
    /// The issuer's response body did not deserialize as expected.
    #[error("failed to parse issuer response: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// A client for the issuer's channel-metadata and settlement endpoints.
#[derive(Debug, Clone)]
pub struct IssuerClient {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl IssuerClient {
    /// Builds a client against `base_url`, applying `timeout` to every
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError`] if `base_url` does not parse.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IssuerClientError> {
        let mut normalized = base_url.trim_end_matches('/').to_owned();
        normalized.push('/');
        let base_url = Url::parse(&normalized).map_err(|e| IssuerClientError::UrlParse {
            context: "parsing issuer base url",
            source: e,
        })?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    /// Fetches a channel's current metadata from the issuer.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError::ChannelNotFound`] if the issuer
    /// responds 404, or another variant for any other transport or
    /// protocol failure.
    pub async fn get_channel(&self, channel_id: &str) -> Result<ChannelSummary, IssuerClientError> {
        let url = self
            .base_url
            .join(&format!("issuer/channels/{channel_id}"))
            .map_err(|e| IssuerClientError::UrlParse {
                context: "building channel lookup url",
                source: e,
            })?;
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| IssuerClientError::Connect {
                context: "GET channel",
                source: e,
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IssuerClientError::ChannelNotFound);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IssuerClientError::HttpStatus {
                context: "GET channel",
                status,
                body,
            });
        }
        response.json().await.map_err(|e| IssuerClientError::JsonDeserialization {
            context: "GET channel",
            source: e,
        })
    }

    /// Submits a settlement request body (signature close, `PayWord`
    /// settle, or `PayTree` settle — whichever shape `request` serializes
    /// to) against `channel_id`'s settlement endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError`] on any transport or protocol failure.
    pub async fn post_settlement<T>(
        &self,
        channel_id: &str,
        request: &T,
    ) -> Result<CloseChannelResponse, IssuerClientError>
    where
        T: Serialize + Sync,
    {
        let url = self
            .base_url
            .join(&format!("issuer/channels/{channel_id}/settlements"))
            .map_err(|e| IssuerClientError::UrlParse {
                context: "building settlement url",
                source: e,
            })?;
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| IssuerClientError::Connect {
                context: "POST settlement",
                source: e,
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IssuerClientError::ChannelNotFound);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IssuerClientError::HttpStatus {
                context: "POST settlement",
                status,
                body,
            });
        }
        response.json().await.map_err(|e| IssuerClientError::JsonDeserialization {
            context: "POST settlement",
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn summary() -> ChannelSummary {
        ChannelSummary {
            channel_id: "abc".to_owned(),
            scheme: tollgate_proto::channel::ChannelScheme::Signature,
            client_public_key_der_b64: "client".to_owned(),
            vendor_public_key_der_b64: "vendor".to_owned(),
            amount: 100,
            balance: 0,
            is_closed: false,
            root_b64: None,
            unit_value: None,
            max_counter: None,
            created_at: "1970-01-01T00:00:00Z".to_owned(),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn get_channel_returns_summary_on_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issuer/channels/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary()))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri(), Duration::from_secs(5)).expect("builds");
        let fetched = client.get_channel("abc").await.expect("fetches");
        assert_eq!(fetched.channel_id, "abc");
    }

    #[tokio::test]
    async fn get_channel_maps_404_to_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issuer/channels/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri(), Duration::from_secs(5)).expect("builds");
        let err = client.get_channel("missing").await.expect_err("not found");
        assert!(matches!(err, IssuerClientError::ChannelNotFound));
    }

    #[tokio::test]
    async fn get_channel_maps_server_error_to_http_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issuer/channels/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri(), Duration::from_secs(5)).expect("builds");
        let err = client.get_channel("broken").await.expect_err("errors");
        assert!(matches!(err, IssuerClientError::HttpStatus { .. }));
    }
}
