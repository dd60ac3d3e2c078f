//! HTTP client for the issuer's account and channel-opening surface.

use thiserror::Error;
use url::Url;

use tollgate_proto::account::{AccountResponse, IssuerPublicKeyResponse, RegisterAccountRequest};
use tollgate_proto::channel::{ChannelSummary, OpenChannelEnvelopeRequest, OpenChannelResponse};

/// Errors arising from issuer HTTP calls, distinguishing transport failure
/// from a well-formed error response so callers can decide what to retry.
#[derive(Debug, Error)]
pub enum IssuerClientError {
    #[error("invalid issuer base url ({context})")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to reach issuer ({context})")]
    Connect {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("channel not found")]
    ChannelNotFound,
    #[error("issuer returned {status} ({context}): {body}")]
    HttpStatus {
        context: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to deserialize issuer response ({context})")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Thin wrapper over [`reqwest::Client`] for the handful of issuer endpoints
/// a client needs: registering an account, fetching the issuer's public
/// key, opening a channel, and reading a channel's current summary.
#[derive(Debug, Clone)]
pub struct IssuerClient {
    base_url: Url,
    client: reqwest::Client,
}

impl IssuerClient {
    /// # Errors
    ///
    /// Returns [`IssuerClientError::UrlParse`] if `base_url` is not a valid
    /// URL.
    pub fn new(base_url: &str) -> Result<Self, IssuerClientError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|source| IssuerClientError::UrlParse {
            context: "issuer base url",
            source,
        })?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    fn join(&self, path: &str) -> Url {
        self.base_url.join(path).expect("static relative paths are valid")
    }

    /// Registers a fresh public key with the issuer, returning its starting
    /// (zero) balance.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError::Connect`] on transport failure or
    /// [`IssuerClientError::HttpStatus`]/[`IssuerClientError::JsonDeserialization`]
    /// on a non-success or unparseable response.
    pub async fn register_account(&self, public_key_der_b64: &str) -> Result<AccountResponse, IssuerClientError> {
        let url = self.join("issuer/accounts");
        let response = self
            .client
            .post(url)
            .json(&RegisterAccountRequest {
                public_key_der_b64: public_key_der_b64.to_owned(),
            })
            .send()
            .await
            .map_err(|source| IssuerClientError::Connect {
                context: "register account",
                source,
            })?;
        Self::decode_json(response, "register account").await
    }

    /// Looks up an account's current balance by its public key.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError::Connect`] on transport failure or
    /// [`IssuerClientError::HttpStatus`]/[`IssuerClientError::JsonDeserialization`]
    /// on a non-success or unparseable response.
    pub async fn lookup_account(&self, public_key_der_b64: &str) -> Result<AccountResponse, IssuerClientError> {
        let mut url = self.join("issuer/accounts");
        url.query_pairs_mut().append_pair("public_key_der_b64", public_key_der_b64);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| IssuerClientError::Connect {
                context: "lookup account",
                source,
            })?;
        Self::decode_json(response, "lookup account").await
    }

    /// Fetches the issuer's own signing public key.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError::Connect`] on transport failure or
    /// [`IssuerClientError::HttpStatus`]/[`IssuerClientError::JsonDeserialization`]
    /// on a non-success or unparseable response.
    pub async fn issuer_public_key(&self) -> Result<IssuerPublicKeyResponse, IssuerClientError> {
        let url = self.join("issuer/keys/public");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| IssuerClientError::Connect {
                context: "fetch issuer public key",
                source,
            })?;
        Self::decode_json(response, "fetch issuer public key").await
    }

    /// Opens a channel of whatever scheme `request`'s envelope payload
    /// declares.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError::Connect`] on transport failure or
    /// [`IssuerClientError::HttpStatus`]/[`IssuerClientError::JsonDeserialization`]
    /// on a non-success or unparseable response.
    pub async fn open_channel(
        &self,
        request: &OpenChannelEnvelopeRequest,
    ) -> Result<OpenChannelResponse, IssuerClientError> {
        let url = self.join("issuer/channels");
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|source| IssuerClientError::Connect {
                context: "open channel",
                source,
            })?;
        Self::decode_json(response, "open channel").await
    }

    /// Fetches the current on-issuer summary for `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerClientError::ChannelNotFound`] if the issuer reports
    /// a 404, or the usual transport/decoding errors otherwise.
    pub async fn get_channel(&self, channel_id: &str) -> Result<ChannelSummary, IssuerClientError> {
        let url = self.join(&format!("issuer/channels/{channel_id}"));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| IssuerClientError::Connect {
                context: "fetch channel summary",
                source,
            })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IssuerClientError::ChannelNotFound);
        }
        Self::decode_json(response, "fetch channel summary").await
    }

    async fn decode_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<T, IssuerClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IssuerClientError::HttpStatus { context, status, body });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| IssuerClientError::JsonDeserialization { context, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn register_account_returns_starting_balance() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/issuer/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(AccountResponse {
                public_key_der_b64: "client-key".to_owned(),
                balance: 0,
            }))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri()).expect("builds");
        let account = client.register_account("client-key").await.expect("registers");
        assert_eq!(account.balance, 0);
    }

    #[tokio::test]
    async fn get_channel_maps_404_to_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issuer/channels/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri()).expect("builds");
        let err = client.get_channel("missing").await.expect_err("not found");
        assert!(matches!(err, IssuerClientError::ChannelNotFound));
    }

    #[tokio::test]
    async fn issuer_public_key_round_trips() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issuer/keys/public"))
            .respond_with(ResponseTemplate::new(200).set_body_json(IssuerPublicKeyResponse {
                public_key_der_b64: "issuer-key".to_owned(),
            }))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri()).expect("builds");
        let key = client.issuer_public_key().await.expect("fetches");
        assert_eq!(key.public_key_der_b64, "issuer-key");
    }

    #[tokio::test]
    async fn lookup_account_sends_public_key_as_query_param() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issuer/accounts"))
            .and(query_param("public_key_der_b64", "client-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(AccountResponse {
                public_key_der_b64: "client-key".to_owned(),
                balance: 5,
            }))
            .mount(&mock_server)
            .await;

        let client = IssuerClient::new(&mock_server.uri()).expect("builds");
        let account = client.lookup_account("client-key").await.expect("fetches");
        assert_eq!(account.balance, 5);
    }
}
