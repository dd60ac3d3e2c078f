//! HTTP client for submitting streaming payments and closure requests to a
//! vendor, with automatic retry on transient failures.

use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use url::Url;

use tollgate_proto::channel::{ChannelScheme, CloseChannelResponse};
use tollgate_proto::envelope::Envelope;
use tollgate_proto::payment::PaymentReceipt;

use crate::retry::RetryMiddleware;

/// Errors arising from vendor HTTP calls.
#[derive(Debug, Error)]
pub enum VendorClientError {
    #[error("invalid vendor base url ({context})")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to reach vendor ({context})")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("vendor returned {status} ({context}): {body}")]
    HttpStatus {
        context: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to deserialize vendor response ({context})")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Submits payments and closure requests to a single vendor over HTTP,
/// retrying idempotent requests on connection errors, timeouts, and 5xx
/// responses.
#[derive(Debug, Clone)]
pub struct VendorClient {
    base_url: Url,
    client: ClientWithMiddleware,
}

impl VendorClient {
    /// # Errors
    ///
    /// Returns [`VendorClientError::UrlParse`] if `base_url` is not a valid
    /// URL.
    pub fn new(base_url: &str, max_retries: u32) -> Result<Self, VendorClientError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|source| VendorClientError::UrlParse {
            context: "vendor base url",
            source,
        })?;
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryMiddleware::new(max_retries, Duration::from_millis(200)))
            .build();
        Ok(Self { base_url, client })
    }

    fn join(&self, path: &str) -> Url {
        self.base_url.join(path).expect("static relative paths are valid")
    }

    /// Submits one streaming payment envelope for `scheme` on `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VendorClientError::Http`] on transport failure (after
    /// exhausting retries) or
    /// [`VendorClientError::HttpStatus`]/[`VendorClientError::JsonDeserialization`]
    /// on a non-success or unparseable response.
    pub async fn submit_payment(
        &self,
        scheme: ChannelScheme,
        channel_id: &str,
        envelope: &Envelope,
    ) -> Result<PaymentReceipt, VendorClientError> {
        let path = format!("vendor/channels/{}/{channel_id}/payments", scheme.path_segment());
        let url = self.join(&path);
        let response = self
            .client
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|source| VendorClientError::Http {
                context: "submit payment",
                source,
            })?;
        Self::decode_json(response, "submit payment").await
    }

    /// Requests that the vendor settle the latest accepted payment on
    /// `channel_id` with the issuer.
    ///
    /// # Errors
    ///
    /// Returns [`VendorClientError::Http`] on transport failure (after
    /// exhausting retries) or
    /// [`VendorClientError::HttpStatus`]/[`VendorClientError::JsonDeserialization`]
    /// on a non-success or unparseable response.
    pub async fn request_closure(
        &self,
        scheme: ChannelScheme,
        channel_id: &str,
    ) -> Result<CloseChannelResponse, VendorClientError> {
        let path = format!("vendor/channels/{}/{channel_id}/closure-requests", scheme.path_segment());
        let url = self.join(&path);
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|source| VendorClientError::Http {
                context: "request closure",
                source,
            })?;
        Self::decode_json(response, "request closure").await
    }

    async fn decode_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<T, VendorClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorClientError::HttpStatus { context, status, body });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| VendorClientError::JsonDeserialization { context, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn receipt() -> PaymentReceipt {
        PaymentReceipt::Signature {
            channel_id: "chan-1".to_owned(),
            cumulative_owed_amount: 250,
            payload_b64: "payload".to_owned(),
            signature_b64: "signature".to_owned(),
            created_at: "1970-01-01T00:00:00Z".to_owned(),
        }
    }

    #[tokio::test]
    async fn submit_payment_posts_to_the_scheme_specific_path() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vendor/channels/signature/chan-1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(receipt()))
            .mount(&mock_server)
            .await;

        let client = VendorClient::new(&mock_server.uri(), 2).expect("builds");
        let envelope = Envelope::new("payload".to_owned(), "signature".to_owned());
        let result = client
            .submit_payment(ChannelScheme::Signature, "chan-1", &envelope)
            .await
            .expect("accepted");
        assert!(matches!(result, PaymentReceipt::Signature { cumulative_owed_amount: 250, .. }));
    }

    #[tokio::test]
    async fn submit_payment_retries_once_on_server_error_then_succeeds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vendor/channels/payword/chan-2/payments"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/vendor/channels/payword/chan-2/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(PaymentReceipt::Payword {
                channel_id: "chan-2".to_owned(),
                k: 3,
                token_b64: "token".to_owned(),
                created_at: "1970-01-01T00:00:00Z".to_owned(),
            }))
            .mount(&mock_server)
            .await;

        let client = VendorClient::new(&mock_server.uri(), 3).expect("builds");
        let envelope = Envelope::new("payload".to_owned(), "signature".to_owned());
        let result = client
            .submit_payment(ChannelScheme::Payword, "chan-2", &envelope)
            .await
            .expect("eventually accepted");
        assert!(matches!(result, PaymentReceipt::Payword { k: 3, .. }));
    }

    #[tokio::test]
    async fn request_closure_posts_to_the_scheme_specific_path() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vendor/channels/paytree/chan-3/closure-requests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(CloseChannelResponse {
                channel_id: "chan-3".to_owned(),
                client_balance: 10,
                vendor_balance: 90,
            }))
            .mount(&mock_server)
            .await;

        let client = VendorClient::new(&mock_server.uri(), 2).expect("builds");
        let closure = client
            .request_closure(ChannelScheme::Paytree, "chan-3")
            .await
            .expect("closes");
        assert_eq!(closure.vendor_balance, 90);
    }
}
