//! HTTP implementations of the issuing and device collaborators.
//!
//! No retries: every failure is reported to the caller with its status. Each
//! request carries the bearer credential and a per-request timeout.

use async_trait::async_trait;
use portcullis_core::ApiConfig;
use portcullis_identity::{
    AuthCredential, Certificate, CertificateIssuer, IdentityError, IdentityResult, IssuerError,
    VerificationChallenge,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;
use crate::executor::{DeviceExecutor, ExecutionReceipt};

/// Media type of a compact signed operation.
pub const JWT_CONTENT_TYPE: &str = "application/jwt";

/// Body of the step-up response.
#[derive(Debug, Deserialize)]
struct StepUpResponse {
    #[serde(default)]
    method: Option<String>,
}

/// Client for the door-access REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    request_timeout: Duration,
    operation_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "cannot be a base".to_string(),
            });
        }

        let http = Client::builder()
            .timeout(config.request_timeout().max(config.operation_timeout()))
            .build()?;

        Ok(Self {
            base_url,
            http,
            request_timeout: config.request_timeout(),
            operation_timeout: config.operation_timeout(),
        })
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_issuer(
        &self,
        segments: &[&str],
        credential: &AuthCredential,
        body: serde_json::Value,
    ) -> Result<Response, IssuerError> {
        let url = self.endpoint(segments);
        debug!(url = %url, "POST");

        let response = self
            .http
            .post(url)
            .bearer_auth(credential.expose())
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(issuer_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::LOCKED => IssuerError::StepUpRequired,
            StatusCode::TOO_MANY_REQUESTS => IssuerError::RateLimited,
            other => IssuerError::Rejected {
                status: other.as_u16(),
                body,
            },
        })
    }

    async fn certificate_from(response: Response) -> Result<Certificate, IssuerError> {
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| IssuerError::InvalidResponse(e.to_string()))?;
        Certificate::from_payload(raw).map_err(IssuerError::InvalidResponse)
    }
}

fn issuer_transport(err: reqwest::Error) -> IssuerError {
    if err.is_timeout() {
        IssuerError::Timeout
    } else {
        IssuerError::Transport(err.to_string())
    }
}

#[async_trait]
impl CertificateIssuer for ApiClient {
    async fn request_certificate(
        &self,
        credential: &AuthCredential,
        ephemeral_key: &str,
    ) -> Result<Certificate, IssuerError> {
        let response = self
            .post_issuer(
                &["auth", "certificate"],
                credential,
                json!({ "ephemeralKey": ephemeral_key }),
            )
            .await?;
        Self::certificate_from(response).await
    }

    async fn request_step_up(
        &self,
        credential: &AuthCredential,
        ephemeral_key: &str,
    ) -> Result<VerificationChallenge, IssuerError> {
        let response = self
            .post_issuer(
                &["auth", "certificate", "verify"],
                credential,
                json!({ "ephemeralKey": ephemeral_key }),
            )
            .await?;

        let body: StepUpResponse = response
            .json()
            .await
            .map_err(|e| IssuerError::InvalidResponse(e.to_string()))?;
        match body.method {
            Some(method) if !method.trim().is_empty() => Ok(VerificationChallenge::new(method)),
            _ => Err(IssuerError::InvalidResponse(
                "step-up response has no method".to_string(),
            )),
        }
    }

    async fn check_verification(
        &self,
        credential: &AuthCredential,
        verification_signature: &str,
    ) -> Result<Certificate, IssuerError> {
        let response = self
            .post_issuer(
                &["auth", "certificate", "check"],
                credential,
                json!({ "verificationSignature": verification_signature }),
            )
            .await?;
        Self::certificate_from(response).await
    }
}

#[async_trait]
impl DeviceExecutor for ApiClient {
    async fn execute(
        &self,
        credential: &AuthCredential,
        device_id: &str,
        token: &str,
    ) -> IdentityResult<ExecutionReceipt> {
        let url = self.endpoint(&["device", device_id, "execute"]);
        debug!(url = %url, "POST");

        let response = self
            .http
            .post(url)
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, JWT_CONTENT_TYPE)
            .timeout(self.operation_timeout)
            .body(token.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IdentityError::Timeout {
                        operation: "device operation",
                        after_ms: self.operation_timeout.as_millis() as u64,
                    }
                } else {
                    IdentityError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IdentityError::DeviceRejected {
                status: status.as_u16(),
                reason: text,
            });
        }

        Ok(ExecutionReceipt {
            device_id: device_id.to_string(),
            status: status.as_u16(),
            body: serde_json::from_str(&text).ok(),
        })
    }
}
