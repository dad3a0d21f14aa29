// HTTP implementation of the backend gateway
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::models::{AttendanceMethod, AttendanceRecord};
use crate::settings::RollcallSettings;

use super::{
    BackendGateway, CredentialSubmission, ErrorBody, GatewayError, ManualAttendanceRequest,
    RegistrationChallenge, VerificationChallenge, VerificationChallengeRequest,
    VerificationOutcome, VerificationRequest,
};

/// JSON-over-HTTP client for the attendance backend
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    /// Create a gateway rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid gateway url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Transport(format!(
                "invalid gateway url: {base_url}"
            )));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("rollcall/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Create a gateway from the `[gateway]` settings section
    ///
    /// # Errors
    ///
    /// Returns an error if `gateway.base_url` is invalid.
    pub fn from_settings(settings: &RollcallSettings) -> Result<Self, GatewayError> {
        Self::new(&settings.gateway.base_url, settings.gateway_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL; each segment is escaped on its own
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post<B, T>(&self, segments: &[&str], body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        log::debug!("POST {url}");
        let response = self.client.post(url).json(body).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Turn non-success statuses into gateway errors, keeping the backend's
    /// message and suggestions when it sent them
    async fn check_status(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) if !error.error.is_empty() => {
                log::warn!("Backend rejected request with {code}: {}", error.error);
                Err(GatewayError::Rejected {
                    status: code,
                    message: error.error,
                    suggestions: error.suggestions,
                })
            }
            _ => {
                log::warn!("Backend answered with status {code}");
                Err(GatewayError::Status(code))
            }
        }
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn registration_challenge(
        &self,
        student_id: &str,
    ) -> Result<RegistrationChallenge, GatewayError> {
        self.post(
            &["students", student_id, "credential", "challenge"],
            &serde_json::json!({}),
        )
        .await
    }

    async fn submit_credential(
        &self,
        student_id: &str,
        credential: &CredentialSubmission,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post(
                &["students", student_id, "credential"],
                credential,
            )
            .await?;
        Ok(())
    }

    async fn verification_challenge(
        &self,
        group_id: &str,
    ) -> Result<VerificationChallenge, GatewayError> {
        self.post(
            &["attendance", "challenge"],
            &VerificationChallengeRequest {
                group_id: group_id.to_string(),
            },
        )
        .await
    }

    async fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, GatewayError> {
        self.post(&["attendance", "verify"], request).await
    }

    async fn record_manual_attendance(
        &self,
        student_id: &str,
    ) -> Result<AttendanceRecord, GatewayError> {
        self.post(
            &["students", student_id, "attendance"],
            &ManualAttendanceRequest {
                student_id: student_id.to_string(),
                method: AttendanceMethod::Manual,
            },
        )
        .await
    }
}
