//! Mock objects and fake implementations for testing
//!
//! Scripted stand-ins for the three ports the controllers depend on: the
//! platform authenticator, the backend gateway and the confirmation prompt.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::confirm::{ConfirmationRequest, Confirmer};
use crate::credential::codec;
use crate::credential::{
    Assertion, AttestedCredential, CreationOptions, PlatformAuthenticator, PlatformCapabilities,
    PlatformError, PlatformErrorKind, RequestOptions,
};
use crate::gateway::{
    AllowedCredential, BackendGateway, CredentialSubmission, GatewayError, RegistrationChallenge,
    VerificationChallenge, VerificationOutcome, VerificationRequest,
};
use crate::models::{AttendanceMethod, AttendanceRecord, AttendanceStamp, ResolvedStudent};
use crate::server::store::NOT_IN_GROUP;
use crate::utils::lock;

use super::constants::{TEST_DATE, TEST_GROUP_ID, TEST_TIME};

/// What the scripted platform does for the next ceremony
#[derive(Debug, Clone)]
pub enum ScriptedCeremony {
    /// Complete a registration with this credential
    Register {
        raw_id: Vec<u8>,
        public_key: Option<Vec<u8>>,
    },
    /// Complete a verification with this credential
    Assert { raw_id: Vec<u8> },
    /// Finish without producing anything
    Empty,
    /// Never answer
    Hang,
    /// The user dismissed the prompt
    Cancel,
    /// Fail with a specific platform error
    Fail(PlatformError),
}

/// Holds a scripted ceremony until released
pub struct Gate(Arc<Notify>);

impl Gate {
    pub fn release(self) {
        self.0.notify_one();
    }
}

struct Step {
    ceremony: ScriptedCeremony,
    gate: Option<Arc<Notify>>,
}

/// Platform authenticator that plays back queued ceremonies.
/// An empty queue behaves like a cancelled prompt.
pub struct ScriptedAuthenticator {
    capabilities: PlatformCapabilities,
    probe: Result<bool, PlatformError>,
    queue: Mutex<VecDeque<Step>>,
    ceremonies: AtomicUsize,
    pending: Notify,
    last_creation: Mutex<Option<CreationOptions>>,
    last_request: Mutex<Option<RequestOptions>>,
}

impl Default for ScriptedAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAuthenticator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: PlatformCapabilities::full(),
            probe: Ok(true),
            queue: Mutex::new(VecDeque::new()),
            ceremonies: AtomicUsize::new(0),
            pending: Notify::new(),
            last_creation: Mutex::new(None),
            last_request: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Result<bool, PlatformError>) -> Self {
        self.probe = probe;
        self
    }

    pub fn push(&self, ceremony: ScriptedCeremony) {
        lock(&self.queue).push_back(Step {
            ceremony,
            gate: None,
        });
    }

    /// Queue a ceremony that waits for [`Gate::release`] before answering
    #[must_use]
    pub fn push_gated(&self, ceremony: ScriptedCeremony) -> Gate {
        let gate = Arc::new(Notify::new());
        lock(&self.queue).push_back(Step {
            ceremony,
            gate: Some(Arc::clone(&gate)),
        });
        Gate(gate)
    }

    /// Resolve once a gated ceremony is waiting for its release
    pub async fn wait_for_pending(&self) {
        self.pending.notified().await;
    }

    /// Ceremonies that reached the platform
    #[must_use]
    pub fn ceremony_count(&self) -> usize {
        self.ceremonies.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_creation_options(&self) -> Option<CreationOptions> {
        lock(&self.last_creation).clone()
    }

    #[must_use]
    pub fn last_request_options(&self) -> Option<RequestOptions> {
        lock(&self.last_request).clone()
    }

    async fn next_step(&self) -> ScriptedCeremony {
        self.ceremonies.fetch_add(1, Ordering::SeqCst);
        let step = lock(&self.queue).pop_front();
        let Some(step) = step else {
            return ScriptedCeremony::Cancel;
        };
        if let Some(gate) = step.gate {
            self.pending.notify_one();
            gate.notified().await;
        }
        step.ceremony
    }
}

fn cancelled() -> PlatformError {
    PlatformError::new(
        PlatformErrorKind::NotAllowed,
        "The operation either timed out or was not allowed",
    )
}

fn mismatched(expected: &str) -> PlatformError {
    PlatformError::new(
        PlatformErrorKind::Other("UnknownError".to_string()),
        &format!("scripted ceremony is not a {expected}"),
    )
}

#[async_trait]
impl PlatformAuthenticator for ScriptedAuthenticator {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    async fn is_user_verifying_platform_authenticator_available(
        &self,
    ) -> Result<bool, PlatformError> {
        self.probe.clone()
    }

    async fn create(
        &self,
        options: &CreationOptions,
    ) -> Result<Option<AttestedCredential>, PlatformError> {
        *lock(&self.last_creation) = Some(options.clone());
        match self.next_step().await {
            ScriptedCeremony::Register { raw_id, public_key } => Ok(Some(AttestedCredential {
                raw_id,
                public_key,
                attestation_object: b"scripted-attestation".to_vec(),
                client_data_json: br#"{"type":"webauthn.create"}"#.to_vec(),
            })),
            ScriptedCeremony::Assert { .. } => Err(mismatched("registration")),
            ScriptedCeremony::Empty => Ok(None),
            ScriptedCeremony::Hang => std::future::pending().await,
            ScriptedCeremony::Cancel => Err(cancelled()),
            ScriptedCeremony::Fail(e) => Err(e),
        }
    }

    async fn get(&self, options: &RequestOptions) -> Result<Option<Assertion>, PlatformError> {
        *lock(&self.last_request) = Some(options.clone());
        match self.next_step().await {
            ScriptedCeremony::Assert { raw_id } => Ok(Some(Assertion {
                raw_id,
                authenticator_data: vec![0; 37],
                client_data_json: br#"{"type":"webauthn.get"}"#.to_vec(),
                signature: b"scripted-signature".to_vec(),
                user_handle: None,
            })),
            ScriptedCeremony::Register { .. } => Err(mismatched("verification")),
            ScriptedCeremony::Empty => Ok(None),
            ScriptedCeremony::Hang => std::future::pending().await,
            ScriptedCeremony::Cancel => Err(cancelled()),
            ScriptedCeremony::Fail(e) => Err(e),
        }
    }
}

#[derive(Default)]
struct GatewayState {
    calls: usize,
    outcome: VerificationOutcome,
    enrolled: Vec<String>,
    verifications: Vec<VerificationRequest>,
    submitted: Vec<(String, CredentialSubmission)>,
    manual: Vec<String>,
    challenge_failure: Option<GatewayError>,
    verification_failure: Option<GatewayError>,
    manual_failure: Option<GatewayError>,
}

/// In-memory backend with a fixed verification answer and one-shot failures
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every verification resolves to this student in the test group
    pub fn resolve_as(&self, id: &str, name: &str) {
        lock(&self.state).outcome = VerificationOutcome {
            found: true,
            student: Some(ResolvedStudent {
                id: id.to_string(),
                name: name.to_string(),
                group_id: Some(TEST_GROUP_ID.to_string()),
            }),
            attendance: Some(AttendanceStamp {
                date: TEST_DATE.to_string(),
                time: TEST_TIME.to_string(),
            }),
            ..VerificationOutcome::default()
        };
    }

    /// Every verification misses, with these suggestions
    pub fn resolve_nobody(&self, suggestions: &[&str]) {
        lock(&self.state).outcome = VerificationOutcome {
            found: false,
            suggestions: suggestions.iter().map(ToString::to_string).collect(),
            ..VerificationOutcome::default()
        };
    }

    /// Every verification resolves a student of some other group
    pub fn resolve_outside_group(&self) {
        lock(&self.state).outcome = VerificationOutcome {
            found: false,
            message: Some(NOT_IN_GROUP.to_string()),
            ..VerificationOutcome::default()
        };
    }

    /// Credential ids returned with every verification challenge
    pub fn enroll_credentials(&self, ids: &[&str]) {
        lock(&self.state).enrolled = ids.iter().map(ToString::to_string).collect();
    }

    /// Fail the next challenge request (registration or verification)
    pub fn fail_challenge(&self, error: GatewayError) {
        lock(&self.state).challenge_failure = Some(error);
    }

    /// Fail the next verification submission
    pub fn fail_verification(&self, error: GatewayError) {
        lock(&self.state).verification_failure = Some(error);
    }

    /// Fail the next manual attendance
    pub fn fail_manual(&self, error: GatewayError) {
        lock(&self.state).manual_failure = Some(error);
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls
    }

    #[must_use]
    pub fn verifications(&self) -> Vec<VerificationRequest> {
        lock(&self.state).verifications.clone()
    }

    #[must_use]
    pub fn submitted_credentials(&self) -> Vec<(String, CredentialSubmission)> {
        lock(&self.state).submitted.clone()
    }

    /// Student ids that got a manual attendance
    #[must_use]
    pub fn manual_records(&self) -> Vec<String> {
        lock(&self.state).manual.clone()
    }
}

#[async_trait]
impl BackendGateway for MockGateway {
    async fn registration_challenge(
        &self,
        student_id: &str,
    ) -> Result<RegistrationChallenge, GatewayError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        if let Some(error) = state.challenge_failure.take() {
            return Err(error);
        }
        Ok(RegistrationChallenge {
            challenge: codec::encode(b"registration-challenge"),
            user_name: student_id.to_string(),
        })
    }

    async fn submit_credential(
        &self,
        student_id: &str,
        credential: &CredentialSubmission,
    ) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state
            .submitted
            .push((student_id.to_string(), credential.clone()));
        Ok(())
    }

    async fn verification_challenge(
        &self,
        _group_id: &str,
    ) -> Result<VerificationChallenge, GatewayError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        if let Some(error) = state.challenge_failure.take() {
            return Err(error);
        }
        Ok(VerificationChallenge {
            challenge: codec::encode(b"verification-challenge"),
            allowed_credentials: state
                .enrolled
                .iter()
                .map(|id| AllowedCredential { id: id.clone() })
                .collect(),
        })
    }

    async fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, GatewayError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        state.verifications.push(request.clone());
        if let Some(error) = state.verification_failure.take() {
            return Err(error);
        }
        Ok(state.outcome.clone())
    }

    async fn record_manual_attendance(
        &self,
        student_id: &str,
    ) -> Result<AttendanceRecord, GatewayError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        if let Some(error) = state.manual_failure.take() {
            return Err(error);
        }
        state.manual.push(student_id.to_string());
        Ok(AttendanceRecord {
            student_id: student_id.to_string(),
            date: TEST_DATE.to_string(),
            time: TEST_TIME.to_string(),
            method: AttendanceMethod::Manual,
        })
    }
}

/// Confirmation prompt with a fixed answer that remembers what it was asked
pub struct ScriptedConfirmer {
    answer: bool,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl ScriptedConfirmer {
    #[must_use]
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        lock(&self.requests).push(request.clone());
        self.answer
    }
}
