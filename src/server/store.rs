//! In-memory state behind the reference gateway
//!
//! Groups and students come from a TOML roster. Credentials, outstanding
//! challenges and attendance only live as long as the process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::codec;
use crate::credential::types::CEREMONY_TIMEOUT_MS;
use crate::gateway::{
    AllowedCredential, CredentialSubmission, RegistrationChallenge, VerificationChallenge,
    VerificationOutcome, VerificationRequest,
};
use crate::models::{
    AttendanceMethod, AttendanceRecord, AttendanceStamp, Group, ResolvedStudent, Student,
};
use crate::utils::lock;
use crate::utils::logging::LoggingHelper;

/// Bytes of entropy in every challenge
pub const CHALLENGE_LEN: usize = 32;

/// Message returned when a credential resolves to a student of another group
pub const NOT_IN_GROUP: &str = "student does not belong to this group";

const UNKNOWN_CREDENTIAL: &str = "Fingerprint not recognized. The student is not enrolled.";

const UNKNOWN_CREDENTIAL_SUGGESTIONS: [&str; 3] = [
    "Check that the student registered a fingerprint on this device",
    "Make sure the finger is clean and dry",
    "Register the fingerprint again if the problem persists",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid roster: {0}")]
    Roster(String),

    #[error("could not generate a challenge")]
    Random,
}

/// Roster file layout: `[[groups]]` tables with nested `[[groups.students]]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterFile {
    #[serde(default)]
    pub groups: Vec<RosterGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub career: Option<String>,
    #[serde(default)]
    pub students: Vec<RosterStudent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterStudent {
    pub id: String,
    pub name: String,
}

impl RosterFile {
    /// Parse a roster from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid roster.
    pub fn parse(content: &str) -> Result<Self, StoreError> {
        basic_toml::from_str(content).map_err(|e| StoreError::Roster(e.to_string()))
    }

    /// Read and parse a roster file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Roster(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }
}

/// Counts reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub groups: usize,
    pub students: usize,
    pub enrolled: usize,
}

#[derive(Debug, Clone)]
struct StudentEntry {
    name: String,
    group_id: String,
    credential: Option<CredentialSubmission>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Purpose {
    Registration(String),
    Verification(String),
}

#[derive(Debug)]
struct IssuedChallenge {
    purpose: Purpose,
    issued_at: Instant,
}

#[derive(Debug, Default)]
struct StoreInner {
    groups: Vec<Group>,
    students: HashMap<String, StudentEntry>,
    /// Student ids per group, in roster-file order
    members: HashMap<String, Vec<String>>,
    challenges: HashMap<String, IssuedChallenge>,
    attendance: HashMap<(String, String), AttendanceRecord>,
}

impl StoreInner {
    fn student(&self, id: &str) -> Result<&StudentEntry, StoreError> {
        self.students
            .get(id)
            .ok_or_else(|| StoreError::NotFound("Student not found".to_string()))
    }

    fn members<'a>(
        &'a self,
        group_id: &str,
    ) -> impl Iterator<Item = (&'a str, &'a StudentEntry)> {
        self.members
            .get(group_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.students.get(id).map(|s| (id.as_str(), s)))
    }

    fn group(&self, id: &str) -> Result<&Group, StoreError> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .ok_or_else(|| StoreError::NotFound("Group not found".to_string()))
    }

    /// Remove the newest live challenge issued for `purpose`
    fn consume(&mut self, ttl: Duration, matches: impl Fn(&Purpose) -> bool) -> bool {
        self.challenges
            .retain(|_, issued| issued.issued_at.elapsed() < ttl);
        let newest = self
            .challenges
            .iter()
            .filter(|(_, issued)| matches(&issued.purpose))
            .max_by_key(|(_, issued)| issued.issued_at)
            .map(|(challenge, _)| challenge.clone());
        newest
            .and_then(|challenge| self.challenges.remove(&challenge))
            .is_some()
    }

    /// Record attendance once per student and day; later calls return the first record
    fn record(
        &mut self,
        student_id: &str,
        method: AttendanceMethod,
        now: NaiveDateTime,
    ) -> AttendanceRecord {
        let date = now.format("%Y-%m-%d").to_string();
        self.attendance
            .entry((student_id.to_string(), date.clone()))
            .or_insert_with(|| {
                log::info!(
                    "Recorded {} attendance for {student_id} on {date}",
                    match method {
                        AttendanceMethod::Biometric => "biometric",
                        AttendanceMethod::Manual => "manual",
                    }
                );
                AttendanceRecord {
                    student_id: student_id.to_string(),
                    date: date.clone(),
                    time: now.format("%H:%M:%S").to_string(),
                    method,
                }
            })
            .clone()
    }
}

/// Thread-safe store shared by every worker of the reference gateway
pub struct GatewayStore {
    inner: Mutex<StoreInner>,
    rng: SystemRandom,
    challenge_ttl: Duration,
}

impl GatewayStore {
    /// Seed a store from a parsed roster
    ///
    /// # Errors
    ///
    /// Returns an error if a group or student id appears twice.
    pub fn from_roster(roster: RosterFile) -> Result<Self, StoreError> {
        let mut inner = StoreInner::default();
        for group in roster.groups {
            if inner.groups.iter().any(|g| g.id == group.id) {
                return Err(StoreError::Roster(format!("duplicate group id {}", group.id)));
            }
            let mut members = Vec::with_capacity(group.students.len());
            for student in &group.students {
                let entry = StudentEntry {
                    name: student.name.clone(),
                    group_id: group.id.clone(),
                    credential: None,
                };
                if inner.students.insert(student.id.clone(), entry).is_some() {
                    return Err(StoreError::Roster(format!(
                        "duplicate student id {}",
                        student.id
                    )));
                }
                members.push(student.id.clone());
            }
            inner.members.insert(group.id.clone(), members);
            inner.groups.push(Group {
                id: group.id,
                name: group.name,
                career: group.career,
                student_count: group.students.len(),
            });
        }

        Ok(Self {
            inner: Mutex::new(inner),
            rng: SystemRandom::new(),
            challenge_ttl: Duration::from_millis(u64::from(CEREMONY_TIMEOUT_MS)),
        })
    }

    /// How long an issued challenge stays usable
    #[must_use]
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let inner = lock(&self.inner);
        StoreStats {
            groups: inner.groups.len(),
            students: inner.students.len(),
            enrolled: inner
                .students
                .values()
                .filter(|s| s.credential.is_some())
                .count(),
        }
    }

    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        lock(&self.inner).groups.clone()
    }

    /// Students of a group, in the order the roster file lists them
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown group.
    pub fn students(&self, group_id: &str) -> Result<Vec<Student>, StoreError> {
        let inner = lock(&self.inner);
        inner.group(group_id)?;
        Ok(inner
            .members(group_id)
            .map(|(id, s)| Student::new(id, &s.name, s.credential.is_some()))
            .collect())
    }

    /// Issue a registration challenge for a student
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown student.
    pub fn registration_challenge(
        &self,
        student_id: &str,
    ) -> Result<RegistrationChallenge, StoreError> {
        let challenge = self.fresh_challenge()?;
        let mut inner = lock(&self.inner);
        let user_name = inner.student(student_id)?.name.clone();
        inner.challenges.insert(
            challenge.clone(),
            IssuedChallenge {
                purpose: Purpose::Registration(student_id.to_string()),
                issued_at: Instant::now(),
            },
        );
        Ok(RegistrationChallenge {
            challenge,
            user_name,
        })
    }

    /// Store a freshly registered credential, consuming the student's challenge
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown student, `Invalid` without a live
    /// registration challenge or for a malformed id, and `Conflict` when the
    /// credential belongs to someone else.
    pub fn store_credential(
        &self,
        student_id: &str,
        submission: CredentialSubmission,
    ) -> Result<(), StoreError> {
        if submission.credential_id.is_empty() || codec::decode(&submission.credential_id).is_err()
        {
            return Err(StoreError::Invalid(
                "credentialId must be base64url text".to_string(),
            ));
        }

        let mut inner = lock(&self.inner);
        inner.student(student_id)?;
        let owner = inner.students.iter().find(|(_, s)| {
            s.credential
                .as_ref()
                .is_some_and(|c| c.credential_id == submission.credential_id)
        });
        if let Some((owner, _)) = owner {
            if owner != student_id {
                return Err(StoreError::Conflict(
                    "This fingerprint is already registered to another student".to_string(),
                ));
            }
        }

        let ttl = self.challenge_ttl;
        let wanted = Purpose::Registration(student_id.to_string());
        if !inner.consume(ttl, |p| *p == wanted) {
            return Err(StoreError::Invalid(
                "No pending registration challenge for this student".to_string(),
            ));
        }

        log::info!(
            "Stored credential {} for student {student_id}",
            LoggingHelper::short_id(&submission.credential_id)
        );
        if let Some(entry) = inner.students.get_mut(student_id) {
            entry.credential = Some(submission);
        }
        Ok(())
    }

    /// Issue a verification challenge with the group's enrolled credentials
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown group.
    pub fn verification_challenge(
        &self,
        group_id: &str,
    ) -> Result<VerificationChallenge, StoreError> {
        let challenge = self.fresh_challenge()?;
        let mut inner = lock(&self.inner);
        inner.group(group_id)?;
        let allowed_credentials = inner
            .members(group_id)
            .filter_map(|(_, s)| s.credential.as_ref())
            .map(|c| AllowedCredential {
                id: c.credential_id.clone(),
            })
            .collect();
        inner.challenges.insert(
            challenge.clone(),
            IssuedChallenge {
                purpose: Purpose::Verification(group_id.to_string()),
                issued_at: Instant::now(),
            },
        );
        Ok(VerificationChallenge {
            challenge,
            allowed_credentials,
        })
    }

    /// Resolve the student owning a credential and record a biometric attendance
    ///
    /// # Errors
    ///
    /// Returns `Invalid` when no live verification challenge was issued for
    /// the request.
    pub fn verify(
        &self,
        request: &VerificationRequest,
        now: NaiveDateTime,
    ) -> Result<VerificationOutcome, StoreError> {
        let mut inner = lock(&self.inner);
        let ttl = self.challenge_ttl;
        let consumed = match &request.group_id {
            Some(group_id) => inner.consume(ttl, |p| {
                matches!(p, Purpose::Verification(g) if g == group_id)
            }),
            None => inner.consume(ttl, |p| matches!(p, Purpose::Verification(_))),
        };
        if !consumed {
            return Err(StoreError::Invalid(
                "No pending verification challenge; request a new one".to_string(),
            ));
        }

        let owner = inner
            .students
            .iter()
            .find(|(_, s)| {
                s.credential
                    .as_ref()
                    .is_some_and(|c| c.credential_id == request.credential_id)
            })
            .map(|(id, s)| (id.clone(), s.name.clone(), s.group_id.clone()));

        let Some((student_id, name, group_id)) = owner else {
            log::info!(
                "Unknown credential {}",
                LoggingHelper::short_id(&request.credential_id)
            );
            return Ok(VerificationOutcome {
                found: false,
                message: Some(UNKNOWN_CREDENTIAL.to_string()),
                suggestions: UNKNOWN_CREDENTIAL_SUGGESTIONS
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                ..VerificationOutcome::default()
            });
        };

        if request.group_id.as_ref().is_some_and(|g| *g != group_id) {
            return Ok(VerificationOutcome {
                found: false,
                message: Some(NOT_IN_GROUP.to_string()),
                ..VerificationOutcome::default()
            });
        }

        let record = inner.record(&student_id, AttendanceMethod::Biometric, now);
        Ok(VerificationOutcome {
            found: true,
            student: Some(ResolvedStudent {
                id: student_id,
                name,
                group_id: Some(group_id),
            }),
            attendance: Some(AttendanceStamp {
                date: record.date,
                time: record.time,
            }),
            ..VerificationOutcome::default()
        })
    }

    /// Record attendance taken without a fingerprint
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown student.
    pub fn record_attendance(
        &self,
        student_id: &str,
        method: AttendanceMethod,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut inner = lock(&self.inner);
        inner.student(student_id)?;
        Ok(inner.record(student_id, method, now))
    }

    /// Attendance recorded for a student, oldest first
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown student.
    pub fn attendance(&self, student_id: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let inner = lock(&self.inner);
        inner.student(student_id)?;
        let mut records: Vec<AttendanceRecord> = inner
            .attendance
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
        Ok(records)
    }

    fn fresh_challenge(&self) -> Result<String, StoreError> {
        let mut bytes = [0u8; CHALLENGE_LEN];
        self.rng.fill(&mut bytes).map_err(|_| StoreError::Random)?;
        Ok(codec::encode(&bytes))
    }
}
