use serde::{Deserialize, Serialize};
use std::fmt;

/// Response envelope shared by every backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub response: T,
}

/// Envelope of a failed call; `response` is a message string or a validation report
#[derive(Debug, Clone, Deserialize)]
pub struct FailureEnvelope {
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl FailureEnvelope {
    pub fn message(&self) -> Option<String> {
        match self.response.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Access/refresh pair issued by login and renewal
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Both halves must be present; a pair with either side blank is never stored.
    pub fn is_complete(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.refresh_token.trim().is_empty()
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// What the credential store persists: one record so both tokens change together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub issued_at: i64, // Unix timestamp
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Body of the job-creation response; the backend uses either key
#[derive(Debug, Clone, Deserialize)]
pub struct JobCreated {
    #[serde(alias = "id")]
    pub request_id: String,
}

/// Opaque identifier of a long-running job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side job status; anything other than PENDING is terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Terminal(String),
}

impl JobStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("pending") {
            JobStatus::Pending
        } else {
            JobStatus::Terminal(s)
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => "PENDING".to_string(),
            JobStatus::Terminal(s) => s,
        }
    }
}

/// Itinerary generation request as submitted by the traveler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItineraryRequest {
    pub city: String,
    pub start_date: String,
    pub end_date: String,
    pub budget: String,
    pub travelling_with: String,
    #[serde(default)]
    pub accessibility: bool,
    #[serde(default)]
    pub interested_in: Vec<String>,
}

/// Status payload of an itinerary request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItineraryRequestRecord {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CityMetaRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// City banner data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityMeta {
    pub name: String,
    pub country: String,
    pub coordinates: Coordinates,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<serde_json::Value>,
}
