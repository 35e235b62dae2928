use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, FailureCause};

/// A job's position in the `WAITING -> RUNNING -> (COMPLETE | FAILED)`
/// DAG (spec §3, invariant 3). No backward transitions are modeled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (`COMPLETE` or `FAILED`).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// The full status record persisted per job id under `job:{uuid}:status`.
///
/// A missing key reads back as [`StatusView::Unknown`]; this type is
/// only ever constructed for a key that exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: JobStatus,
    pub updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
}

impl StatusRecord {
    pub fn waiting() -> Self {
        StatusRecord {
            status: JobStatus::Waiting,
            updated: Utc::now(),
            started: None,
            result: None,
            cause: None,
        }
    }

    pub fn running(started_at: DateTime<Utc>) -> Self {
        StatusRecord {
            status: JobStatus::Running,
            updated: Utc::now(),
            started: Some(started_at),
            result: None,
            cause: None,
        }
    }

    pub fn complete(started: Option<DateTime<Utc>>, result: Option<Value>) -> Self {
        StatusRecord {
            status: JobStatus::Complete,
            updated: Utc::now(),
            started,
            result,
            cause: None,
        }
    }

    pub fn failed(started: Option<DateTime<Utc>>, cause: FailureCause) -> Self {
        StatusRecord {
            status: JobStatus::Failed,
            updated: Utc::now(),
            started,
            result: None,
            cause: Some(cause),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("StatusRecord always encodes")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|source| CoreError::Decode {
            what: "status record",
            source,
        })
    }
}

/// The result of reading the Status Store: either a concrete record,
/// or `Unknown` for a missing/expired key (spec §4.D).
#[derive(Clone, Debug)]
pub enum StatusView {
    Unknown,
    Known(StatusRecord),
}

impl StatusView {
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            StatusView::Unknown => None,
            StatusView::Known(r) => Some(r.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let record = StatusRecord::running(Utc::now());
        let decoded = StatusRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.status, JobStatus::Running);
        assert!(decoded.started.is_some());
    }

    #[test]
    fn complete_and_failed_are_terminal() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
