use std::fmt;

/// Errors shared across the worker runtime's crates.
///
/// Mirrors the shape of `apalis_core::error::Error`: a small set of
/// named variants plus a catch-all for source errors from collaborator
/// code (the job class resolver, event hooks).
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// The backing payload or status record could not be decoded.
    #[error("failed to decode {what}: {source}")]
    Decode {
        /// What was being decoded, for log context.
        what: &'static str,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A worker identity string did not parse as `host:pid:queues`.
    #[error("malformed worker identity {0:?}")]
    MalformedIdentity(String),

    /// The job class resolver has no entry for the requested class name.
    #[error("no job class registered for {0:?}")]
    UnknownJobClass(String),

    /// A job's `perform` raised an error; carries a human-readable cause.
    #[error("{0}")]
    JobFailed(FailureCause),

    /// Propagated from an external collaborator (event hook, resolver).
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Structured description of why a job ended in `FAILED`.
///
/// Stored verbatim in the Status Store and appended to the `failed`
/// list (spec §6, §7).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FailureCause {
    /// Exception/error class name, or a synthetic one for dirty exits.
    pub class: String,
    /// Human-readable message.
    pub message: String,
    /// Stack-like trace, when available. Empty for dirty exits.
    #[serde(default)]
    pub backtrace: Vec<String>,
}

impl FailureCause {
    /// Build a failure cause for an abnormal child exit (killed by a
    /// signal or otherwise not a normal `exit()`).
    pub fn dirty_exit() -> Self {
        FailureCause {
            class: "Resque::DirtyExit".to_string(),
            message: "Job exited abnormally".to_string(),
            backtrace: Vec::new(),
        }
    }

    /// Build a failure cause for a child that exited normally with a
    /// nonzero status code.
    pub fn exit_code(code: i32) -> Self {
        FailureCause {
            class: "Resque::DirtyExit".to_string(),
            message: format!("Job exited with exit code {code}"),
            backtrace: Vec::new(),
        }
    }

    /// Build a failure cause for a worker that vanished while holding
    /// a job (no further detail is available).
    pub fn orphaned_worker() -> Self {
        FailureCause {
            class: "Resque::DirtyExit".to_string(),
            message: "dirty exit (no message)".to_string(),
            backtrace: Vec::new(),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}
