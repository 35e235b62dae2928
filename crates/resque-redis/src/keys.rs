//! Redis key layout (spec §6), kept byte-for-byte compatible with the
//! established Resque protocol.
//!
//! Mirrors the const-template-plus-`Config` pattern `apalis-redis`
//! uses for its own (namespaced) key layout, but deliberately does
//! *not* template a namespace into these names by default: preserving
//! the legacy key names is a requirement here, not a design choice, so
//! an optional namespace is only prepended when the operator opts in
//! (see [`KeyNamespace`]).

/// Optional prefix applied to every key this crate touches.
///
/// Defaults to empty, which reproduces the legacy Resque key layout of
/// spec §6 exactly. Set a namespace to run several logically distinct
/// Resque deployments against one Redis instance.
#[derive(Clone, Debug, Default)]
pub struct KeyNamespace(pub Option<String>);

impl KeyNamespace {
    pub fn none() -> Self {
        KeyNamespace(None)
    }

    pub fn of(namespace: impl Into<String>) -> Self {
        KeyNamespace(Some(namespace.into()))
    }

    /// Reconstruct from a string that may be empty (meaning "no
    /// namespace"), as passed across the child-process boundary via
    /// argv.
    pub fn from_raw(s: &str) -> Self {
        if s.is_empty() {
            KeyNamespace::none()
        } else {
            KeyNamespace::of(s)
        }
    }

    /// The raw namespace string, for round-tripping across argv.
    pub fn raw(&self) -> Option<String> {
        self.0.clone()
    }

    fn prefixed(&self, key: String) -> String {
        match &self.0 {
            Some(ns) => format!("{ns}:{key}"),
            None => key,
        }
    }

    pub fn queue(&self, name: &str) -> String {
        self.prefixed(format!("queue:{name}"))
    }

    pub fn queues(&self) -> String {
        self.prefixed("queues".to_string())
    }

    pub fn workers(&self) -> String {
        self.prefixed("workers".to_string())
    }

    pub fn worker(&self, id: &str) -> String {
        self.prefixed(format!("worker:{id}"))
    }

    pub fn worker_started(&self, id: &str) -> String {
        self.prefixed(format!("worker:{id}:started"))
    }

    pub fn stat_processed(&self) -> String {
        self.prefixed("stat:processed".to_string())
    }

    pub fn stat_failed(&self) -> String {
        self.prefixed("stat:failed".to_string())
    }

    pub fn stat_processed_for(&self, id: &str) -> String {
        self.prefixed(format!("stat:processed:{id}"))
    }

    pub fn stat_failed_for(&self, id: &str) -> String {
        self.prefixed(format!("stat:failed:{id}"))
    }

    pub fn job_status(&self, job_id: &str) -> String {
        self.prefixed(format!("job:{job_id}:status"))
    }

    /// Marker written by the child supervisor's executor just before
    /// running a job, so external observers can locate which process
    /// is executing a given job id (spec §4.F). Cleared before a
    /// normal exit.
    pub fn job_pid(&self, job_id: &str) -> String {
        self.prefixed(format!("job:{job_id}:pid"))
    }

    pub fn failed_list(&self) -> String {
        self.prefixed("failed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_legacy_layout() {
        let ns = KeyNamespace::none();
        assert_eq!(ns.queue("high"), "queue:high");
        assert_eq!(ns.workers(), "workers");
        assert_eq!(ns.worker("h:1:q"), "worker:h:1:q");
        assert_eq!(ns.job_status("abc"), "job:abc:status");
        assert_eq!(ns.failed_list(), "failed");
    }

    #[test]
    fn namespace_prefixes_every_key() {
        let ns = KeyNamespace::of("myapp");
        assert_eq!(ns.queue("high"), "myapp:queue:high");
        assert_eq!(ns.stat_processed(), "myapp:stat:processed");
    }
}
