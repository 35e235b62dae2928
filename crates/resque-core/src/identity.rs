use std::fmt;

use crate::error::CoreError;

/// `host:pid:queues` — the primary key of the worker registry (spec §3).
///
/// `queues` is the comma-joined, declaration-ordered queue list; it may
/// itself contain colons (an unusual but legal queue name), so parsing
/// only ever splits on the *first two* colons.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId {
    host: String,
    pid: u32,
    queues_raw: String,
}

impl WorkerId {
    pub fn new(host: impl Into<String>, pid: u32, queues: &[String]) -> Self {
        WorkerId {
            host: host.into(),
            pid,
            queues_raw: queues.join(","),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The declared queue list in declaration order, as written into
    /// the identity string.
    pub fn queues(&self) -> Vec<String> {
        self.queues_raw.split(',').map(str::to_string).collect()
    }

    /// Parse `host:pid:queues`, splitting only the first two colons.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let mut parts = s.splitn(3, ':');
        let host = parts.next().ok_or_else(|| CoreError::MalformedIdentity(s.to_string()))?;
        let pid = parts.next().ok_or_else(|| CoreError::MalformedIdentity(s.to_string()))?;
        let queues = parts.next().ok_or_else(|| CoreError::MalformedIdentity(s.to_string()))?;
        let pid: u32 = pid
            .parse()
            .map_err(|_| CoreError::MalformedIdentity(s.to_string()))?;
        Ok(WorkerId {
            host: host.to_string(),
            pid,
            queues_raw: queues.to_string(),
        })
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.pid, self.queues_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = WorkerId::new("box1", 42, &["high".into(), "low".into()]);
        let parsed = WorkerId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.queues(), vec!["high", "low"]);
    }

    #[test]
    fn only_splits_first_two_colons() {
        let parsed = WorkerId::parse("host:7:a,b:with:colons").unwrap();
        assert_eq!(parsed.host(), "host");
        assert_eq!(parsed.pid(), 7);
        assert_eq!(parsed.queues(), vec!["a,b:with:colons"]);
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(WorkerId::parse("host:7").is_err());
        assert!(WorkerId::parse("host:notapid:q").is_err());
    }
}
