use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One job as it travels over the wire: pushed by a producer onto
/// `queue:{name}`, popped by a worker, handed to the job class
/// resolver.
///
/// The JSON shape is fixed by the legacy Resque protocol (spec §6) and
/// must round-trip exactly for any JSON-finite `args` value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobPayload {
    /// External resolver looks this up to produce a `perform`-able object.
    pub class: String,
    /// Opaque, ordered argument list handed to `perform`.
    pub args: Vec<Value>,
    /// Unique job identifier. Producers are expected to generate one;
    /// `JobPayload::new` fills it in with a random id if left empty.
    pub id: String,
    /// Name of the queue this payload was popped from (or is destined
    /// for, on the producer side).
    pub queue: String,
    /// Optional scheduled execution time (unix seconds). Absent for
    /// immediate jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<i64>,
}

impl JobPayload {
    /// Build a payload for `class`/`args` destined for `queue`,
    /// generating a fresh id.
    pub fn new(class: impl Into<String>, args: Vec<Value>, queue: impl Into<String>) -> Self {
        JobPayload {
            class: class.into(),
            args,
            id: random_id(),
            queue: queue.into(),
            run_at: None,
        }
    }

    /// Decode a payload from its JSON wire form.
    ///
    /// Malformed payloads should be logged and discarded by the
    /// caller (spec §4.C) rather than propagated as a hard error.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|source| CoreError::Decode {
            what: "job payload",
            source,
        })
    }

    /// Encode to the JSON wire form.
    pub fn encode(&self) -> Vec<u8> {
        // A `JobPayload` only ever holds JSON-finite values, so this
        // cannot fail.
        serde_json::to_vec(self).expect("JobPayload always encodes")
    }
}

fn random_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("{nanos:x}-{pid:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_any_json_finite_args() {
        let payload = JobPayload {
            class: "Echo".into(),
            args: vec![json!("hi"), json!(1), json!(true), json!(null), json!({"a": [1,2,3]})],
            id: "j1".into(),
            queue: "q".into(),
            run_at: Some(123),
        };
        let encoded = payload.encode();
        let decoded = JobPayload::decode(&encoded).unwrap();
        assert_eq!(decoded.class, payload.class);
        assert_eq!(decoded.args, payload.args);
        assert_eq!(decoded.id, payload.id);
        assert_eq!(decoded.queue, payload.queue);
        assert_eq!(decoded.run_at, payload.run_at);
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = JobPayload::decode(b"not json").unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }

    #[test]
    fn enqueue_shape_matches_legacy_protocol() {
        let payload = JobPayload::new("Boom", vec![], "critical");
        let value: serde_json::Value = serde_json::from_slice(&payload.encode()).unwrap();
        assert!(value.get("class").is_some());
        assert!(value.get("args").is_some());
        assert!(value.get("id").is_some());
        assert!(value.get("queue").is_some());
    }
}
