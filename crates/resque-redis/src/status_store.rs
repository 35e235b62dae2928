use std::time::Duration;

use resque_core::{StatusRecord, StatusView};

use crate::gateway::{GatewayError, RedisGateway};
use crate::keys::KeyNamespace;

/// Default TTL for status records, per spec §4.D ("on the order of a day").
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(86_400);

/// Per-job-id status lifecycle persisted in Redis with TTL semantics.
///
/// Writes are unconditional overwrites; the monotonic
/// `WAITING -> RUNNING -> (COMPLETE | FAILED)` progression is a
/// convention the worker upholds by only ever calling `write` with a
/// status that is a valid successor, not something this store enforces.
pub struct StatusStore<'a> {
    gateway: &'a mut RedisGateway,
    ns: &'a KeyNamespace,
    ttl: Duration,
}

impl<'a> StatusStore<'a> {
    pub fn new(gateway: &'a mut RedisGateway, ns: &'a KeyNamespace) -> Self {
        StatusStore {
            gateway,
            ns,
            ttl: DEFAULT_STATUS_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn write(&mut self, job_id: &str, record: &StatusRecord) -> Result<(), GatewayError> {
        self.gateway
            .set_ex(&self.ns.job_status(job_id), &record.encode(), self.ttl)
    }

    pub fn read(&mut self, job_id: &str) -> Result<StatusView, GatewayError> {
        match self.gateway.get(&self.ns.job_status(job_id))? {
            None => Ok(StatusView::Unknown),
            Some(bytes) => match StatusRecord::decode(&bytes) {
                Ok(record) => Ok(StatusView::Known(record)),
                Err(_) => Ok(StatusView::Unknown),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resque_core::JobStatus;

    fn setup() -> (RedisGateway, KeyNamespace) {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
        (RedisGateway::new(url).unwrap(), KeyNamespace::of("resque-test-status"))
    }

    #[test]
    fn unknown_for_missing_key() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        gw.del(&ns.job_status("missing")).unwrap();
        let mut store = StatusStore::new(&mut gw, &ns);
        assert!(matches!(store.read("missing").unwrap(), StatusView::Unknown));
    }

    #[test]
    fn write_then_read_round_trips() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        let mut store = StatusStore::new(&mut gw, &ns);
        store.write("j1", &StatusRecord::waiting()).unwrap();
        let view = store.read("j1").unwrap();
        assert_eq!(view.status(), Some(JobStatus::Waiting));
        gw.del(&ns.job_status("j1")).unwrap();
    }
}
