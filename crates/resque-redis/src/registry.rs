use chrono::Utc;
use resque_core::{FailureCause, JobPayload, StatusRecord, WorkerId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gateway::{GatewayError, RedisGateway};
use crate::keys::KeyNamespace;
use crate::process_lister::ProcessLister;
use crate::status_store::StatusStore;

/// The ephemeral `worker:{id}` record describing the job a worker is
/// processing right now (spec §3, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerCurrentJob {
    pub queue: String,
    pub run_at: chrono::DateTime<Utc>,
    pub payload: JobPayload,
}

/// Registration, enumeration, and host-local dead-worker pruning for
/// the `workers` set (spec §4.E).
pub struct WorkerRegistry<'a> {
    gateway: &'a mut RedisGateway,
    ns: &'a KeyNamespace,
}

impl<'a> WorkerRegistry<'a> {
    pub fn new(gateway: &'a mut RedisGateway, ns: &'a KeyNamespace) -> Self {
        WorkerRegistry { gateway, ns }
    }

    pub fn register(&mut self, id: &WorkerId) -> Result<(), GatewayError> {
        self.gateway.sadd(&self.ns.workers(), &id.to_string())?;
        self.gateway.set(
            &self.ns.worker_started(&id.to_string()),
            Utc::now().to_rfc3339().as_bytes(),
        )
    }

    pub fn set_current_job(&mut self, id: &WorkerId, record: &WorkerCurrentJob) -> Result<(), GatewayError> {
        let bytes = serde_json::to_vec(record).expect("WorkerCurrentJob always encodes");
        self.gateway.set(&self.ns.worker(&id.to_string()), &bytes)
    }

    pub fn clear_current_job(&mut self, id: &WorkerId) -> Result<(), GatewayError> {
        self.gateway.del(&self.ns.worker(&id.to_string()))
    }

    pub fn current_job(&mut self, id: &WorkerId) -> Result<Option<WorkerCurrentJob>, GatewayError> {
        match self.gateway.get(&self.ns.worker(&id.to_string()))? {
            None => Ok(None),
            Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        }
    }

    pub fn exists(&mut self, id: &WorkerId) -> Result<bool, GatewayError> {
        self.gateway.sismember(&self.ns.workers(), &id.to_string())
    }

    /// Materialize every registered worker id, skipping any that don't
    /// parse as `host:pid:queues` (spec §4.E).
    pub fn all(&mut self) -> Result<Vec<WorkerId>, GatewayError> {
        let ids = self.gateway.smembers(&self.ns.workers())?;
        Ok(ids.into_iter().filter_map(|s| WorkerId::parse(&s).ok()).collect())
    }

    /// Unregister `id`: if it holds a current job, first fail that job
    /// with a "dirty exit (no message)" cause, then remove the id from
    /// the registry and delete its ephemeral keys (spec §4.E).
    pub fn unregister(&mut self, id: &WorkerId) -> Result<(), GatewayError> {
        if let Some(current) = self.current_job(id)? {
            let mut status_store = StatusStore::new(self.gateway, self.ns);
            status_store.write(
                &current.payload.id,
                &StatusRecord::failed(Some(current.run_at), FailureCause::orphaned_worker()),
            )?;
        }
        let id_str = id.to_string();
        self.gateway.srem(&self.ns.workers(), &id_str)?;
        self.gateway.del(&self.ns.worker(&id_str))?;
        self.gateway.del(&self.ns.worker_started(&id_str))?;
        self.gateway.del(&self.ns.stat_processed_for(&id_str))?;
        self.gateway.del(&self.ns.stat_failed_for(&id_str))?;
        Ok(())
    }

    /// Enumerate ids on `host` whose pid is not alive per `lister`,
    /// excluding `own_pid`, and unregister them. Never touches workers
    /// registered under a different host (spec §4.E, invariant 5).
    pub fn prune_dead_workers(
        &mut self,
        host: &str,
        own_pid: u32,
        lister: &dyn ProcessLister,
    ) -> Result<Vec<WorkerId>, GatewayError> {
        let canonical_host = canonicalize_host(host);
        let mut pruned = Vec::new();
        for id in self.all()? {
            if canonicalize_host(id.host()) != canonical_host {
                continue;
            }
            if id.pid() == own_pid {
                continue;
            }
            if !lister.is_alive(id.pid()) {
                info!(worker = %id, "pruning dead worker");
                self.unregister(&id)?;
                pruned.push(id);
            }
        }
        Ok(pruned)
    }
}

/// Lowercase + trim a hostname for pruning comparisons (spec §9 Open
/// Question: FQDN vs. short hostnames can otherwise mis-classify).
fn canonicalize_host(host: &str) -> String {
    host.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_lister::ProcessLister;

    struct FakeLister {
        alive: Vec<u32>,
    }

    impl ProcessLister for FakeLister {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }
    }

    fn setup() -> (RedisGateway, KeyNamespace) {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
        (RedisGateway::new(url).unwrap(), KeyNamespace::of("resque-test-registry"))
    }

    #[test]
    fn register_then_unregister_clears_keys() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        let id = WorkerId::new("host1", 4242, &["q".into()]);
        let mut registry = WorkerRegistry::new(&mut gw, &ns);
        registry.register(&id).unwrap();
        assert!(registry.exists(&id).unwrap());
        registry.unregister(&id).unwrap();
        assert!(!registry.exists(&id).unwrap());
        assert!(gw.get(&ns.worker_started(&id.to_string())).unwrap().is_none());
    }

    #[test]
    fn unregister_with_held_job_marks_it_failed() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        let id = WorkerId::new("host1", 4243, &["q".into()]);
        {
            let mut registry = WorkerRegistry::new(&mut gw, &ns);
            registry.register(&id).unwrap();
            let payload = JobPayload::new("Echo", vec![], "q");
            registry
                .set_current_job(
                    &id,
                    &WorkerCurrentJob {
                        queue: "q".into(),
                        run_at: Utc::now(),
                        payload: payload.clone(),
                    },
                )
                .unwrap();
            registry.unregister(&id).unwrap();

            let mut status_store = StatusStore::new(&mut *registry.gateway, registry.ns);
            let view = status_store.read(&payload.id).unwrap();
            assert_eq!(view.status(), Some(resque_core::JobStatus::Failed));
        }
    }

    #[test]
    fn prune_removes_only_dead_same_host_workers() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        let dead = WorkerId::new("this-host", 99999, &["q".into()]);
        let other_host = WorkerId::new("other-host", 99998, &["q".into()]);
        let mut registry = WorkerRegistry::new(&mut gw, &ns);
        registry.register(&dead).unwrap();
        registry.register(&other_host).unwrap();

        let lister = FakeLister { alive: vec![] };
        let pruned = registry.prune_dead_workers("this-host", 1, &lister).unwrap();

        assert!(pruned.contains(&dead));
        assert!(!pruned.contains(&other_host));
        assert!(!registry.exists(&dead).unwrap());
        assert!(registry.exists(&other_host).unwrap());
        registry.unregister(&other_host).unwrap();
    }
}
