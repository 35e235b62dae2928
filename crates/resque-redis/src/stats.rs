use resque_core::WorkerId;

use crate::gateway::{GatewayError, RedisGateway};
use crate::keys::KeyNamespace;

/// Monotonic `processed`/`failed` counters, global and per-worker
/// (spec §4.H). Increments use `INCR`; absent keys read as 0; a
/// worker's counters are deleted when it unregisters
/// ([`crate::registry::WorkerRegistry::unregister`]).
pub struct Stats<'a> {
    gateway: &'a mut RedisGateway,
    ns: &'a KeyNamespace,
}

impl<'a> Stats<'a> {
    pub fn new(gateway: &'a mut RedisGateway, ns: &'a KeyNamespace) -> Self {
        Stats { gateway, ns }
    }

    pub fn record_processed(&mut self, worker: &WorkerId) -> Result<(), GatewayError> {
        self.gateway.incr(&self.ns.stat_processed())?;
        self.gateway.incr(&self.ns.stat_processed_for(&worker.to_string()))?;
        Ok(())
    }

    pub fn record_failed(&mut self, worker: &WorkerId) -> Result<(), GatewayError> {
        self.gateway.incr(&self.ns.stat_failed())?;
        self.gateway.incr(&self.ns.stat_failed_for(&worker.to_string()))?;
        Ok(())
    }

    fn read_counter(&mut self, key: &str) -> Result<i64, GatewayError> {
        match self.gateway.get(key)? {
            None => Ok(0),
            Some(bytes) => Ok(String::from_utf8_lossy(&bytes).parse().unwrap_or(0)),
        }
    }

    pub fn global_processed(&mut self) -> Result<i64, GatewayError> {
        self.read_counter(&self.ns.stat_processed())
    }

    pub fn global_failed(&mut self) -> Result<i64, GatewayError> {
        self.read_counter(&self.ns.stat_failed())
    }

    pub fn worker_processed(&mut self, worker: &WorkerId) -> Result<i64, GatewayError> {
        self.read_counter(&self.ns.stat_processed_for(&worker.to_string()))
    }

    pub fn worker_failed(&mut self, worker: &WorkerId) -> Result<i64, GatewayError> {
        self.read_counter(&self.ns.stat_failed_for(&worker.to_string()))
    }

    /// A point-in-time read of every counter this worker owns; the
    /// statistics read API (spec §1 external collaborator) is built
    /// directly on top of this.
    pub fn snapshot(&mut self, worker: &WorkerId) -> Result<StatsSnapshot, GatewayError> {
        Ok(StatsSnapshot {
            global_processed: self.global_processed()?,
            global_failed: self.global_failed()?,
            worker_processed: self.worker_processed(worker)?,
            worker_failed: self.worker_failed(worker)?,
        })
    }
}

/// Snapshot of the global and per-worker counters at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub global_processed: i64,
    pub global_failed: i64,
    pub worker_processed: i64,
    pub worker_failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_counters_read_as_zero() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let url = std::env::var("REDIS_URL").unwrap();
        let mut gw = RedisGateway::new(url).unwrap();
        let ns = KeyNamespace::of("resque-test-stats-absent");
        let worker = WorkerId::new("host", 1, &["q".into()]);
        let mut stats = Stats::new(&mut gw, &ns);
        assert_eq!(stats.worker_processed(&worker).unwrap(), 0);
    }

    #[test]
    fn increments_both_global_and_per_worker() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let url = std::env::var("REDIS_URL").unwrap();
        let mut gw = RedisGateway::new(url).unwrap();
        let ns = KeyNamespace::of("resque-test-stats-incr");
        let worker = WorkerId::new("host", 2, &["q".into()]);
        gw.del(&ns.stat_processed()).unwrap();
        gw.del(&ns.stat_processed_for(&worker.to_string())).unwrap();

        let mut stats = Stats::new(&mut gw, &ns);
        stats.record_processed(&worker).unwrap();
        assert_eq!(stats.global_processed().unwrap(), 1);
        assert_eq!(stats.worker_processed(&worker).unwrap(), 1);
    }
}
