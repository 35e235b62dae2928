use std::time::Duration;

use resque_core::JobPayload;
use tracing::warn;

use crate::gateway::{GatewayError, RedisGateway};
use crate::keys::KeyNamespace;

/// Non-blocking vs. blocking reservation (spec §4.C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservationMode {
    Polled,
    Blocking,
}

/// Reserves jobs off an ordered, possibly-wildcarded queue list.
///
/// Priority is positional: queue 0 is checked (polled mode) or wins
/// ties (blocking mode, which is Redis-native first-key-nonempty-wins)
/// before queue 1, and so on. The wildcard `*` is re-expanded to the
/// lexically sorted set of known queues on every call, never cached.
pub struct Reserver<'a> {
    gateway: &'a mut RedisGateway,
    ns: &'a KeyNamespace,
}

impl<'a> Reserver<'a> {
    pub fn new(gateway: &'a mut RedisGateway, ns: &'a KeyNamespace) -> Self {
        Reserver { gateway, ns }
    }

    fn effective_queues(&mut self, declared: &[String]) -> Result<Vec<String>, GatewayError> {
        if declared.iter().any(|q| q == "*") {
            let mut known = self.gateway.smembers(&self.ns.queues())?;
            known.sort();
            Ok(known)
        } else {
            Ok(declared.to_vec())
        }
    }

    /// Polled mode: try each queue in order, first hit wins. Starves
    /// lower-priority queues by design.
    pub fn reserve_polled(&mut self, declared: &[String]) -> Result<Option<JobPayload>, GatewayError> {
        let queues = self.effective_queues(declared)?;
        for queue in queues {
            if let Some(bytes) = self.gateway.rpop(&self.ns.queue(&queue))? {
                match JobPayload::decode(&bytes) {
                    Ok(payload) => return Ok(Some(payload)),
                    Err(_) => {
                        warn!(queue = %queue, "discarding malformed payload");
                        continue;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Blocking mode: a single atomic multi-key `BLPOP` bounded by
    /// `timeout`. An empty queue list sleeps for `timeout` instead of
    /// issuing a command (a `BLPOP` with no keys is meaningless).
    pub fn reserve_blocking(
        &mut self,
        declared: &[String],
        timeout: Duration,
    ) -> Result<Option<JobPayload>, GatewayError> {
        let queues = self.effective_queues(declared)?;
        if queues.is_empty() {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        let keys: Vec<String> = queues.iter().map(|q| self.ns.queue(q)).collect();
        match self.gateway.blpop(&keys, timeout)? {
            None => Ok(None),
            Some((key, bytes)) => match JobPayload::decode(&bytes) {
                Ok(payload) => Ok(Some(payload)),
                Err(_) => {
                    warn!(key = %key, "discarding malformed payload");
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (RedisGateway, KeyNamespace) {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
        (RedisGateway::new(url).unwrap(), KeyNamespace::of("resque-test-reservation"))
    }

    #[test]
    fn polled_mode_visits_declared_order() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        gw.del(&ns.queue("b")).unwrap();
        gw.del(&ns.queue("a")).unwrap();
        let job_a = JobPayload::new("A", vec![], "a");
        let job_b = JobPayload::new("B", vec![], "b");
        gw.lpush(&ns.queue("a"), &job_a.encode()).unwrap();
        gw.lpush(&ns.queue("b"), &job_b.encode()).unwrap();

        let mut reserver = Reserver::new(&mut gw, &ns);
        let declared = vec!["b".to_string(), "a".to_string()];
        let first = reserver.reserve_polled(&declared).unwrap().unwrap();
        assert_eq!(first.class, "B");
    }

    #[test]
    fn wildcard_expands_to_sorted_known_queues() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let (mut gw, ns) = setup();
        gw.del(&ns.queues()).unwrap();
        gw.del(&ns.queue("x")).unwrap();
        gw.del(&ns.queue("y")).unwrap();
        gw.del(&ns.queue("z")).unwrap();
        for q in ["z", "x", "y"] {
            gw.sadd(&ns.queues(), q).unwrap();
        }
        let job = JobPayload::new("Z", vec![], "x");
        gw.lpush(&ns.queue("x"), &job.encode()).unwrap();

        let mut reserver = Reserver::new(&mut gw, &ns);
        let found = reserver.reserve_polled(&["*".to_string()]).unwrap().unwrap();
        assert_eq!(found.queue, "x");
    }
}
