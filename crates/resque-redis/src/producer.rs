use resque_core::JobPayload;

use crate::gateway::{GatewayError, RedisGateway};
use crate::keys::KeyNamespace;

/// The enqueue-side API (spec §1: "treated here as external
/// collaborators"). Kept minimal on purpose — it is a trivial push to
/// a list plus registering the queue name, not part of the core this
/// specification covers.
pub struct Producer<'a> {
    gateway: &'a mut RedisGateway,
    ns: &'a KeyNamespace,
}

impl<'a> Producer<'a> {
    pub fn new(gateway: &'a mut RedisGateway, ns: &'a KeyNamespace) -> Self {
        Producer { gateway, ns }
    }

    pub fn push(&mut self, payload: &JobPayload) -> Result<(), GatewayError> {
        self.gateway.sadd(&self.ns.queues(), &payload.queue)?;
        self.gateway.lpush(&self.ns.queue(&payload.queue), &payload.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_registers_queue_and_enqueues_payload() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let url = std::env::var("REDIS_URL").unwrap();
        let mut gw = RedisGateway::new(url).unwrap();
        let ns = KeyNamespace::of("resque-test-producer");
        gw.del(&ns.queues()).unwrap();
        gw.del(&ns.queue("widgets")).unwrap();

        let payload = JobPayload::new("Widget", vec![], "widgets");
        Producer::new(&mut gw, &ns).push(&payload).unwrap();

        assert!(gw.sismember(&ns.queues(), "widgets").unwrap());
        let popped = gw.rpop(&ns.queue("widgets")).unwrap().unwrap();
        assert_eq!(JobPayload::decode(&popped).unwrap().id, payload.id);
    }
}
