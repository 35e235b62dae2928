use std::time::Duration;

use redis::{Client, Commands, IntoConnectionInfo, RedisError, RedisResult};

/// Errors surfaced by the [`RedisGateway`].
///
/// `Disconnected` is the one callers (specifically the worker loop,
/// spec §4.G step 2) treat specially: it means the cached connection
/// was dropped and the *next* call will attempt to re-dial. The
/// gateway itself never sleeps or retries on its own.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("redis connection lost: {0}")]
    Disconnected(#[source] RedisError),
    #[error(transparent)]
    Redis(#[from] RedisError),
}

impl GatewayError {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, GatewayError::Disconnected(_))
    }
}

fn classify(err: RedisError) -> GatewayError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        GatewayError::Disconnected(err)
    } else {
        GatewayError::Redis(err)
    }
}

/// A process-wide handle to Redis with lazy, explicit reconnection.
///
/// All other components reach Redis exclusively through this narrow
/// facade (spec §4.A). Modeled on `apalis_redis::connect` for the
/// "build a client from a URI" half, and on `oppgave::Queue`'s use of
/// a plain synchronous `redis::Connection` for the blocking-call half
/// — this runtime's suspension points (spec §5) are explicit sleeps
/// and blocking pops in a single-threaded loop, not an async stream,
/// so a blocking client is the fit here rather than `ConnectionManager`.
pub struct RedisGateway {
    client: Client,
    conn: Option<redis::Connection>,
}

impl RedisGateway {
    /// Build a gateway for `uri`. Does not connect eagerly; the first
    /// command establishes the connection.
    pub fn new<S: IntoConnectionInfo>(uri: S) -> Result<Self, GatewayError> {
        let client = Client::open(uri.into_connection_info()?)?;
        Ok(RedisGateway { client, conn: None })
    }

    fn connection(&mut self) -> Result<&mut redis::Connection, GatewayError> {
        if self.conn.is_none() {
            let conn = self.client.get_connection().map_err(classify)?;
            self.conn = Some(conn);
        }
        Ok(self.conn.as_mut().expect("just populated"))
    }

    fn run<T>(&mut self, f: impl FnOnce(&mut redis::Connection) -> RedisResult<T>) -> Result<T, GatewayError> {
        let conn = self.connection()?;
        match f(conn) {
            Ok(v) => Ok(v),
            Err(e) => {
                let gateway_err = classify(e);
                if gateway_err.is_disconnected() {
                    // The connection is dead; drop it so the next call re-dials.
                    self.conn = None;
                }
                Err(gateway_err)
            }
        }
    }

    /// Drop the cached connection without attempting a command. Used by
    /// the worker loop after a disconnect is observed elsewhere (spec
    /// §4.G step 2: "null out the gateway handle").
    pub fn disconnect(&mut self) {
        self.conn = None;
    }

    pub fn ping(&mut self) -> Result<(), GatewayError> {
        self.run(|c| redis::cmd("PING").query(c))
    }

    pub fn lpush(&mut self, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        self.run(|c| c.lpush(key, value))
    }

    /// Non-blocking pop from the tail of `key`. `None` if empty.
    pub fn rpop(&mut self, key: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        self.run(|c| c.rpop(key, None))
    }

    /// Atomic multi-key blocking pop: the first non-empty key in
    /// `keys` order wins (Redis-native priority tie-break, spec §4.C).
    /// Returns `None` if `timeout` elapses with no job.
    ///
    /// `BLPOP`'s timeout is a float number of seconds, so sub-second
    /// `timeout`s are honored exactly rather than truncated to whole
    /// seconds. A `timeout` of `0` means "block forever" to Redis,
    /// which is the opposite of what a zero/near-zero interval means
    /// here, so it's floored at one millisecond.
    pub fn blpop(
        &mut self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>, GatewayError> {
        if keys.is_empty() {
            return Ok(None);
        }
        let timeout_secs = timeout.as_secs_f64().max(0.001);
        let reply: Option<(String, Vec<u8>)> = self.run(|c| {
            redis::cmd("BLPOP")
                .arg(keys)
                .arg(timeout_secs)
                .query(c)
        })?;
        Ok(reply)
    }

    pub fn sadd(&mut self, key: &str, member: &str) -> Result<(), GatewayError> {
        self.run(|c| c.sadd(key, member))
    }

    pub fn srem(&mut self, key: &str, member: &str) -> Result<(), GatewayError> {
        self.run(|c| c.srem(key, member))
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool, GatewayError> {
        self.run(|c| c.sismember(key, member))
    }

    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>, GatewayError> {
        self.run(|c| c.smembers(key))
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        self.run(|c| c.get(key))
    }

    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        self.run(|c| c.set(key, value))
    }

    pub fn set_ex(&mut self, key: &str, value: &[u8], ttl: Duration) -> Result<(), GatewayError> {
        self.run(|c| c.set_ex(key, value, ttl.as_secs()))
    }

    pub fn del(&mut self, key: &str) -> Result<(), GatewayError> {
        self.run(|c| c.del(key))
    }

    pub fn incr(&mut self, key: &str) -> Result<i64, GatewayError> {
        self.run(|c| c.incr(key, 1))
    }

    pub fn keys(&mut self, pattern: &str) -> Result<Vec<String>, GatewayError> {
        self.run(|c| c.keys(pattern))
    }

    pub fn flushdb(&mut self) -> Result<(), GatewayError> {
        self.run(|c| redis::cmd("FLUSHDB").query(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> RedisGateway {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for gateway tests");
        RedisGateway::new(url).unwrap()
    }

    #[test]
    fn ping_reconnects_after_disconnect() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let mut gw = RedisGateway::new(url).unwrap();
        gw.ping().unwrap();
        gw.disconnect();
        gw.ping().unwrap();
    }

    #[test]
    fn counters_round_trip() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let mut gw = setup();
        gw.del("resque-test:counter").unwrap();
        let v1 = gw.incr("resque-test:counter").unwrap();
        let v2 = gw.incr("resque-test:counter").unwrap();
        assert_eq!(v2, v1 + 1);
        gw.del("resque-test:counter").unwrap();
    }

    #[test]
    fn set_membership_round_trips() {
        if std::env::var("REDIS_URL").is_err() {
            return;
        }
        let mut gw = setup();
        gw.del("resque-test:set").unwrap();
        gw.sadd("resque-test:set", "a").unwrap();
        assert!(gw.sismember("resque-test:set", "a").unwrap());
        assert!(!gw.sismember("resque-test:set", "b").unwrap());
        gw.srem("resque-test:set", "a").unwrap();
        assert!(!gw.sismember("resque-test:set", "a").unwrap());
    }
}
