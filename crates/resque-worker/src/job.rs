use chrono::{DateTime, Utc};
use resque_core::{FailureCause, JobPayload, StatusRecord, WorkerId};
use resque_redis::{GatewayError, KeyNamespace, RedisGateway, Stats, StatusStore};
use serde_json::Value;

use crate::resolver::JobClassResolver;

/// Live, in-memory representation of one job plus the worker currently
/// processing it (spec §3, §4.B). A `JobRecord` exists for the
/// duration of one reservation, from pop to `doneWorking`.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub payload: JobPayload,
    pub worker: WorkerId,
    pub started_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(payload: JobPayload, worker: WorkerId) -> Self {
        JobRecord {
            payload,
            worker,
            started_at: Utc::now(),
        }
    }

    /// Resolve the job class and run it, returning its result
    /// verbatim. Any error from resolution or execution becomes a
    /// [`FailureCause`] for the caller to route to [`JobRecord::fail`].
    pub fn perform(&self, resolver: &dyn JobClassResolver) -> Result<Value, FailureCause> {
        let mut instance = resolver.resolve(&self.payload.class).map_err(|e| FailureCause {
            class: "Resque::JobClassResolutionError".to_string(),
            message: e.to_string(),
            backtrace: Vec::new(),
        })?;
        instance.perform(self.payload.args.clone()).map_err(|e| FailureCause {
            class: "Resque::JobError".to_string(),
            message: e.to_string(),
            backtrace: Vec::new(),
        })
    }

    /// Write `FAILED` with `cause`, increment both failed counters, and
    /// append the user-visible failure record (spec §4.B, §7).
    ///
    /// Takes the gateway directly (rather than pre-built `StatusStore`/
    /// `Stats`/`FailedList` handles) so the three Redis round trips run
    /// sequentially against one connection instead of requiring three
    /// simultaneous mutable borrows of it.
    pub fn fail(&self, gateway: &mut RedisGateway, ns: &KeyNamespace, cause: FailureCause) -> Result<(), GatewayError> {
        StatusStore::new(gateway, ns).write(
            &self.payload.id,
            &StatusRecord::failed(Some(self.started_at), cause.clone()),
        )?;
        Stats::new(gateway, ns).record_failed(&self.worker)?;
        FailedList::new(gateway, ns).append(self, &cause)?;
        Ok(())
    }

    /// Write a non-terminal status update, or a terminal `COMPLETE`
    /// with its result.
    pub fn update_status(&self, gateway: &mut RedisGateway, ns: &KeyNamespace, record: StatusRecord) -> Result<(), GatewayError> {
        let is_complete = record.status == resque_core::JobStatus::Complete;
        StatusStore::new(gateway, ns).write(&self.payload.id, &record)?;
        if is_complete {
            Stats::new(gateway, ns).record_processed(&self.worker)?;
        }
        Ok(())
    }
}

/// Appends a JSON failure record to the `failed` list (spec §6, §7):
/// class, args, queue, worker id, timestamp, exception class, message.
pub struct FailedList<'a> {
    gateway: &'a mut resque_redis::RedisGateway,
    ns: &'a resque_redis::KeyNamespace,
}

impl<'a> FailedList<'a> {
    pub fn new(gateway: &'a mut resque_redis::RedisGateway, ns: &'a resque_redis::KeyNamespace) -> Self {
        FailedList { gateway, ns }
    }

    fn append(&mut self, job: &JobRecord, cause: &FailureCause) -> Result<(), GatewayError> {
        #[derive(serde::Serialize)]
        struct Record<'r> {
            class: &'r str,
            args: &'r [Value],
            queue: &'r str,
            worker: String,
            failed_at: DateTime<Utc>,
            exception: &'r str,
            message: &'r str,
            backtrace: &'r [String],
        }
        let record = Record {
            class: &job.payload.class,
            args: &job.payload.args,
            queue: &job.payload.queue,
            worker: job.worker.to_string(),
            failed_at: Utc::now(),
            exception: &cause.class,
            message: &cause.message,
            backtrace: &cause.backtrace,
        };
        let bytes = serde_json::to_vec(&record).expect("failure record always encodes");
        self.gateway.lpush(&self.ns.failed_list(), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{JobClassRegistry, Perform};

    struct Boom;
    impl Perform for Boom {
        fn perform(&mut self, _args: Vec<Value>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            Err("nope".into())
        }
    }

    struct Echo;
    impl Perform for Echo {
        fn perform(&mut self, args: Vec<Value>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Value::Array(args))
        }
    }

    #[test]
    fn perform_returns_result_on_success() {
        let mut resolver = JobClassRegistry::new();
        resolver.register("Echo", || Echo);
        let job = JobRecord::new(
            JobPayload::new("Echo", vec![Value::String("hi".into())], "q"),
            WorkerId::new("h", 1, &["q".into()]),
        );
        let result = job.perform(&resolver).unwrap();
        assert_eq!(result, Value::Array(vec![Value::String("hi".into())]));
    }

    #[test]
    fn perform_surfaces_job_error_message() {
        let mut resolver = JobClassRegistry::new();
        resolver.register("Boom", || Boom);
        let job = JobRecord::new(
            JobPayload::new("Boom", vec![], "q"),
            WorkerId::new("h", 1, &["q".into()]),
        );
        let cause = job.perform(&resolver).unwrap_err();
        assert!(cause.message.contains("nope"));
    }
}
