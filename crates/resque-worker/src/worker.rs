use std::path::PathBuf;
use std::time::Duration;

use resque_core::{CoreError, FailureCause, JobPayload, StatusRecord, WorkerId};
use resque_redis::{
    GatewayError, KeyNamespace, ProcessLister, ReservationMode, RedisGateway, Reserver,
    WorkerCurrentJob, WorkerRegistry,
};
use tracing::{info, warn};

use crate::child::{ChildEnvelope, ChildSupervisor, ChildTermination};
use crate::hooks::{dispatch, Hooks};
use crate::job::JobRecord;
use crate::resolver::JobClassResolver;
use crate::signals::SignalFlags;

/// How often the child-reap loop polls, per spec §5's ≈500ms suspension
/// point.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Everything the worker loop needs at construction time; corresponds
/// to the concrete CLI flags this crate adds on top of spec.md's
/// abstract worker state.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub queues: Vec<String>,
    pub mode: ReservationMode,
    pub interval: Duration,
    pub redis_uri: String,
    pub namespace: KeyNamespace,
    /// Process exactly this many jobs then exit cleanly, or run forever.
    pub count: Option<u64>,
    /// Pid of the process that forked this worker, if any (spec §4.G's
    /// `hasParent`/`parentPid`).
    pub parent_pid: Option<u32>,
}

/// The worker loop (spec §4.G): owns the Redis gateway, registration,
/// reservation, and the child supervisor, and drives the six-step
/// iteration until `shutdown`.
pub struct Worker<'h> {
    id: WorkerId,
    config: WorkerConfig,
    gateway: RedisGateway,
    resolver: Box<dyn JobClassResolver>,
    hooks: &'h dyn Hooks,
    signals: SignalFlags,
    lister: Box<dyn ProcessLister>,
    supervisor: ChildSupervisor,
    processed_count: u64,
}

impl<'h> Worker<'h> {
    pub fn new(
        host: impl Into<String>,
        config: WorkerConfig,
        resolver: Box<dyn JobClassResolver>,
        hooks: &'h dyn Hooks,
        signals: SignalFlags,
        lister: Box<dyn ProcessLister>,
        exe: PathBuf,
    ) -> Result<Self, GatewayError> {
        let gateway = RedisGateway::new(config.redis_uri.clone())?;
        let id = WorkerId::new(host, std::process::id(), &config.queues);
        Ok(Worker {
            id,
            config,
            gateway,
            resolver,
            hooks,
            signals,
            lister,
            supervisor: ChildSupervisor::new(exe),
            processed_count: 0,
        })
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Run the full loop to completion (spec §4.G). Returns once
    /// `shutdown` is observed, `--count` jobs have been processed, or
    /// the declared parent has exited.
    pub fn run(&mut self) -> Result<(), GatewayError> {
        dispatch("before_first_fork", std::panic::AssertUnwindSafe(|| self.hooks.before_first_fork(&self.id)));
        WorkerRegistry::new(&mut self.gateway, &self.config.namespace).register(&self.id)?;

        loop {
            self.signals.pump();
            // Step 1.
            if self.signals.is_shutdown() {
                break;
            }

            if !self.signals.is_paused() {
                // Step 2.
                if let Err(e) = self.gateway.ping() {
                    if e.is_disconnected() {
                        warn!(error = %e, "redis ping failed, reconnecting on next use");
                        self.gateway.disconnect();
                        std::thread::sleep(self.config.interval);
                        continue;
                    }
                    return Err(e);
                }
            }

            // Step 3.
            let job = if self.signals.is_paused() {
                None
            } else {
                match self.reserve()? {
                    Some(job) => Some(job),
                    None => {
                        if self.orphaned() {
                            self.signals.request_shutdown();
                        }
                        None
                    }
                }
            };

            // Step 4.
            let Some(payload) = job else {
                if self.config.interval.is_zero() {
                    break;
                }
                if self.config.mode == ReservationMode::Polled {
                    std::thread::sleep(self.config.interval);
                }
                continue;
            };

            // Step 5.
            self.run_one(payload)?;
            if let Some(limit) = self.config.count {
                if self.processed_count >= limit {
                    break;
                }
            }
        }

        // Step 6.
        WorkerRegistry::new(&mut self.gateway, &self.config.namespace).unregister(&self.id)?;
        Ok(())
    }

    fn orphaned(&self) -> bool {
        match self.config.parent_pid {
            Some(pid) => !self.lister.is_alive(pid),
            None => false,
        }
    }

    fn reserve(&mut self) -> Result<Option<JobPayload>, GatewayError> {
        let mut reserver = Reserver::new(&mut self.gateway, &self.config.namespace);
        match self.config.mode {
            ReservationMode::Polled => reserver.reserve_polled(&self.config.queues),
            ReservationMode::Blocking => reserver.reserve_blocking(&self.config.queues, self.config.interval),
        }
    }

    /// Bind `workingOn`, fork-and-reap, finalize, then `doneWorking`
    /// (spec §4.G step 5).
    fn run_one(&mut self, payload: JobPayload) -> Result<(), GatewayError> {
        dispatch("before_fork", std::panic::AssertUnwindSafe(|| self.hooks.before_fork(&self.id, &payload)));

        let job = JobRecord::new(payload.clone(), self.id.clone());
        let mut registry = WorkerRegistry::new(&mut self.gateway, &self.config.namespace);
        registry.set_current_job(
            &self.id,
            &WorkerCurrentJob {
                queue: payload.queue.clone(),
                run_at: job.started_at,
                payload: payload.clone(),
            },
        )?;

        job.update_status(&mut self.gateway, &self.config.namespace, StatusRecord::running(job.started_at))?;

        let envelope = ChildEnvelope {
            payload: payload.clone(),
            worker: self.id.to_string(),
            started_at: job.started_at,
        };

        info!(queue = %payload.queue, job = %payload.id, "reserved job");
        dispatch("after_fork", std::panic::AssertUnwindSafe(|| self.hooks.after_fork(&self.id, &payload)));

        match self.supervisor.spawn(&envelope, &self.config.redis_uri, &self.config.namespace) {
            Ok(child) => {
                // `ChildSupervisor::reap` pumps signals itself on every poll,
                // so a TERM/INT-derived shutdown-now (or an explicit
                // KILL-CHILD) is caught there, not here.
                self.finish_child(job, payload, child)?;
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn child, running job in-process");
                self.run_in_process(job, payload)?;
            }
        }

        self.processed_count += 1;
        Ok(())
    }

    fn finish_child(
        &mut self,
        job: JobRecord,
        payload: JobPayload,
        child: std::process::Child,
    ) -> Result<(), GatewayError> {
        let termination = self.supervisor.reap(child, REAP_POLL_INTERVAL, &self.signals, self.lister.as_ref());
        match termination {
            ChildTermination::Normal => {
                // The child may already have promoted the job itself; only
                // promote here if it's still WAITING/RUNNING (spec §4.F).
                let mut status_store = resque_redis::StatusStore::new(&mut self.gateway, &self.config.namespace);
                let still_unfinished = matches!(
                    status_store.read(&payload.id)?.status(),
                    Some(resque_core::JobStatus::Waiting) | Some(resque_core::JobStatus::Running) | None
                );
                if still_unfinished {
                    job.update_status(&mut self.gateway, &self.config.namespace, StatusRecord::complete(Some(job.started_at), None))?;
                }
            }
            ChildTermination::ExitCode(code) => {
                let cause = FailureCause::exit_code(code);
                dispatch("on_failure", std::panic::AssertUnwindSafe(|| self.hooks.on_failure(&self.id, &payload, &cause)));
                job.fail(&mut self.gateway, &self.config.namespace, cause)?;
            }
            ChildTermination::Abnormal => {
                let cause = FailureCause::dirty_exit();
                dispatch("on_failure", std::panic::AssertUnwindSafe(|| self.hooks.on_failure(&self.id, &payload, &cause)));
                job.fail(&mut self.gateway, &self.config.namespace, cause)?;
            }
        }
        self.done_working()
    }

    /// Fallback when spawning a child process isn't possible at all
    /// (spec §4.F: "on fork unavailability or failure, the supervisor
    /// runs the job in-process").
    fn run_in_process(&mut self, job: JobRecord, payload: JobPayload) -> Result<(), GatewayError> {
        match job.perform(self.resolver.as_ref()) {
            Ok(result) => {
                job.update_status(&mut self.gateway, &self.config.namespace, StatusRecord::complete(Some(job.started_at), Some(result)))?;
            }
            Err(cause) => {
                dispatch("on_failure", std::panic::AssertUnwindSafe(|| self.hooks.on_failure(&self.id, &payload, &cause)));
                job.fail(&mut self.gateway, &self.config.namespace, cause)?;
            }
        }
        self.done_working()
    }

    fn done_working(&mut self) -> Result<(), GatewayError> {
        WorkerRegistry::new(&mut self.gateway, &self.config.namespace).clear_current_job(&self.id)
    }
}

/// Entry point for the `--internal-run-job` child verb (spec §4.F):
/// executes exactly one job and exits, never entering the loop above.
///
/// Writes the pid-marker before `perform`, clears it before a normal
/// exit, and lets a panic or process-level crash surface as a nonzero
/// exit or signal so the parent's [`ChildTermination`] classification
/// applies. Returns `Ok(true)` when the job's own `perform()` failed
/// and was already recorded as `FAILED` (the caller should still exit
/// 0 — the *parent* only escalates to `ExitCode`/`Abnormal` for crashes
/// the child process itself never got a chance to handle).
pub fn run_job_in_child(
    envelope: ChildEnvelope,
    redis_uri: &str,
    namespace: &str,
    resolver: &dyn JobClassResolver,
) -> Result<bool, CoreError> {
    let ns = KeyNamespace::from_raw(namespace);
    let mut gateway = RedisGateway::new(redis_uri).map_err(|e| CoreError::Source(Box::new(e)))?;
    let worker = envelope.worker_id()?;
    let job = JobRecord::new(envelope.payload.clone(), worker);

    gateway
        .set(&ns.job_pid(&job.payload.id), std::process::id().to_string().as_bytes())
        .map_err(|e| CoreError::Source(Box::new(e)))?;

    let outcome = job.perform(resolver);

    gateway
        .del(&ns.job_pid(&job.payload.id))
        .map_err(|e| CoreError::Source(Box::new(e)))?;

    match outcome {
        Ok(result) => {
            job.update_status(&mut gateway, &ns, StatusRecord::complete(Some(job.started_at), Some(result)))
                .map_err(|e| CoreError::Source(Box::new(e)))?;
            Ok(false)
        }
        Err(cause) => {
            job.fail(&mut gateway, &ns, cause)
                .map_err(|e| CoreError::Source(Box::new(e)))?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHooks;
    use crate::resolver::JobClassRegistry;

    struct FakeLister {
        alive: Vec<u32>,
    }

    impl ProcessLister for FakeLister {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }
    }

    fn worker(parent_pid: Option<u32>, lister: FakeLister) -> Worker<'static> {
        let config = WorkerConfig {
            queues: vec!["default".into()],
            mode: ReservationMode::Polled,
            interval: Duration::from_secs(1),
            redis_uri: "redis://127.0.0.1/".into(),
            namespace: KeyNamespace::of("resque-test-worker"),
            count: None,
            parent_pid,
        };
        Worker::new(
            "test-host",
            config,
            Box::new(JobClassRegistry::new()),
            &NoopHooks,
            SignalFlags::detached(),
            Box::new(lister),
            PathBuf::from("/bin/true"),
        )
        .unwrap()
    }

    #[test]
    fn not_orphaned_without_a_declared_parent() {
        let w = worker(None, FakeLister { alive: vec![] });
        assert!(!w.orphaned());
    }

    #[test]
    fn orphaned_when_parent_pid_is_not_alive() {
        let w = worker(Some(999_999), FakeLister { alive: vec![1] });
        assert!(w.orphaned());
    }

    #[test]
    fn not_orphaned_when_parent_pid_is_alive() {
        let w = worker(Some(42), FakeLister { alive: vec![42] });
        assert!(!w.orphaned());
    }
}
