use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use resque_core::WorkerId;
use resque_redis::{KeyNamespace, ProcessLister};
use tracing::{info, warn};

use crate::signals::SignalFlags;

/// How the parent classifies a reaped child's termination (spec §4.F).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildTermination {
    /// Exited 0; promote WAITING/RUNNING to COMPLETE if the child
    /// hadn't already finalized the job itself.
    Normal,
    /// Exited normally with a nonzero code: `"Job exited with exit code N"`.
    ExitCode(i32),
    /// Did not exit normally (signalled/core-dumped): `"Job exited abnormally"`.
    Abnormal,
}

/// Isolates one job's execution in a child OS process obtained by
/// re-executing the current binary (spec §9's sanctioned fork
/// replacement: "substitute a subprocess that receives the serialized
/// job and returns a terminal-status line").
#[derive(Debug)]
pub struct ChildSupervisor {
    exe: PathBuf,
}

impl ChildSupervisor {
    pub fn new(exe: PathBuf) -> Self {
        ChildSupervisor { exe }
    }

    /// Spawn the child, handing it the job over stdin. Returns `Err`
    /// if the platform couldn't spawn a process at all (e.g. resource
    /// exhaustion); the caller falls back to running in-process.
    pub fn spawn(
        &self,
        envelope: &ChildEnvelope,
        redis_uri: &str,
        namespace: &KeyNamespace,
    ) -> std::io::Result<Child> {
        let mut child = Command::new(&self.exe)
            .arg("--internal-run-job")
            .arg(redis_uri)
            .arg(namespace_arg(namespace))
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        let payload = serde_json::to_vec(envelope).expect("ChildEnvelope always encodes");
        if let Some(stdin) = child.stdin.as_mut() {
            let _ = stdin.write_all(&payload);
        }
        child.stdin = None; // close stdin so the child's read() returns EOF

        setproctitle::set_title(format!("resque-worker: Forked {} at {}", child.id(), chrono::Utc::now()));
        info!(pid = child.id(), "forked job");
        Ok(child)
    }

    /// Non-blocking reap loop: polls `try_wait` every `poll_interval`,
    /// pumping and dispatching pending signals between waits (spec
    /// §4.F, §5 — this is one of the three suspension points, bounded
    /// to ≈500ms so signal latency stays bounded). Both the explicit
    /// `KILL-CHILD` (USR1) signal and a TERM/INT-derived `shutdownNow`
    /// kill the in-flight child from here; `pump` must run on every
    /// pass since it's the only place those flags get derived while a
    /// job is in flight.
    pub fn reap(
        &self,
        mut child: Child,
        poll_interval: Duration,
        signals: &SignalFlags,
        lister: &dyn ProcessLister,
    ) -> ChildTermination {
        loop {
            signals.pump();
            // Both use `|` rather than `||` so a `KILL-CHILD` pending
            // alongside a TERM/INT-derived shutdown-now is still consumed
            // this pass, even though one `kill` call covers both.
            if signals.take_shutdown_now() | signals.take_kill_child() {
                self.kill(&mut child, lister, signals);
            }
            match child.try_wait() {
                Ok(Some(status)) => return classify(status),
                Ok(None) => {
                    std::thread::sleep(poll_interval);
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "failed to reap child, treating as abnormal exit");
                    return ChildTermination::Abnormal;
                }
            }
        }
    }

    /// `killChild`: send SIGKILL only when the pid is observable via
    /// process listing; otherwise log and request a graceful shutdown
    /// (spec §4.F, resolving the `ps`-exit-code-1 Open Question in §9
    /// by using [`ProcessLister`] instead of shelling out).
    pub fn kill(&self, child: &mut Child, lister: &dyn ProcessLister, signals: &SignalFlags) {
        if lister.is_alive(child.id()) {
            if let Err(e) = child.kill() {
                warn!(pid = child.id(), error = %e, "failed to kill child");
            }
        } else {
            warn!(pid = child.id(), "child pid not observable, scheduling graceful shutdown");
            signals.request_shutdown();
        }
    }
}

fn namespace_arg(ns: &KeyNamespace) -> String {
    ns.raw().unwrap_or_default()
}

#[cfg(unix)]
fn classify(status: std::process::ExitStatus) -> ChildTermination {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(0) => ChildTermination::Normal,
        Some(code) => ChildTermination::ExitCode(code),
        None => {
            // No exit code means the child was terminated by a signal.
            let _ = status.signal();
            ChildTermination::Abnormal
        }
    }
}

#[cfg(not(unix))]
fn classify(status: std::process::ExitStatus) -> ChildTermination {
    match status.code() {
        Some(0) => ChildTermination::Normal,
        Some(code) => ChildTermination::ExitCode(code),
        None => ChildTermination::Abnormal,
    }
}

/// What the child needs to execute the job on its own: the payload,
/// which worker it's running on behalf of, and when the parent bound
/// the job (so the child's terminal status carries the same
/// `started_at` the parent would have used).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ChildEnvelope {
    pub payload: resque_core::JobPayload,
    pub worker: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl ChildEnvelope {
    pub fn worker_id(&self) -> Result<WorkerId, resque_core::CoreError> {
        WorkerId::parse(&self.worker)
    }
}
