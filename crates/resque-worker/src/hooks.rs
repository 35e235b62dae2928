use resque_core::{FailureCause, JobPayload, WorkerId};
use tracing::error;

/// Named dispatch points (spec §6): handlers are side-effect-only, and
/// an exception from a handler is logged but never aborts the worker
/// loop.
pub trait Hooks: Send + Sync {
    fn before_first_fork(&self, _worker: &WorkerId) {}
    fn before_fork(&self, _worker: &WorkerId, _job: &JobPayload) {}
    fn after_fork(&self, _worker: &WorkerId, _job: &JobPayload) {}
    fn on_failure(&self, _worker: &WorkerId, _job: &JobPayload, _cause: &FailureCause) {}
}

/// A no-op implementation, used when the operator hasn't wired up
/// anything fancier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// Runs a hook call, catching a panic inside the handler so it cannot
/// take down the worker loop (spec §6: "exceptions from handlers do
/// not abort the worker loop but are logged").
pub fn dispatch(label: &'static str, f: impl FnOnce() + std::panic::UnwindSafe) {
    if let Err(_payload) = std::panic::catch_unwind(f) {
        error!(hook = label, "event hook panicked");
    }
}
