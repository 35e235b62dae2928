//! Platform process discovery, abstracted behind [`ProcessLister`] per
//! the Design Note in spec §9: "abstract behind a 'list pids matching
//! the worker executable on this host' capability."
//!
//! The default implementation reads `/proc` directly rather than
//! shelling out to `ps` and parsing its exit code, sidestepping the
//! `ps`-exit-code-1-means-absent fragility the spec's Open Questions
//! call out.

/// Capability needed by [`crate::registry::WorkerRegistry::prune_dead_workers`]
/// to decide whether a registered pid still belongs to a live process.
pub trait ProcessLister: Send + Sync {
    /// Whether a process with this pid is currently running on this host.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Reads `/proc/<pid>` to answer liveness queries. Available on any
/// Linux host; the registry is otherwise platform-agnostic.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsProcessLister;

impl ProcessLister for ProcfsProcessLister {
    fn is_alive(&self, pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{pid}")).exists()
    }
}
