use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGCONT, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};

/// Replaces the original signal-driven control plane (spec §9 Design
/// Note) with a cancellation token plus a small set of atomic flags
/// polled at the three suspension points of spec §5. The raw
/// `signal_hook::flag` registrations only ever perform a signal-safe
/// store; everything that runs arbitrary code (logging, killing the
/// child, toggling `paused`) happens later when the worker loop
/// [`SignalFlags::pump`]s the raw flags into derived state.
#[derive(Clone)]
pub struct SignalFlags {
    term_or_int: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
    kill_child: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    resume: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    shutdown_now: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl SignalFlags {
    /// Install handlers for TERM, INT, QUIT, USR1, USR2 and CONT
    /// (spec §4.G's signal table).
    pub fn register() -> io::Result<Self> {
        let term_or_int = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&term_or_int))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&term_or_int))?;

        let quit = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGQUIT, Arc::clone(&quit))?;

        let kill_child = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGUSR1, Arc::clone(&kill_child))?;

        let pause = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGUSR2, Arc::clone(&pause))?;

        let resume = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGCONT, Arc::clone(&resume))?;

        Ok(SignalFlags {
            term_or_int,
            quit,
            kill_child,
            pause,
            resume,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_now: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build a set of flags with no OS signal handlers installed, for
    /// unit tests that drive state purely programmatically.
    pub fn detached() -> Self {
        SignalFlags {
            term_or_int: Arc::new(AtomicBool::new(false)),
            quit: Arc::new(AtomicBool::new(false)),
            kill_child: Arc::new(AtomicBool::new(false)),
            pause: Arc::new(AtomicBool::new(false)),
            resume: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_now: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fold raw signal-safe flags into derived state. Call at every
    /// suspension point (top of the loop, inside the child-reap poll).
    pub fn pump(&self) {
        if self.term_or_int.load(Ordering::SeqCst) {
            self.shutdown.store(true, Ordering::SeqCst);
            self.shutdown_now.store(true, Ordering::SeqCst);
        }
        if self.quit.load(Ordering::SeqCst) {
            self.shutdown.store(true, Ordering::SeqCst);
        }
        if self.pause.swap(false, Ordering::SeqCst) {
            self.paused.store(true, Ordering::SeqCst);
        }
        if self.resume.swap(false, Ordering::SeqCst) {
            self.paused.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// One-shot: true the first time it's observed after TERM/INT,
    /// so the loop kills an in-flight child exactly once per signal.
    pub fn take_shutdown_now(&self) -> bool {
        self.shutdown_now.swap(false, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn take_kill_child(&self) -> bool {
        self.kill_child.swap(false, Ordering::SeqCst)
    }

    /// Programmatic equivalent of QUIT, used by the orphan-parent check
    /// and by `killChild` when the pid isn't observable (spec §4.F, §7).
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Test/ops hook mirroring `pauseProcessing`.
    pub fn pause_now(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Test/ops hook mirroring `unPauseProcessing`.
    pub fn resume_now(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_then_resume_is_idempotent() {
        let flags = SignalFlags::detached();
        flags.pause_now();
        flags.pause_now();
        assert!(flags.is_paused());
        flags.resume_now();
        flags.resume_now();
        assert!(!flags.is_paused());
    }

    #[test]
    fn request_shutdown_is_idempotent() {
        let flags = SignalFlags::detached();
        flags.request_shutdown();
        flags.request_shutdown();
        assert!(flags.is_shutdown());
    }
}
