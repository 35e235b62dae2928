//! Command-line entry point: runs the worker loop, or — when invoked
//! with the hidden `--internal-run-job` verb — acts as the child
//! process a [`resque_worker::ChildSupervisor`] spawns to execute one
//! job (spec §4.F's fork-equivalent primitive).

use std::io::Read;
use std::time::Duration;

use clap::Parser;
use resque_redis::{ProcfsProcessLister, ReservationMode};
use resque_worker::{ChildEnvelope, JobClassRegistry, NoopHooks, Perform, SignalFlags, Worker, WorkerConfig};
use serde_json::Value;
use tracing::error;

/// Internal verb used by the child supervisor; not part of the public
/// CLI surface and deliberately undocumented in `--help`.
const INTERNAL_RUN_JOB: &str = "--internal-run-job";

#[derive(Parser, Debug)]
#[command(name = "resque-worker", about = "Redis-backed background job worker")]
struct Cli {
    /// Comma-separated queue names, in priority order. `*` expands to
    /// every known queue, lexically sorted, re-evaluated every poll.
    #[arg(long, value_delimiter = ',', required = true)]
    queues: Vec<String>,

    /// Seconds between polls in polled mode, or the BLPOP timeout in
    /// blocking mode. `0` runs a single pass and exits (test mode).
    #[arg(long, default_value_t = 5.0)]
    interval: f64,

    /// Use a single atomic multi-key BLPOP instead of round-robin polling.
    #[arg(long)]
    blocking: bool,

    /// Process exactly this many jobs, then exit cleanly.
    #[arg(long)]
    count: Option<u64>,

    #[arg(long, default_value = "redis://127.0.0.1/", env = "REDIS_URL")]
    redis_url: String,

    /// Key namespace prefix. Empty preserves the legacy Resque key
    /// layout byte-for-byte.
    #[arg(long, default_value = "")]
    namespace: String,
}

fn main() {
    let mut raw_args = std::env::args();
    let exe = raw_args.next().unwrap_or_else(|| "resque-worker".to_string());

    let args: Vec<String> = raw_args.collect();
    if args.first().map(String::as_str) == Some(INTERNAL_RUN_JOB) {
        std::process::exit(run_internal(&args[1..]));
    }

    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let registry = demo_job_classes();
    let signals = SignalFlags::register().expect("failed to install signal handlers");
    let host = local_hostname();
    let namespace = resque_redis::KeyNamespace::from_raw(&cli.namespace);

    let config = WorkerConfig {
        queues: cli.queues,
        mode: if cli.blocking { ReservationMode::Blocking } else { ReservationMode::Polled },
        interval: Duration::from_secs_f64(cli.interval.max(0.0)),
        redis_uri: cli.redis_url,
        namespace,
        count: cli.count,
        parent_pid: None,
    };

    let hooks = NoopHooks;
    let mut worker = Worker::new(
        host,
        config,
        Box::new(registry),
        &hooks,
        signals,
        Box::new(ProcfsProcessLister),
        std::path::PathBuf::from(exe),
    )
    .expect("failed to build redis gateway");

    if let Err(e) = worker.run() {
        error!(error = %e, "worker loop exited with an error");
        std::process::exit(1);
    }
}

/// `--internal-run-job <redis_uri> <namespace>`: read a [`ChildEnvelope`]
/// from stdin, run it, and exit 0 whether the job itself succeeded or
/// failed (both are already recorded in Redis by
/// [`resque_worker::run_job_in_child`]; only a crash in this function
/// before that point should produce a nonzero/abnormal exit for the
/// parent to classify as a dirty exit).
fn run_internal(args: &[String]) -> i32 {
    let [redis_uri, namespace] = args else {
        eprintln!("{INTERNAL_RUN_JOB} requires <redis_uri> <namespace>");
        return 2;
    };

    let mut buf = Vec::new();
    if let Err(e) = std::io::stdin().read_to_end(&mut buf) {
        eprintln!("failed to read job envelope from stdin: {e}");
        return 1;
    }
    let envelope: ChildEnvelope = match serde_json::from_slice(&buf) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("failed to decode job envelope: {e}");
            return 1;
        }
    };

    let registry = demo_job_classes();
    match resque_worker::run_job_in_child(envelope, redis_uri, namespace, &registry) {
        Ok(_job_failed) => 0,
        Err(e) => {
            eprintln!("job execution failed before a status could be recorded: {e}");
            1
        }
    }
}

/// Demonstration job classes exercising the end-to-end scenarios of
/// spec §8: a job that always succeeds and one that always raises.
fn demo_job_classes() -> JobClassRegistry {
    let mut registry = JobClassRegistry::new();
    registry.register("Echo", || Echo);
    registry.register("Boom", || Boom);
    registry
}

struct Echo;
impl Perform for Echo {
    fn perform(&mut self, args: Vec<Value>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Value::Array(args))
    }
}

struct Boom;
impl Perform for Boom {
    fn perform(&mut self, _args: Vec<Value>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err("Boom job always fails".into())
    }
}

#[cfg(unix)]
fn local_hostname() -> String {
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..nul]).into_owned()
}

#[cfg(not(unix))]
fn local_hostname() -> String {
    "localhost".to_string()
}
