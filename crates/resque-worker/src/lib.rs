#![warn(missing_debug_implementations, rust_2018_idioms)]
//! Worker loop, signal plane, child supervisor and job execution (spec
//! components B, F, G).

mod child;
mod hooks;
mod job;
mod resolver;
mod signals;
mod worker;

pub use child::{ChildEnvelope, ChildSupervisor, ChildTermination};
pub use hooks::{dispatch, Hooks, NoopHooks};
pub use job::{FailedList, JobRecord};
pub use resolver::{JobClassRegistry, JobClassResolver, Perform};
pub use signals::SignalFlags;
pub use worker::{run_job_in_child, Worker, WorkerConfig};
