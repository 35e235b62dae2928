#![warn(missing_debug_implementations, rust_2018_idioms)]
//! Redis-backed gateway, queue reservation, status store, worker
//! registry and stats (spec components A, C, D, E, H).

mod gateway;
mod keys;
mod process_lister;
mod producer;
mod registry;
mod reservation;
mod stats;
mod status_store;

pub use gateway::{GatewayError, RedisGateway};
pub use keys::KeyNamespace;
pub use process_lister::{ProcessLister, ProcfsProcessLister};
pub use producer::Producer;
pub use registry::{WorkerCurrentJob, WorkerRegistry};
pub use reservation::{ReservationMode, Reserver};
pub use stats::{Stats, StatsSnapshot};
pub use status_store::{StatusStore, DEFAULT_STATUS_TTL};
