//! `tiltscan-runtime` – sweep execution and the scan service.
//!
//! # Modules
//!
//! - [`sampler`] – [`RangeSampler`][sampler::RangeSampler]: bounded retry,
//!   median smoothing and outlier gating over a `DistanceSource`.
//! - [`scheduler`] – [`SweepPlan`][scheduler::SweepPlan] (snake pose order)
//!   and [`SweepScheduler`][scheduler::SweepScheduler] (drives the rig,
//!   samples, projects).
//! - [`progress`] – [`ProgressTracker`][progress::ProgressTracker]: atomic
//!   counters readable while a sweep runs.
//! - [`pipeline`] – [`reconstruct`][pipeline::reconstruct]: ground fit →
//!   flatten → height grid → mesh.
//! - [`session`] – [`ScanService`][session::ScanService]: one sweep at a time
//!   on a worker thread, with [`ScanSession`][session::ScanSession] results.
//! - [`export`] – atomic artifact writers.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with optional OTLP export.

pub mod export;
pub mod pipeline;
pub mod progress;
pub mod sampler;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use pipeline::{Reconstruction, reconstruct};
pub use progress::ProgressTracker;
pub use sampler::{RangeSampler, SampleOutcome};
pub use scheduler::{SweepPlan, SweepScheduler};
pub use session::{ScanHardware, ScanService, ScanSession, ServiceConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
