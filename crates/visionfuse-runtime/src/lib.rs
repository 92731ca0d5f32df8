//! `visionfuse-runtime` – the two periodic tasks and their scheduling.
//!
//! # Modules
//!
//! - [`vision_task`] – [`VisionTask`]: polls every vision source, scores
//!   each result against the latest motion state, and pushes accepted
//!   observations into the exchange.
//! - [`drive_task`] – [`DriveTask`]: advances the drivetrain, drains every
//!   source buffer in configured order, applies the corrections, and
//!   publishes a fresh motion state.
//! - [`scheduler`] – [`spawn_periodic`]: runs a task on the Tokio runtime
//!   at a fixed period until shutdown.
//! - [`telemetry`] – [`init_tracing`]: installs the `tracing` subscriber
//!   with an optional OTLP span exporter.
//!
//! The two tasks share nothing but an `Arc<ExchangeRegistry>`; neither
//! ever waits on the other.

pub mod drive_task;
pub mod scheduler;
pub mod telemetry;
pub mod vision_task;

pub use drive_task::{DriveStats, DriveTask};
pub use scheduler::{PeriodicTask, shutdown_channel, spawn_periodic};
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing};
pub use vision_task::{VisionCycle, VisionStats, VisionTask};
