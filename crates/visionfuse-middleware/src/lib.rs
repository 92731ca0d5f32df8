//! `visionfuse-middleware` – the exchange between the vision and drive tasks.
//!
//! Moves scored vision observations from the producer (vision task) to the
//! consumer (drive task) and carries the drive task's motion state back the
//! other way, without either side ever waiting on the other.
//!
//! # Modules
//!
//! - [`buffer`] – [`SourceBuffer`]: per-source FIFO with an explicit
//!   [`OverflowPolicy`] and traffic counters.
//! - [`exchange`] – [`ExchangeRegistry`]: the closed set of source buffers
//!   plus the lock-free latest [`MotionState`][visionfuse_types::MotionState].

pub mod buffer;
pub mod exchange;

pub use buffer::{BufferStats, OverflowPolicy, PushOutcome, SourceBuffer, DEFAULT_CAPACITY};
pub use exchange::{ExchangeRegistry, ExchangeStats};
