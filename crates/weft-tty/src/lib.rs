#![deny(unsafe_code)]
//! Native terminal control for Weft.
//!
//! This crate owns every raw OS touchpoint of the runtime: switching the
//! controlling terminal into raw mode and back, interruptible stdin reads
//! with monotonic timeouts, termination-signal interception behind a
//! single-slot shutdown hook, and resize notification. Decoding the byte
//! stream into key events lives in `weft-core`; this crate produces the
//! bytes and the lifecycle guarantees around them (Unix-first; Windows has
//! raw-mode support, with console-control integration deferred).
//!
//! ## Concurrency roles
//!
//! | Role            | Runs on                      | May block on           |
//! |-----------------|------------------------------|------------------------|
//! | Reader          | caller's input thread        | `poll(2)` over stdin   |
//! | Signal recorder | any thread (signal context)  | nothing                |
//! | Watcher         | dedicated thread             | self-pipe read         |
//! | Shutdown hook   | the body's calling thread    | caller's own cleanup   |
//!
//! The raw-mode snapshot slot and the shutdown-hook slot are process-wide
//! single-owner resources. A second concurrent tenant fails fast rather
//! than queueing; contention on either is a programming error.

pub mod raw_mode;
pub mod resize;
pub mod shutdown;
pub mod signals;
pub mod stdin;

pub use raw_mode::{RawModeHandle, enable_raw_mode};
pub use resize::{ResizeWatcher, terminal_size};
pub use shutdown::{ShutdownToken, run_with_shutdown_hook};
pub use signals::{SignalWatcher, pending_signal};
pub use stdin::{StdinReader, StdinWriter};
