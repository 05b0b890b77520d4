//! Continuous, policy-driven file-tree replicator.
//!
//! A task pairs one source directory with one or more target directories and
//! keeps them congruent one-way, or mutually consistent two-way. A
//! filesystem watcher ([`watcher`]) turns OS events into [`events::FileEvent`]
//! intents; the [`processor`] turns each intent into copy/delete/move
//! [`operation::Operation`]s; a single serialized [`queue`] owns all
//! destructive I/O; a [`runner`] coordinates one task's lifecycle, batch
//! debouncing, and safety gate; a [`manager`] is the process-wide registry
//! wiring runners to the queue's executor; a [`scheduler`] drives periodic
//! full syncs.
//!
//! Desktop UI, tray integration, notifications, and settings dialogs are out
//! of scope — this crate exposes the [`callbacks::ReplicatorCallbacks`] and
//! [`log::LogSink`]/[`log::HistorySink`] contracts they would consume.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod callbacks;
pub mod conflict;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod filter;
pub mod id;
pub mod log;
pub mod manager;
pub mod operation;
pub mod processor;
pub mod queue;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod task;
pub mod watcher;

pub use callbacks::ReplicatorCallbacks;
pub use error::{Error, Result};
pub use manager::TaskManager;
pub use task::{CompareMethod, ConflictStrategy, MonitorMode, SyncMode, Task};
