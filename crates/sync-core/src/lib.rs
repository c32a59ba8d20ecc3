//! Reconciliation engine for the GitOps sync daemon.
//!
//! Wires [`sync_git`], [`sync_process`] (via [`sync_retry`] for the health
//! prober's backoff schedule), and [`sync_events`]/[`sync_state`] into the
//! components the daemon runs each cycle: the release driver ([`release`]),
//! the health prober ([`health`]), the reconciliation state machine
//! ([`engine`]), and the result reporter ([`reporter`]). [`service`] drives
//! the long-running loop the CLI starts.

pub mod engine;
pub mod health;
pub mod release;
pub mod reporter;
pub mod service;

pub use engine::Engine;
pub use reporter::{HumanReporter, JsonReporter, Reporter};
