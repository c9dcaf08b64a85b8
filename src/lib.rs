//! jsh: an embeddable scripting shell.
//!
//! A shell line becomes either an in-process call against the live shell
//! state or a freshly spawned copy of this binary. The child receives its
//! whole execution context (code, args, env, mounts) through a one-shot
//! encrypted transport file whose key arrives on an inherited pipe, never
//! through its argv or environment.
include!(concat!(env!("OUT_DIR"), "/translations.rs"));

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Set by the interrupt listener; checked by the pipeline executor.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod engine;
pub mod models;
pub mod system;
pub mod vfs;
