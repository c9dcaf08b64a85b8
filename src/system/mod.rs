//! # System Interaction Layer
//!
//! Everything that touches OS processes lives here: sealing a context for a
//! child, building the child invocation, running pipelines and reacting to
//! interrupts.
//!
//! ## Modules
//!
//! - **`secret_box`**: one-shot encrypted transport of an execution context
//!   through an owner-only file. The key stays off the disk.
//! - **`launcher`**: builds (but does not start) a re-execution of this
//!   binary for an external command, wired to a fresh transport and a key
//!   descriptor.
//! - **`executor`**: spawns the processes of one pipeline with pipes between
//!   them and waits for the terminal stage, honouring `Ctrl+C`.
//! - **`signals`**: the background listener that turns `Ctrl+C` into a
//!   raised cancellation token.

pub mod executor;
pub mod launcher;
pub mod secret_box;
pub mod signals;
