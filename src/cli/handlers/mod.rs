// src/cli/handlers/mod.rs

// One module per internal command family. Every handler has the
// `dispatcher::Handler` signature.

pub mod alias;
pub mod commons;
pub mod env;
pub mod eval;
pub mod help;
pub mod history;
pub mod mounts;
pub mod nav;
