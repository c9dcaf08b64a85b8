// src/core/mod.rs

pub mod history;
pub mod interpreter;
pub mod mount_table;
pub mod parser;
pub mod paths;
pub mod repl;
