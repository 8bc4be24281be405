//! tickos user space
//!
//! The interactive shell and the programs it can launch. Every program is
//! an `async fn(Sys, Vec<String>)`, the same shape the kernel spawns.
//!
//! - **Parser** (`parser`): command lines with redirection and `&`
//! - **Jobs** (`jobs`): background and stopped command lines
//! - **Builtins** (`builtins`): programs spawned as child processes
//! - **Shell** (`shell`): prompt loop, inline builtins and job control

pub mod builtins;
pub mod jobs;
pub mod parser;
pub mod shell;

pub use crate::parser::{parse, ParseError, ParsedCommand};
pub use crate::shell::shell;
