//! CLI module for arbordb
//!
//! One request per invocation against a snapshot file:
//! - write / query / update / delete: JSON request on stdin
//! - sweep: compact a domain's index
//! - stats: collection sizes

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{execute, execute_on_snapshot, load_config, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_response, ok_response, parse_request, read_request, write_error, write_response};
