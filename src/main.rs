//! arbordb CLI entry point
//!
//! Fatal errors are printed to stderr as an error envelope and the process
//! exits non-zero. All logic lives in the CLI module.

use arbordb::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", cli::error_response(e.code_str(), e.message()));
        std::process::exit(1);
    }
}
