//! Persistent code graph indexer with SQLite-backed storage and
//! importance-ranked retrieval.
//!
//! Binary crate entry point. All CLI logic is in the `cli` module; the engine
//! itself lives in the `codegraph` library crate.

mod cli;

fn main() {
    std::process::exit(cli::run());
}
