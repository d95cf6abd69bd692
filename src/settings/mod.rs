//! Settings come from a TOML file (`--settings`, or the build-profile default)
//! layered with `VIDTUBE__*` environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
