pub mod build_info;
pub mod cli;
pub mod collect;
pub mod load_config;
pub mod upload;

pub use cli::{run, Cli, Commands};
