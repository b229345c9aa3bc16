// MediaHub Import - Library Entry Point

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod import;
pub mod source;

pub use config::{DestinationTarget, EngineOptions, ImportConfig, RunMode, TieBreak};
pub use error::{ImportError, Result};
pub use import::{run_import, ImportReport};
