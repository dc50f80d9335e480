//! Blueprint Kernel Library
//!
//! Schema composition for dynamically defined content shapes, plus the
//! typed document index built from those schemas. The `blueprint` binary is
//! a thin admin CLI over this library.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod schema;
pub mod state;

pub use config::Config;
pub use error::{SchemaError, SchemaResult};
pub use state::Kernel;
