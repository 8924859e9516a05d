pub mod archive;
pub mod cluster;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod feed;
pub mod keys;
pub mod log_sanitize;
pub mod logging;
pub mod ops;
pub mod process;
pub mod selector;
pub mod store;

pub use error::{Error, Result};
