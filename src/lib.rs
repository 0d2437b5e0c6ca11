//! Library crate for http-sweep: find local ports that answer HTTP or HTTPS.
pub mod collector;
pub mod config;
pub mod error;
pub mod filter;
pub mod output;
pub mod ports;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod server;
pub mod types;

pub use config::{ScanConfig, ScanOptions};
pub use error::{ConfigError, Error};
pub use scanner::Scanner;
pub use types::{Hit, ScanReport, Scheme};
