pub mod access;
pub mod config;
pub mod error;

pub use access::*;
pub use config::SchedulerConfig;
pub use error::*;
