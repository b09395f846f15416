mod config;
mod error;
mod rwlatch;
mod types;

pub use config::*;
pub use error::*;
pub use rwlatch::*;
pub use types::*;
