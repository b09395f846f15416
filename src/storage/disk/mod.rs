mod disk_manager;
mod log_flusher;

pub use disk_manager::*;
pub use log_flusher::*;
