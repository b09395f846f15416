mod buffer_pool_manager;
mod clock_replacer;
mod page_guard;
mod replacer;

pub use buffer_pool_manager::*;
pub use clock_replacer::*;
pub use page_guard::*;
pub use replacer::*;
