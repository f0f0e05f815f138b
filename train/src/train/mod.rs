//! The training worker and its history records.

mod history;
mod single_device;

pub use history::*;
pub use single_device::*;
