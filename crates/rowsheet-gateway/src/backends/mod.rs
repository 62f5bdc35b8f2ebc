pub mod memory;

#[cfg(feature = "google")]
pub mod google;

pub use memory::{MemoryStore, Operation};

#[cfg(feature = "google")]
pub use google::GoogleSheets;
