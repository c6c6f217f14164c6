//! Repositories for the data access layer

#[cfg(feature = "memory")]
pub mod memory;
pub mod postgres;
pub mod traits;
