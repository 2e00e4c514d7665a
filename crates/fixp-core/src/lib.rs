pub mod analysis;
pub mod error;
pub mod fixed_point;
pub mod ir;

// Re-export commonly used items for convenience
pub use tracing;

pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
