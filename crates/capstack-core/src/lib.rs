pub mod backsolve;
pub mod breakpoints;
pub mod captable;
pub mod error;
pub mod math;
pub mod opm;
pub mod types;

pub use error::CapstackError;
pub use types::*;

/// Standard result type for all capstack operations
pub type CapstackResult<T> = Result<T, CapstackError>;
