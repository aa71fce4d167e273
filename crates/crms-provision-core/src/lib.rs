pub mod dates;
pub mod error;
pub mod types;

#[cfg(feature = "stage3")]
pub mod stage3;

pub use error::ProvisionError;
pub use types::*;

/// Standard result type for all provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;
