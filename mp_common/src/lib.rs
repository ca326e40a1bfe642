mod cents;

pub mod op;
mod secret;

pub use cents::{Cents, CentsConversionError, DEFAULT_CURRENCY};
pub use secret::Secret;

pub mod helpers;
