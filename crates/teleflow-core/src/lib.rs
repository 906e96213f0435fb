pub mod declaration;
pub mod error;
pub mod logging;
pub mod path;
pub mod validation;

pub use error::TeleflowError;
pub use validation::{ErrorEntry, ValidationError, ValidationFailure};
