pub mod error;
pub mod types;

pub use error::{HeadshotError, Result};
pub use types::{ResultLocator, SourceImage};
