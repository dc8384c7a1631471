pub mod cin;
pub mod conf;
pub mod error;
pub mod format;
pub mod pack;
pub mod trans;

pub use error::{GtabError, Result};
