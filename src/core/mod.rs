pub mod error;

pub use error::{CtxError, Result};
