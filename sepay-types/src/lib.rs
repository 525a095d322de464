//! Payload types for sepay

pub mod error;
pub mod fields;
pub mod transaction;

pub use error::{Error, Result};
pub use fields::Fields;
pub use transaction::TransactionRequest;
