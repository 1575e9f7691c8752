pub mod client;
pub mod error;

pub use client::{ApiClient, LogStream};
pub use error::{ApiError, ApiResult};
