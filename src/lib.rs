pub mod analytics;
pub mod config;
pub mod document;
pub mod error;
pub mod http;
pub mod utils;

pub use document::{Document, DocumentSubmitter, PermitRelease, SubmissionResult};
pub use error::{AppError, Result};
pub use http::{RateLimiter, RatePermit};
