pub mod pool;
pub mod rate_limiter;
pub mod transport;

pub use rate_limiter::{LimiterSnapshot, RateLimiter, RatePermit, WindowState};
pub use transport::{HttpResponse, HttpTransport, OutboundRequest, ReqwestTransport, TransportError};
