pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use rate_limit::{
    IpRateLimiter, UnkeyedRateLimiter, create_ip_rate_limiter, create_unkeyed_rate_limiter,
    ip_rate_limit_middleware, rate_limit_middleware,
};
pub use security_headers::security_headers_middleware;
pub use tracing::{REQUEST_ID_HEADER, request_id_middleware};
