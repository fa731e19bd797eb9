pub mod error;
pub mod logging;
pub mod rate_limit;
