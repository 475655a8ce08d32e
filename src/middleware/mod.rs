pub mod auth;
pub mod rate;

pub use auth::{auth_middleware, AuthAccount};
pub use rate::rate_limit_middleware;
