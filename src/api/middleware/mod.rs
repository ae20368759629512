pub mod auth;
pub mod timing;

pub use auth::{TokenAuth, TokenRole};
pub use timing::TimingMiddleware;
