pub mod oauth;
pub mod session;
pub mod token;

pub use oauth::OAuthExchange;
pub use session::SessionManager;
pub use token::{Claims, TokenManager};
