pub mod session;
pub mod token;

pub use session::{clear_session_cookie, session_cookie, CurrentUser, MaybeUser, SESSION_COOKIE};
pub use token::{Role, SessionClaims, TokenService};
