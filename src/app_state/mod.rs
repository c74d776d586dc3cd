/// Application state and session storage
mod app_state;
mod repository;
mod session;

pub use app_state::AppState;
pub use repository::{InMemorySessionRepository, SessionRepository};
pub use session::{NewSession, SessionStatus, TerminalSession, now_millis};
