/// Service layer: session use cases, process management and the stream multiplexer
mod error;
mod process_factory;
mod process_manager;
mod resolve;
mod session_factory;
mod session_handler;
mod session_service;

pub use error::{ServiceError, ServiceResult};
pub use process_factory::ProcessFactory;
pub use process_manager::ProcessManager;
pub use session_factory::{CreateSessionParams, SessionFactory};
pub use session_handler::{EndTrigger, MultiplexerState, SessionHandler, SessionOutcome};
pub use session_service::SessionService;
