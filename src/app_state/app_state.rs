/// Application state: the composition root shared by every handler
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::app_state::{InMemorySessionRepository, SessionRepository};
use crate::config::TerminalConfig;
use crate::pty::{PtyFactory, pty_factory_for};
use crate::service::{ProcessFactory, ProcessManager, SessionFactory, SessionHandler, SessionService};

/// Application state containing shared data across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<TerminalConfig>,
    pub session_service: Arc<SessionService>,
    pub process_manager: Arc<ProcessManager>,
    pub session_handler: Arc<SessionHandler>,
    /// Cancelled once on shutdown; every stream runs under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the service graph with the in-memory repository and the configured PTY backend
    pub fn new(config: TerminalConfig) -> Self {
        let pty_factory = pty_factory_for(config.pty_backend);
        Self::with_components(config, Arc::new(InMemorySessionRepository::default()), pty_factory)
    }

    /// Wire the service graph around the given storage and PTY backend
    pub fn with_components(
        config: TerminalConfig,
        repository: Arc<dyn SessionRepository>,
        pty_factory: Arc<dyn PtyFactory>,
    ) -> Self {
        let config = Arc::new(config);
        let shutdown = CancellationToken::new();

        let session_factory = SessionFactory::new(Arc::clone(&config));
        let process_factory = ProcessFactory::new(Arc::clone(&config), pty_factory);
        let process_manager = Arc::new(ProcessManager::new(process_factory));
        let session_service = Arc::new(SessionService::new(
            repository,
            session_factory,
            Arc::clone(&process_manager),
        ));
        let session_handler = Arc::new(SessionHandler::new(
            Arc::clone(&session_service),
            Arc::clone(&process_manager),
            shutdown.clone(),
        ));

        Self {
            config,
            session_service,
            process_manager,
            session_handler,
            shutdown,
        }
    }
}
