/// PTY (Pseudo Terminal) handling for the web terminal backend
/// This module provides a trait abstraction for different PTY implementations
/// with a focus on pure async operations
mod memory_pty;
mod output_buffer;
mod portable_pty_impl;
mod pty_trait;
mod tokio_process_pty_impl;

use std::sync::Arc;

use crate::config::PtyBackend;

// Export all public types and traits
pub use memory_pty::MemoryPtyFactory;
pub use portable_pty_impl::PortablePtyFactory;
pub use pty_trait::*;
pub use tokio_process_pty_impl::TokioProcessPtyFactory;

/// Select the factory for the configured backend
pub fn pty_factory_for(backend: PtyBackend) -> Arc<dyn PtyFactory> {
    match backend {
        PtyBackend::Portable => Arc::new(PortablePtyFactory),
        PtyBackend::Process => Arc::new(TokioProcessPtyFactory),
        PtyBackend::Memory => Arc::new(MemoryPtyFactory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_matches_backend() {
        assert_eq!(pty_factory_for(PtyBackend::Portable).name(), "portable-pty");
        assert_eq!(pty_factory_for(PtyBackend::Process).name(), "tokio-process");
        assert_eq!(pty_factory_for(PtyBackend::Memory).name(), "memory-pty");
    }
}
