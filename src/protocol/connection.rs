/// Terminal connection trait for abstracting different transport protocols
use std::fmt::Debug;

use thiserror::Error;

/// 连接错误类型
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// WebSocket 错误
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// WebTransport 错误
    #[error("WebTransport error: {0}")]
    WebTransport(String),

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

/// 连接结果类型
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Terminal connection trait that defines common capabilities for all transport protocols
///
/// Every method takes `&self`: one task receives while another sends on the
/// same connection, so implementations lock each direction separately.
#[async_trait::async_trait]
pub trait TerminalConnection: Send + Sync + Debug {
    /// Send one chunk of terminal output
    async fn send_text(&self, message: &str) -> ConnectionResult<()>;

    /// Receive the next chunk of terminal input
    /// Returns None when the peer closed the connection
    async fn receive(&self) -> Option<ConnectionResult<String>>;

    /// Close the connection. Only the first call does anything.
    async fn close(&self, reason: Option<&str>) -> ConnectionResult<()>;

    /// Get the connection ID
    fn id(&self) -> &str;

    /// Get the connection type
    fn connection_type(&self) -> ConnectionType;
}

/// Connection types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// WebSocket connection
    WebSocket,
    /// WebTransport connection
    WebTransport,
}
