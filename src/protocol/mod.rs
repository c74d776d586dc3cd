/// Transport abstraction for terminal sessions
mod connection;
#[cfg(test)]
pub mod mock_connection;
mod text_codec;
mod websocket_connection;
mod webtransport_connection;

pub use connection::{ConnectionError, ConnectionResult, ConnectionType, TerminalConnection};
pub use text_codec::Utf8ChunkDecoder;
pub use websocket_connection::WebSocketConnection;
pub use webtransport_connection::WebTransportConnection;
