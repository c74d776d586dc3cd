/// HTTP, WebSocket and WebTransport entry points
pub mod rest;
pub mod websocket;
pub mod webtransport;
