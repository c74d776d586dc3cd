/// Server management
mod server;

pub use server::{
    build_router, run_server_with_graceful_shutdown, start_expiry_reaper, start_webtransport_service,
};
