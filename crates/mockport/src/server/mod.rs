//! Mock server lifecycle: listeners, TLS and the server registry.

mod manager;
mod tls;
mod types;

pub use manager::ServerManager;
pub use tls::build_tls_acceptor;
pub use types::{ServerError, ServerState, ServerStatus};
