pub mod connection;
pub mod handlers;
pub mod routes;

pub use connection::{ClientMessage, ConnectionId, ConnectionManager, OUTBOUND_BUFFER};
pub use routes::{create_routes, AppState};
