//! Server side: routing table, handler pool and the accept loop.

pub mod listener;
pub mod pool;
pub mod router;

pub use listener::Server;
pub use router::{RouteError, RoutingTable};
