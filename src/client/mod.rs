//! Client side: a single outbound connection with a connect-retry loop and
//! strictly serialized request/response exchanges.

pub mod connection;
pub mod reader;

pub use connection::{Client, build_request};
pub use reader::{ResponseError, ResponseReader};
