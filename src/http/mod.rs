//! HTTP/1.1 wire layer shared by the server and the client.
//!
//! - **`connection`**: per-connection request/response state machine
//! - **`parser`**: incremental request parser over a byte buffer
//! - **`request`**: the request handed to route handlers
//! - **`response`**: response builder with one-shot sealing
//! - **`writer`**: wire rendering of responses and the write loop
//! - **`encoding`**: the configured text encoding (Latin-1, ASCII, UTF-8)
//! - **`mime`**: content kinds and their MIME strings
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← parse buffered bytes, read more when short
//!        └──────┬──────┘
//!               │ message framed (or rejected)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← run the route handler / prebuilt response
//!        └──────┬───────────┘
//!               │ response sealed
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │
//!        └──────┬───────────┘
//!               ├─ Keep-Alive → Reading (leftover bytes are the next request)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod encoding;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
