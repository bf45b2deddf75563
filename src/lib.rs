//! A small HTTP/1.0 static file server.
//!
//! Each connection carries exactly one GET request. The named file beneath the root directory is
//! sent back as `text/html`; anything that can't be served gets a 404. The connection is then
//! closed.

pub mod connection;
pub mod parser;
pub mod registry;
pub mod response;
pub mod server;
pub mod uri;

pub use parser::{ParseResult, Request, RequestParser};
pub use response::{Header, Response};
pub use server::{Server, ServerConfig};
pub use uri::sanitize_uri;
