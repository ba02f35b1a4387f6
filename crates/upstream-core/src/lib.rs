//! upstream-core: misbehaving upstreams for reverse proxy analysis
//!
//! Each fixture binds one socket (TCP or Unix) and then does one of three things:
//! serve a canned HTTP/1.0 response, accept and never read, or never accept.
//! Pointing an nginx `upstream{}` at a fixture shows how the proxy copes.
//!
//! ## Modules
//! - `transport` - socket setup, listeners and connections
//! - `backlog` - accept queue depth of a TCP listener
//! - `request` - bounded request read and request-line scan
//! - `response` - the canned response and its writer
//! - `server` - the acceptor loop and fixture behaviors
//! - `config` - fixture configuration and the built-in presets

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod backlog;
pub mod config;
pub mod error;
pub mod logging;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

// Re-exports
pub use config::{Behavior, FixtureConfig, Preset};
pub use error::{Error, Result};
pub use request::{Method, RequestHead, RequestLine};
pub use response::{Response, ResponseBuilder, StatusCode};
pub use server::{run_until_ctrl_c, Fixture, FixtureState, FixtureStats};
pub use transport::{Addr, Transport};

pub use tokio_util::sync::CancellationToken;
