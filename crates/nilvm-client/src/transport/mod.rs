//! Node transports

pub mod http;

pub use http::{HttpTransport, HttpTransportFactory};
