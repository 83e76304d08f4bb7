//! Remote content sources and download naming.

pub mod http;
pub mod naming;

pub use http::HttpSource;
