//! Breadcrumbs and tree materialisation.

pub mod service;

pub use service::TreeService;
