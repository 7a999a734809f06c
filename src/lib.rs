//! Event Hub Library
//!
//! Event scheduling with accounts, capacity-bounded enrollments and an
//! administrator role. Re-exports modules for the server binary and
//! integration tests.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod services;
pub mod store;

pub use config::Config;
pub use domain::{DomainError, RequestContext};
pub use error::{AppError, AppResult};
pub use services::Services;
