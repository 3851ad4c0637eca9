//! Book lending server
//!
//! A REST JSON API for a small lending library: a catalog of books, users who
//! borrow and return them, and a background sweeper that flags loans kept past
//! the loan period.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<services::Services>,
}
