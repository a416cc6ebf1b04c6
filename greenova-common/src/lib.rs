//! # Greenova Common Library
//!
//! Shared code for the Greenova obligation tools:
//! - Obligation, mechanism and project models
//! - Normalization of free-text import values
//! - Obligation validation and identifier repair
//! - Mechanism status aggregation
//! - SQLite storage behind a repository interface
//! - CSV import/export and dashboard analytics
//! - Configuration loading

pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod normalize;
pub mod repository;
pub mod service;
pub mod time;
pub mod validate;

pub use error::{Error, Result};
pub use models::{Mechanism, Obligation, Project, ProjectRole, Status};
pub use validate::FieldErrors;
