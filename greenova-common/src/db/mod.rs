//! Database initialization and connection helpers

pub mod init;

pub use init::*;
