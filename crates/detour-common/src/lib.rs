//! Common utilities shared by the Detour crates
//!
//! Holds the error and status types every crate reports through, plus the
//! small vector and 2-D geometry helpers the navigation mesh, the query engine
//! and the tile cache all need.

mod geometry;
mod math;
mod status;

pub use geometry::*;
pub use math::*;
pub use status::*;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("detour error: {0}")]
    Detour(Status),

    #[error("tile cache error: {0}")]
    TileCache(Status),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the Detour/tile cache status carried by this error, if any
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Detour(status) | Error::TileCache(status) => Some(*status),
            _ => None,
        }
    }
}

/// Result type for Detour operations
pub type Result<T> = std::result::Result<T, Error>;
