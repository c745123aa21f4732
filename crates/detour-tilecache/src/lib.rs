//! Compressed tile caching for navigation meshes
//!
//! This crate keeps navigation mesh tiles in compressed form and rebuilds
//! them into a Detour [`detour::NavMesh`] on demand. A whole world can be
//! stored in a tile-cache-set file and loaded with a [`TileCacheSetLoader`].
//!
//! # Example
//!
//! ```rust,ignore
//! use detour_tilecache::{AreaFlagsMeshProcess, Lz4Compressor, TileCacheSetLoader};
//!
//! let world = TileCacheSetLoader::new()
//!     .with_compressor(Lz4Compressor)
//!     .with_mesh_process(AreaFlagsMeshProcess)
//!     .load("world.tset")?;
//! println!("{} tiles", world.nav_mesh.tile_count());
//! ```
//!
//! # Architecture
//!
//! - [`TileCache`]: holds compressed tiles and builds mesh tiles from them
//! - [`TileCacheCompressor`]: restores tile payloads
//! - [`TileCacheMeshProcess`]: adjusts rebuilt tiles, e.g. polygon flags
//! - [`LinearAllocator`]: scratch memory reused by every build

pub mod tile_cache;
pub mod tile_cache_alloc;
pub mod tile_cache_compressor;
pub mod tile_cache_data;
pub mod tile_cache_mesh_process;
pub mod tile_cache_set;


pub use tile_cache::*;
pub use tile_cache_alloc::*;
pub use tile_cache_compressor::*;
pub use tile_cache_data::*;
pub use tile_cache_mesh_process::*;
pub use tile_cache_set::*;
