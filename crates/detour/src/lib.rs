//! Navigation meshes, tile-set loading and pathfinding queries
//!
//! This crate loads Detour navigation mesh tiles, either one at a time or from
//! a static tile-set file, links them into a [`NavMesh`] and answers path
//! queries through a [`NavMeshQuery`]. Long searches can be spread over many
//! frames with a [`SlicedPathSession`].
//!
//! # Example
//!
//! ```rust,ignore
//! use detour::{load_tile_set, FindPathOptions, NavMeshQuery, PolyRef, QueryFilter};
//!
//! let nav_mesh = load_tile_set("world.bin")?;
//! let mut query = NavMeshQuery::new(&nav_mesh, 2048)?;
//! let filter = QueryFilter::default();
//!
//! let (start_ref, start) = query.find_nearest_poly(&[1.0, 0.0, 1.0], &[2.0, 4.0, 2.0], &filter)?;
//! let (end_ref, end) = query.find_nearest_poly(&[9.0, 0.0, 9.0], &[2.0, 4.0, 2.0], &filter)?;
//!
//! let mut session = query.sliced_session();
//! session.init(start_ref, end_ref, &start, &end, &filter, FindPathOptions::empty())?;
//! while session.state().is_in_progress() {
//!     session.update(16)?;
//! }
//! let mut path = [PolyRef::default(); 64];
//! let result = session.finalize(&mut path)?;
//! ```

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub mod nav_mesh;
pub mod nav_mesh_query;
pub mod node_pool;
pub mod query_filter;
pub mod sdk;
pub mod sliced_pathfinding;
pub mod tile_data;
pub mod tile_set;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_mesh_helpers;

#[cfg(test)]
mod nav_mesh_link_tests;
#[cfg(test)]
mod sliced_pathfinding_tests;
#[cfg(test)]
mod tile_set_tests;

pub use detour_common::{Error, Result, Status};
pub use nav_mesh::*;
pub use nav_mesh_query::*;
pub use query_filter::QueryFilter;
pub use sdk::NavMeshSdk;
pub use sliced_pathfinding::*;
pub use tile_data::*;
pub use tile_set::*;

/// Maximum vertices per polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Neighbour entry flag marking a portal to another tile
pub const EXT_LINK: u16 = 0x8000;

/// Null link index
pub const NULL_LINK: u32 = 0xffff_ffff;

/// Number of distinct polygon areas
pub const MAX_AREAS: usize = 64;

/// Off-mesh connection flag: traversable in both directions
pub const OFFMESH_CON_BIDIR: u8 = 1;

/// Heuristic scale used by A*; keeps the heuristic admissible
pub const H_SCALE: f32 = 0.999;

/// Any-angle searches raycast up to this many agent radii from the parent node
pub const RAY_CAST_LIMIT_PROPORTIONS: f32 = 50.0;

/// Reference to a polygon or tile in a navigation mesh
///
/// A zero reference is the null reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(u32);

impl PolyRef {
    /// Creates a new polygon reference
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The null reference
    pub const fn null() -> Self {
        Self(0)
    }

    /// Gets the raw id
    pub const fn id(&self) -> u32 {
        self.0
    }

    /// Checks whether this is the null reference
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for PolyRef {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PolyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tile references share the polygon reference encoding (polygon index 0)
pub type TileRef = PolyRef;

/// Parameters used to construct a navigation mesh
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World-space origin of the tile grid
    pub origin: [f32; 3],
    /// Width of each tile along x
    pub tile_width: f32,
    /// Height of each tile along z
    pub tile_height: f32,
    /// Maximum number of tiles the mesh can hold
    pub max_tiles: i32,
    /// Maximum number of polygons per tile
    pub max_polys_per_tile: i32,
}

impl NavMeshParams {
    /// Serialized size in bytes
    pub const SIZE: usize = 28;

    /// Reads the parameter block from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            origin: [
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
            ],
            tile_width: reader.read_f32::<LittleEndian>()?,
            tile_height: reader.read_f32::<LittleEndian>()?,
            max_tiles: reader.read_i32::<LittleEndian>()?,
            max_polys_per_tile: reader.read_i32::<LittleEndian>()?,
        })
    }

    /// Writes the parameter block to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for v in self.origin {
            writer.write_f32::<LittleEndian>(v)?;
        }
        writer.write_f32::<LittleEndian>(self.tile_width)?;
        writer.write_f32::<LittleEndian>(self.tile_height)?;
        writer.write_i32::<LittleEndian>(self.max_tiles)?;
        writer.write_i32::<LittleEndian>(self.max_polys_per_tile)?;
        Ok(())
    }
}

/// Polygon types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyType {
    /// Regular ground polygon
    Ground = 0,
    /// Two-vertex polygon standing in for an off-mesh connection
    OffMeshConnection = 1,
}

bitflags::bitflags! {
    /// Polygon flags, filtered by [`QueryFilter`]
    ///
    /// The named flags follow the usual sample conventions; any other bit is
    /// preserved as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PolyFlags: u16 {
        /// Ability to walk (ground, grass, road)
        const WALK = 0x01;
        /// Ability to swim (water)
        const SWIM = 0x02;
        /// Ability to move through doors
        const DOOR = 0x04;
        /// Ability to jump
        const JUMP = 0x08;
        /// Disabled polygon
        const DISABLED = 0x10;
        /// All abilities
        const ALL = 0xffff;
    }
}

bitflags::bitflags! {
    /// Flags for tiles added to a navigation mesh
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TileFlags: u8 {
        /// The mesh owns the tile data and drops it when the tile is removed
        const FREE_DATA = 0x01;
    }
}

bitflags::bitflags! {
    /// Options for path searches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FindPathOptions: u8 {
        /// Shortcut over polygon chains with raycasts during expansion
        const ANY_ANGLE = 0x02;
    }
}

bitflags::bitflags! {
    /// Options for raycasts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RaycastOptions: u8 {
        /// Accumulate traversal cost along the ray
        const USE_COSTS = 0x01;
    }
}

bitflags::bitflags! {
    /// Flags attached to straight path vertices
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StraightPathFlags: u8 {
        /// The vertex is the start position
        const START = 0x01;
        /// The vertex is the end position
        const END = 0x02;
        /// The vertex is the start of an off-mesh connection
        const OFFMESH_CONNECTION = 0x04;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poly_ref() {
        assert!(PolyRef::null().is_null());
        assert!(PolyRef::default().is_null());
        let r = PolyRef::new(0x1234);
        assert_eq!(r.id(), 0x1234);
        assert!(!r.is_null());
        assert_eq!(r.to_string(), "4660");
    }

    #[test]
    fn test_nav_mesh_params_layout() {
        let params = NavMeshParams {
            origin: [1.0, 2.0, 3.0],
            tile_width: 32.0,
            tile_height: 16.0,
            max_tiles: 128,
            max_polys_per_tile: 256,
        };
        let mut buf = Vec::new();
        params.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), NavMeshParams::SIZE);
        assert_eq!(&buf[20..24], &128i32.to_le_bytes());

        let read = NavMeshParams::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(read, params);
    }

    #[test]
    fn test_poly_flags_retain_unknown_bits() {
        let flags = PolyFlags::from_bits_retain(0x8001);
        assert!(flags.contains(PolyFlags::WALK));
        assert_eq!(flags.bits(), 0x8001);
    }
}
