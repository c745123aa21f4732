//! Tile cache implementation for Detour
//!
//! The [`TileCache`] keeps compressed tiles in memory and rebuilds
//! navigation mesh tiles from them on request. Each compressed tile is a
//! layer header followed by compressed `DNAV` tile data; a build restores the
//! data into scratch memory, lets the mesh process adjust it and swaps the
//! result into the navigation mesh.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use detour::{MeshTileData, NavMesh, PolyRef, TileFlags, TileRef};
use detour_common::{ilog2, next_pow2, visfinite, Error, Result, Status};

use super::tile_cache_alloc::LinearAllocator;
use super::tile_cache_compressor::TileCacheCompressor;
use super::tile_cache_data::{TileCacheLayerHeader, TILECACHE_LAYER_HEADER_SIZE};
use super::tile_cache_mesh_process::TileCacheMeshProcess;

/// Reference to a compressed tile: salt and tile index, no polygon bits
pub type CompressedTileRef = PolyRef;

bitflags::bitflags! {
    /// Flags of a compressed tile
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompressedTileFlags: u8 {
        /// The cache owns the tile data and drops it when the tile is removed
        const FREE_DATA = 0x01;
    }
}

/// Tile cache parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCacheParams {
    /// Origin of the tile cache
    pub origin: [f32; 3],
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,
    /// Width of a tile in cells
    pub width: i32,
    /// Height of a tile in cells
    pub height: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub max_simplification_error: f32,
    /// Maximum number of compressed tiles
    pub max_tiles: i32,
    /// Maximum number of obstacles
    pub max_obstacles: i32,
}

impl Default for TileCacheParams {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            cs: 0.3,
            ch: 0.2,
            width: 48,
            height: 48,
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: 0.9,
            max_simplification_error: 1.3,
            max_tiles: 128,
            max_obstacles: 128,
        }
    }
}

impl TileCacheParams {
    /// Serialized size in bytes
    pub const SIZE: usize = 52;

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut origin = [0f32; 3];
        reader.read_f32_into::<LittleEndian>(&mut origin)?;
        Ok(Self {
            origin,
            cs: reader.read_f32::<LittleEndian>()?,
            ch: reader.read_f32::<LittleEndian>()?,
            width: reader.read_i32::<LittleEndian>()?,
            height: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            max_simplification_error: reader.read_f32::<LittleEndian>()?,
            max_tiles: reader.read_i32::<LittleEndian>()?,
            max_obstacles: reader.read_i32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for v in self.origin {
            writer.write_f32::<LittleEndian>(v)?;
        }
        writer.write_f32::<LittleEndian>(self.cs)?;
        writer.write_f32::<LittleEndian>(self.ch)?;
        writer.write_i32::<LittleEndian>(self.width)?;
        writer.write_i32::<LittleEndian>(self.height)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        writer.write_f32::<LittleEndian>(self.max_simplification_error)?;
        writer.write_i32::<LittleEndian>(self.max_tiles)?;
        writer.write_i32::<LittleEndian>(self.max_obstacles)?;
        Ok(())
    }
}

/// Slot holding one compressed tile
#[derive(Debug, Clone)]
pub struct CompressedTile {
    /// Header of the tile, `None` while the slot is free
    pub header: Option<TileCacheLayerHeader>,
    /// Salt for generating unique references
    pub salt: u32,
    pub flags: CompressedTileFlags,
    /// Header and compressed payload
    data: Vec<u8>,
    index: usize,
    /// Next free tile in the linked list (used for memory management)
    next: Option<usize>,
}

impl CompressedTile {
    fn empty(index: usize) -> Self {
        Self {
            header: None,
            salt: 1,
            flags: CompressedTileFlags::empty(),
            data: Vec::new(),
            index,
            next: None,
        }
    }

    /// Slot index in the cache
    pub fn index(&self) -> usize {
        self.index
    }

    /// The whole compressed tile, header included
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Compressor output following the header
    pub fn compressed(&self) -> &[u8] {
        self.data.get(TILECACHE_LAYER_HEADER_SIZE..).unwrap_or(&[])
    }
}

/// Tile cache structure
#[derive(Debug)]
pub struct TileCache {
    /// Parameters for the tile cache
    params: TileCacheParams,
    /// Tile slots
    tiles: Vec<CompressedTile>,
    /// Next free tile index
    next_free: Option<usize>,
    /// Tile grid lookup, ordered by location and layer
    pos_lookup: BTreeMap<(i32, i32, i32), usize>,
    tile_bits: u32,
    salt_bits: u32,
    compressor: Box<dyn TileCacheCompressor>,
    mesh_process: Box<dyn TileCacheMeshProcess>,
    /// Scratch memory for builds
    arena: LinearAllocator,
}

impl TileCache {
    /// Creates an empty tile cache
    ///
    /// Fails with `InvalidParam` when the parameters are not usable and with
    /// `OutOfMemory` when the tile slots cannot be allocated.
    pub fn new(
        params: TileCacheParams,
        compressor: Box<dyn TileCacheCompressor>,
        mesh_process: Box<dyn TileCacheMeshProcess>,
        arena: LinearAllocator,
    ) -> Result<Self> {
        if params.max_tiles <= 0 {
            return Err(Error::TileCache(Status::InvalidParam));
        }
        if !visfinite(&params.origin)
            || !(params.cs.is_finite() && params.cs > 0.0)
            || !(params.ch.is_finite() && params.ch > 0.0)
        {
            return Err(Error::TileCache(Status::InvalidParam));
        }

        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let salt_bits = 31u32.min(32 - tile_bits);
        if salt_bits < 10 {
            return Err(Error::TileCache(Status::InvalidParam));
        }

        let max_tiles = params.max_tiles as usize;
        let mut tiles = Vec::new();
        tiles
            .try_reserve_exact(max_tiles)
            .map_err(|_| Error::TileCache(Status::OutOfMemory))?;
        for i in 0..max_tiles {
            let mut tile = CompressedTile::empty(i);
            tile.next = (i + 1 < max_tiles).then_some(i + 1);
            tiles.push(tile);
        }

        Ok(Self {
            params,
            tiles,
            next_free: Some(0),
            pos_lookup: BTreeMap::new(),
            tile_bits,
            salt_bits,
            compressor,
            mesh_process,
            arena,
        })
    }

    pub fn params(&self) -> &TileCacheParams {
        &self.params
    }

    pub fn compressor(&self) -> &dyn TileCacheCompressor {
        self.compressor.as_ref()
    }

    pub fn arena(&self) -> &LinearAllocator {
        &self.arena
    }

    /// Number of tiles held
    pub fn tile_count(&self) -> usize {
        self.pos_lookup.len()
    }

    /// Iterates the occupied slots in index order
    pub fn tiles(&self) -> impl Iterator<Item = &CompressedTile> {
        self.tiles.iter().filter(|t| t.header.is_some())
    }

    pub fn encode_tile_id(&self, salt: u32, index: u32) -> CompressedTileRef {
        PolyRef::new((salt << self.tile_bits) | index)
    }

    pub fn decode_tile_id_salt(&self, reference: CompressedTileRef) -> u32 {
        let salt_mask = (1u32 << self.salt_bits) - 1;
        (reference.id() >> self.tile_bits) & salt_mask
    }

    pub fn decode_tile_id_tile(&self, reference: CompressedTileRef) -> u32 {
        let tile_mask = (1u32 << self.tile_bits) - 1;
        reference.id() & tile_mask
    }

    /// Adds a compressed tile
    ///
    /// Fails with `WrongMagic`/`WrongVersion` for foreign data,
    /// `AlreadyOccupied` when a tile already sits at the same location and
    /// layer, and `OutOfMemory` when every slot is taken.
    pub fn add_tile(
        &mut self,
        data: Vec<u8>,
        flags: CompressedTileFlags,
    ) -> Result<CompressedTileRef> {
        let header = TileCacheLayerHeader::from_bytes(&data)?;
        let location = (header.tx, header.ty, header.tlayer);
        if self.pos_lookup.contains_key(&location) {
            log::warn!(
                "Compressed tile ({}, {}, {}) is already cached",
                header.tx,
                header.ty,
                header.tlayer
            );
            return Err(Error::TileCache(Status::AlreadyOccupied));
        }

        let index = self
            .next_free
            .ok_or(Error::TileCache(Status::OutOfMemory))?;
        let tile = &mut self.tiles[index];
        self.next_free = tile.next.take();
        tile.header = Some(header);
        tile.data = data;
        tile.flags = flags;
        let salt = tile.salt;
        self.pos_lookup.insert(location, index);

        let tile_ref = self.encode_tile_id(salt, index as u32);
        log::debug!(
            "Cached compressed tile ({}, {}, {}) as {}",
            location.0,
            location.1,
            location.2,
            tile_ref
        );
        Ok(tile_ref)
    }

    /// Removes a compressed tile
    ///
    /// Returns the tile data when it was added without
    /// `CompressedTileFlags::FREE_DATA`.
    pub fn remove_tile(&mut self, tile_ref: CompressedTileRef) -> Result<Option<Vec<u8>>> {
        if tile_ref.is_null() {
            return Err(Error::TileCache(Status::InvalidParam));
        }
        let index = self.decode_tile_id_tile(tile_ref) as usize;
        let salt = self.decode_tile_id_salt(tile_ref);
        let salt_mask = (1u32 << self.salt_bits) - 1;

        let tile = self
            .tiles
            .get_mut(index)
            .ok_or(Error::TileCache(Status::InvalidParam))?;
        let header = match tile.header.take() {
            Some(header) if tile.salt == salt => header,
            other => {
                tile.header = other;
                return Err(Error::TileCache(Status::InvalidParam));
            }
        };

        let data = std::mem::take(&mut tile.data);
        let owned = !tile.flags.contains(CompressedTileFlags::FREE_DATA);
        tile.flags = CompressedTileFlags::empty();

        // Update salt, salt should never be zero
        tile.salt = (tile.salt + 1) & salt_mask;
        if tile.salt == 0 {
            tile.salt += 1;
        }
        tile.next = self.next_free;
        self.next_free = Some(index);
        self.pos_lookup
            .remove(&(header.tx, header.ty, header.tlayer));

        log::debug!(
            "Removed compressed tile ({}, {}, {})",
            header.tx,
            header.ty,
            header.tlayer
        );
        Ok(owned.then_some(data))
    }

    /// Gets the tile at a grid location and layer
    pub fn get_tile_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<&CompressedTile> {
        self.pos_lookup
            .get(&(tx, ty, tlayer))
            .map(|&i| &self.tiles[i])
    }

    /// References of all layers at a grid location, ordered by layer
    pub fn get_tiles_at(&self, tx: i32, ty: i32) -> Vec<CompressedTileRef> {
        self.pos_lookup
            .range((tx, ty, i32::MIN)..=(tx, ty, i32::MAX))
            .map(|(_, &i)| self.get_tile_ref(&self.tiles[i]))
            .collect()
    }

    /// Resolves a reference, `None` when it is stale or out of range
    pub fn get_tile_by_ref(&self, tile_ref: CompressedTileRef) -> Option<&CompressedTile> {
        if tile_ref.is_null() {
            return None;
        }
        let index = self.decode_tile_id_tile(tile_ref) as usize;
        let salt = self.decode_tile_id_salt(tile_ref);
        self.tiles
            .get(index)
            .filter(|t| t.header.is_some() && t.salt == salt)
    }

    pub fn get_tile_ref(&self, tile: &CompressedTile) -> CompressedTileRef {
        self.encode_tile_id(tile.salt, tile.index as u32)
    }

    /// Builds compressed tile bytes from a layer header and `DNAV` tile data
    ///
    /// The header's `data_size` is set to the payload length.
    pub fn compress_tile(&self, header: &TileCacheLayerHeader, payload: &[u8]) -> Result<Vec<u8>> {
        let mut header = header.clone();
        header.data_size =
            u32::try_from(payload.len()).map_err(|_| Error::TileCache(Status::InvalidParam))?;

        let mut bytes = header.to_bytes();
        let bound = self.compressor.max_compressed_size(payload.len());
        bytes.resize(TILECACHE_LAYER_HEADER_SIZE + bound, 0);
        let written = self
            .compressor
            .compress(payload, &mut bytes[TILECACHE_LAYER_HEADER_SIZE..])?;
        bytes.truncate(TILECACHE_LAYER_HEADER_SIZE + written);
        Ok(bytes)
    }

    /// Builds navigation mesh tiles for every layer at a grid location
    pub fn build_nav_mesh_tiles_at(
        &mut self,
        tx: i32,
        ty: i32,
        nav_mesh: &mut NavMesh,
    ) -> Result<()> {
        for tile_ref in self.get_tiles_at(tx, ty) {
            self.build_nav_mesh_tile(tile_ref, nav_mesh)?;
        }
        Ok(())
    }

    /// Builds a navigation mesh tile from a compressed tile reference
    ///
    /// Any mesh tile at the same location and layer is replaced. Returns the
    /// reference of the new mesh tile, or `None` when the rebuilt tile has no
    /// polygons and the location was left empty.
    pub fn build_nav_mesh_tile(
        &mut self,
        tile_ref: CompressedTileRef,
        nav_mesh: &mut NavMesh,
    ) -> Result<Option<TileRef>> {
        let index = self.decode_tile_id_tile(tile_ref) as usize;
        let salt = self.decode_tile_id_salt(tile_ref);
        let tile = match self.tiles.get(index) {
            Some(tile) if tile.salt == salt => tile,
            _ => return Err(Error::TileCache(Status::InvalidParam)),
        };
        let header = tile
            .header
            .clone()
            .ok_or(Error::TileCache(Status::InvalidParam))?;

        let data_size = header.data_size as usize;
        let limit = self.compressor.max_decompressed_size(tile.compressed().len());
        if data_size > limit {
            log::warn!(
                "Compressed tile ({}, {}, {}) claims {} bytes, at most {} can be restored",
                header.tx,
                header.ty,
                header.tlayer,
                data_size,
                limit
            );
            return Err(Error::TileCache(Status::DataCorrupted));
        }

        self.arena.reset();
        let buf = self.arena.alloc(data_size)?;
        let written = self
            .compressor
            .decompress(tile.compressed(), self.arena.bytes_mut(&buf)?)?;
        if written != buf.len() {
            log::warn!(
                "Compressed tile ({}, {}, {}) restored {} bytes, header says {}",
                header.tx,
                header.ty,
                header.tlayer,
                written,
                buf.len()
            );
            return Err(Error::TileCache(Status::DataCorrupted));
        }

        let mut mesh_tile = MeshTileData::from_bytes(self.arena.bytes(&buf)?)?;
        mesh_tile.header.x = header.tx;
        mesh_tile.header.y = header.ty;
        mesh_tile.header.layer = header.tlayer;
        self.mesh_process.process(&mut mesh_tile);

        // Remove existing tile
        let existing = nav_mesh.get_tile_ref_at(header.tx, header.ty, header.tlayer);
        if !existing.is_null() {
            nav_mesh.remove_tile(existing)?;
        }

        // Add new tile, or leave the location empty
        if mesh_tile.polys.is_empty() {
            log::debug!(
                "Tile ({}, {}, {}) has no polygons",
                header.tx,
                header.ty,
                header.tlayer
            );
            return Ok(None);
        }
        let mesh_ref = nav_mesh.add_tile_data(mesh_tile, TileFlags::FREE_DATA, TileRef::null())?;
        Ok(Some(mesh_ref))
    }
}
