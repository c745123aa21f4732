//! Tile-cache-set files
//!
//! A tile-cache-set file stores the compressed tiles of a world: a 116 byte
//! header with the mesh and cache parameters followed by one record per
//! compressed tile. Loading adds every tile to a fresh [`TileCache`] and
//! immediately builds the matching navigation mesh tile.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use detour::{NavMesh, NavMeshParams, TileRecord};
use detour_common::{Error, Status};

use super::tile_cache::{CompressedTileFlags, TileCache, TileCacheParams};
use super::tile_cache_alloc::{LinearAllocator, DEFAULT_ARENA_BLOCK_SIZE};
use super::tile_cache_compressor::{NoopCompressor, TileCacheCompressor};
use super::tile_cache_mesh_process::{NoopMeshProcess, TileCacheMeshProcess};

/// Magic of a tile-cache-set file as stored on disk
pub const TILE_CACHE_SET_MAGIC: [u8; 4] = u32::from_be_bytes(*b"TSET").to_le_bytes();

/// Supported tile-cache-set version
pub const TILE_CACHE_SET_VERSION: i32 = 1;

/// Size of the tile-cache-set header
pub const TILE_CACHE_SET_HEADER_SIZE: usize = 116;

/// Header of a tile-cache-set file
#[derive(Debug, Clone, PartialEq)]
pub struct TileCacheSetHeader {
    pub magic: [u8; 4],
    pub version: i32,
    pub num_tiles: i32,
    pub mesh_params: NavMeshParams,
    pub cache_params: TileCacheParams,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

impl TileCacheSetHeader {
    pub fn new(num_tiles: i32, mesh_params: NavMeshParams, cache_params: TileCacheParams) -> Self {
        Self {
            magic: TILE_CACHE_SET_MAGIC,
            version: TILE_CACHE_SET_VERSION,
            num_tiles,
            mesh_params,
            cache_params,
            bounds_min: [0.0; 3],
            bounds_max: [0.0; 3],
        }
    }

    /// Reads the raw header without validating it
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; TILE_CACHE_SET_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        let mut cursor = &buf[..];

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        let version = cursor.read_i32::<LittleEndian>()?;
        let num_tiles = cursor.read_i32::<LittleEndian>()?;
        let mesh_params = NavMeshParams::read_from(&mut cursor)?;
        let cache_params = TileCacheParams::read_from(&mut cursor)?;
        let mut bounds_min = [0f32; 3];
        cursor.read_f32_into::<LittleEndian>(&mut bounds_min)?;
        let mut bounds_max = [0f32; 3];
        cursor.read_f32_into::<LittleEndian>(&mut bounds_max)?;

        Ok(Self {
            magic,
            version,
            num_tiles,
            mesh_params,
            cache_params,
            bounds_min,
            bounds_max,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.num_tiles)?;
        self.mesh_params.write_to(writer)?;
        self.cache_params.write_to(writer)?;
        for v in self.bounds_min.iter().chain(self.bounds_max.iter()) {
            writer.write_f32::<LittleEndian>(*v)?;
        }
        Ok(())
    }
}

/// Reasons a tile-cache-set file could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum TileCacheSetError {
    #[error("cannot open tile cache set")]
    Open(#[source] io::Error),
    #[error("tile cache set header is truncated")]
    Header(#[source] io::Error),
    #[error("wrong tile cache set magic {0:?}")]
    Magic([u8; 4]),
    #[error("unsupported tile cache set version {0}")]
    Version(i32),
    #[error("cannot allocate the navigation mesh")]
    MeshAlloc(#[source] Error),
    #[error("navigation mesh rejected the tile cache set parameters")]
    MeshInit(#[source] Error),
    #[error("cannot allocate the tile cache")]
    CacheAlloc(#[source] Error),
    #[error("tile cache rejected the tile cache set parameters")]
    CacheInit(#[source] Error),
    #[error("record of tile {index} is truncated")]
    TileRecord {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("data of tile {index} is truncated")]
    TileData {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("tile cache rejected tile {index}")]
    AddTile {
        index: usize,
        #[source]
        source: Error,
    },
    #[error("tile cache returned a null reference for tile {index}")]
    NullRef { index: usize },
    #[error("cannot build navigation mesh tile {index}")]
    BuildTile {
        index: usize,
        #[source]
        source: Error,
    },
    #[error("cannot allocate {size} bytes for tile {index}")]
    TileAlloc { index: usize, size: i64 },
}

impl TileCacheSetError {
    /// Numeric code of the failure
    pub fn code(&self) -> i32 {
        match self {
            Self::Open(_) => 201,
            Self::Header(_) => 202,
            Self::Magic(_) => 203,
            Self::Version(_) => 204,
            Self::MeshAlloc(_) => 205,
            Self::MeshInit(_) => 206,
            Self::CacheAlloc(_) => 207,
            Self::CacheInit(_) => 208,
            Self::TileRecord { .. } => 209,
            Self::TileData { .. } => 210,
            Self::AddTile { .. } => 211,
            Self::NullRef { .. } => 212,
            Self::BuildTile { .. } => 213,
            Self::TileAlloc { .. } => 214,
        }
    }
}

/// A navigation mesh together with the tile cache it was built from
#[derive(Debug)]
pub struct TileCacheWorld {
    pub nav_mesh: NavMesh,
    pub tile_cache: TileCache,
}

/// Configures how tile-cache-set files are loaded
#[derive(Debug)]
pub struct TileCacheSetLoader {
    compressor: Box<dyn TileCacheCompressor>,
    mesh_process: Box<dyn TileCacheMeshProcess>,
    arena_block_size: usize,
}

impl Default for TileCacheSetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TileCacheSetLoader {
    /// Loader with the no-op compressor and mesh process
    pub fn new() -> Self {
        Self {
            compressor: Box::new(NoopCompressor),
            mesh_process: Box::new(NoopMeshProcess),
            arena_block_size: DEFAULT_ARENA_BLOCK_SIZE,
        }
    }

    pub fn with_compressor<C: TileCacheCompressor + 'static>(mut self, compressor: C) -> Self {
        self.compressor = Box::new(compressor);
        self
    }

    pub fn with_mesh_process<P: TileCacheMeshProcess + 'static>(mut self, mesh_process: P) -> Self {
        self.mesh_process = Box::new(mesh_process);
        self
    }

    pub fn with_arena_block_size(mut self, block_size: usize) -> Self {
        self.arena_block_size = block_size;
        self
    }

    /// Loads a tile-cache-set file
    pub fn load<P: AsRef<Path>>(self, path: P) -> Result<TileCacheWorld, TileCacheSetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(TileCacheSetError::Open)?;
        log::debug!("Loading tile cache set {}", path.display());
        self.read(BufReader::new(file))
    }

    /// Reads tile-cache-set data
    pub fn read<R: Read>(self, mut reader: R) -> Result<TileCacheWorld, TileCacheSetError> {
        let header =
            TileCacheSetHeader::read_from(&mut reader).map_err(TileCacheSetError::Header)?;
        if header.magic != TILE_CACHE_SET_MAGIC {
            log::warn!("Tile cache set magic mismatch: {:?}", header.magic);
            return Err(TileCacheSetError::Magic(header.magic));
        }
        if header.version != TILE_CACHE_SET_VERSION {
            log::warn!("Tile cache set version mismatch: {}", header.version);
            return Err(TileCacheSetError::Version(header.version));
        }

        let nav_mesh = NavMesh::new(header.mesh_params.clone()).map_err(|e| match e.status() {
            Some(Status::OutOfMemory) => TileCacheSetError::MeshAlloc(e),
            _ => TileCacheSetError::MeshInit(e),
        })?;
        let tile_cache = TileCache::new(
            header.cache_params.clone(),
            self.compressor,
            self.mesh_process,
            LinearAllocator::new(self.arena_block_size),
        )
        .map_err(|e| match e.status() {
            Some(Status::OutOfMemory) => TileCacheSetError::CacheAlloc(e),
            _ => TileCacheSetError::CacheInit(e),
        })?;
        let mut world = TileCacheWorld {
            nav_mesh,
            tile_cache,
        };

        for index in 0..header.num_tiles.max(0) as usize {
            let record = TileRecord::read_from(&mut reader)
                .map_err(|source| TileCacheSetError::TileRecord { index, source })?;
            if record.is_sentinel() {
                log::debug!(
                    "Tile cache set ends at record {} of {}",
                    index,
                    header.num_tiles
                );
                break;
            }

            let data = read_tile_data(&mut reader, index, record.data_size)?;
            let tile_ref = world
                .tile_cache
                .add_tile(data, CompressedTileFlags::FREE_DATA)
                .map_err(|source| TileCacheSetError::AddTile { index, source })?;
            if tile_ref.is_null() {
                return Err(TileCacheSetError::NullRef { index });
            }
            world
                .tile_cache
                .build_nav_mesh_tile(tile_ref, &mut world.nav_mesh)
                .map_err(|source| TileCacheSetError::BuildTile { index, source })?;
        }

        log::debug!(
            "Loaded tile cache set with {} compressed tiles and {} mesh tiles",
            world.tile_cache.tile_count(),
            world.nav_mesh.tile_count()
        );
        Ok(world)
    }
}

fn read_tile_data<R: Read>(
    reader: &mut R,
    index: usize,
    size: i32,
) -> Result<Vec<u8>, TileCacheSetError> {
    let alloc_error = || TileCacheSetError::TileAlloc {
        index,
        size: size as i64,
    };
    let len = usize::try_from(size).map_err(|_| alloc_error())?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| alloc_error())?;
    data.resize(len, 0);
    reader
        .read_exact(&mut data)
        .map_err(|source| TileCacheSetError::TileData { index, source })?;
    Ok(data)
}

/// Loads a tile-cache-set file with the default loader
pub fn load_tile_cache_set<P: AsRef<Path>>(path: P) -> Result<TileCacheWorld, TileCacheSetError> {
    TileCacheSetLoader::new().load(path)
}

/// Saves the compressed tiles of a world to a tile-cache-set file
pub fn save_tile_cache_set<P: AsRef<Path>>(
    path: P,
    world: &TileCacheWorld,
) -> detour_common::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_tile_cache_set(&mut writer, world)?;
    writer.flush()?;
    Ok(())
}

/// Writes the compressed tiles of a world as tile-cache-set data
///
/// The header bounds are the union of the compressed tile bounds.
pub fn write_tile_cache_set<W: Write>(
    writer: &mut W,
    world: &TileCacheWorld,
) -> detour_common::Result<()> {
    let cache = &world.tile_cache;
    let mut header = TileCacheSetHeader::new(
        i32::try_from(cache.tile_count()).map_err(|_| Error::TileCache(Status::InvalidParam))?,
        world.nav_mesh.params().clone(),
        cache.params().clone(),
    );

    let mut records = Vec::with_capacity(cache.tile_count());
    for tile in cache.tiles() {
        let Some(tile_header) = tile.header.as_ref() else {
            continue;
        };
        if records.is_empty() {
            header.bounds_min = tile_header.bmin;
            header.bounds_max = tile_header.bmax;
        } else {
            for k in 0..3 {
                header.bounds_min[k] = header.bounds_min[k].min(tile_header.bmin[k]);
                header.bounds_max[k] = header.bounds_max[k].max(tile_header.bmax[k]);
            }
        }
        let record = TileRecord {
            tile_ref: cache.get_tile_ref(tile),
            data_size: i32::try_from(tile.data().len())
                .map_err(|_| Error::TileCache(Status::InvalidParam))?,
        };
        records.push((record, tile.data()));
    }

    header.write_to(writer)?;
    for (record, data) in &records {
        record.write_to(writer)?;
        writer.write_all(data)?;
    }
    Ok(())
}
