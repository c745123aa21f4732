//! Static tile-set files
//!
//! A tile-set file stores a whole navigation mesh: a 64 byte header with the
//! mesh parameters followed by one record per tile. Each record is a tile
//! reference, a byte length and the tile data. A record with a null reference
//! or zero length ends the file early.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use detour_common::{Error, Status};

use super::nav_mesh::NavMesh;
use super::{NavMeshParams, PolyRef, TileFlags, TileRef};

/// Magic of a tile-set file as stored on disk
pub const TILE_SET_MAGIC: [u8; 4] = u32::from_be_bytes(*b"MSET").to_le_bytes();

/// Supported tile-set version
pub const TILE_SET_VERSION: i32 = 1;

/// Size of the tile-set header
pub const TILE_SET_HEADER_SIZE: usize = 64;

/// Size of a tile record preceding the tile data
pub const TILE_RECORD_SIZE: usize = 8;

/// Header of a static tile-set file
#[derive(Debug, Clone, PartialEq)]
pub struct TileSetHeader {
    pub magic: [u8; 4],
    pub version: i32,
    pub num_tiles: i32,
    pub params: NavMeshParams,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

impl TileSetHeader {
    pub fn new(num_tiles: i32, params: NavMeshParams) -> Self {
        Self {
            magic: TILE_SET_MAGIC,
            version: TILE_SET_VERSION,
            num_tiles,
            params,
            bounds_min: [0.0; 3],
            bounds_max: [0.0; 3],
        }
    }

    /// Reads the raw header without validating it
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; TILE_SET_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        let mut cursor = &buf[..];

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        let version = cursor.read_i32::<LittleEndian>()?;
        let num_tiles = cursor.read_i32::<LittleEndian>()?;
        let params = NavMeshParams::read_from(&mut cursor)?;
        let mut bounds_min = [0f32; 3];
        cursor.read_f32_into::<LittleEndian>(&mut bounds_min)?;
        let mut bounds_max = [0f32; 3];
        cursor.read_f32_into::<LittleEndian>(&mut bounds_max)?;

        Ok(Self {
            magic,
            version,
            num_tiles,
            params,
            bounds_min,
            bounds_max,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.num_tiles)?;
        self.params.write_to(writer)?;
        for v in self.bounds_min.iter().chain(self.bounds_max.iter()) {
            writer.write_f32::<LittleEndian>(*v)?;
        }
        Ok(())
    }
}

/// Record preceding each tile in a tile-set file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRecord {
    pub tile_ref: TileRef,
    pub data_size: i32,
}

impl TileRecord {
    /// A record with a null reference or no data ends the tile list
    pub fn is_sentinel(&self) -> bool {
        self.tile_ref.is_null() || self.data_size == 0
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; TILE_RECORD_SIZE];
        reader.read_exact(&mut buf)?;
        let mut cursor = &buf[..];
        Ok(Self {
            tile_ref: PolyRef::new(cursor.read_u32::<LittleEndian>()?),
            data_size: cursor.read_i32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.tile_ref.id())?;
        writer.write_i32::<LittleEndian>(self.data_size)
    }
}

/// Reasons a tile-set file could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum TileSetError {
    #[error("cannot open tile set")]
    Open(#[source] io::Error),
    #[error("tile set header is truncated")]
    Header(#[source] io::Error),
    #[error("wrong tile set magic {0:?}")]
    Magic([u8; 4]),
    #[error("unsupported tile set version {0}")]
    Version(i32),
    #[error("cannot allocate the navigation mesh")]
    MeshAlloc(#[source] Error),
    #[error("navigation mesh rejected the tile set parameters")]
    MeshInit(#[source] Error),
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
    #[error("cannot allocate {size} bytes for tile {index}")]
    TileAlloc { index: usize, size: i64 },
    #[error("navigation mesh rejected tile {index}")]
    AddTile {
        index: usize,
        #[source]
        source: Error,
    },
}

impl TileSetError {
    /// Numeric code of the failure
    pub fn code(&self) -> i32 {
        match self {
            Self::Open(_) => 101,
            Self::Header(_) => 102,
            Self::Magic(_) => 103,
            Self::Version(_) => 104,
            Self::MeshAlloc(_) => 105,
            Self::MeshInit(_) => 106,
            Self::TileRecord { .. } => 107,
            Self::TileData { .. } => 108,
            Self::TileAlloc { .. } => 109,
            Self::AddTile { .. } => 110,
        }
    }
}

/// Loads a navigation mesh from a tile-set file
pub fn load_tile_set<P: AsRef<Path>>(path: P) -> Result<NavMesh, TileSetError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(TileSetError::Open)?;
    log::debug!("Loading tile set {}", path.display());
    read_tile_set(BufReader::new(file))
}

/// Reads a navigation mesh from tile-set data
pub fn read_tile_set<R: Read>(mut reader: R) -> Result<NavMesh, TileSetError> {
    let header = TileSetHeader::read_from(&mut reader).map_err(TileSetError::Header)?;
    if header.magic != TILE_SET_MAGIC {
        log::warn!("Tile set magic mismatch: {:?}", header.magic);
        return Err(TileSetError::Magic(header.magic));
    }
    if header.version != TILE_SET_VERSION {
        log::warn!("Tile set version mismatch: {}", header.version);
        return Err(TileSetError::Version(header.version));
    }

    let mut mesh = NavMesh::new(header.params.clone()).map_err(|e| match e.status() {
        Some(Status::OutOfMemory) => TileSetError::MeshAlloc(e),
        _ => TileSetError::MeshInit(e),
    })?;

    for index in 0..header.num_tiles.max(0) as usize {
        let record = TileRecord::read_from(&mut reader)
            .map_err(|source| TileSetError::TileRecord { index, source })?;
        if record.is_sentinel() {
            log::debug!("Tile set ends at record {} of {}", index, header.num_tiles);
            break;
        }

        let data = read_tile_data(&mut reader, index, record.data_size)?;
        mesh.add_tile(data, TileFlags::FREE_DATA, record.tile_ref)
            .map_err(|source| TileSetError::AddTile { index, source })?;
    }

    log::debug!("Loaded tile set with {} tiles", mesh.tile_count());
    Ok(mesh)
}

fn read_tile_data<R: Read>(reader: &mut R, index: usize, size: i32) -> Result<Vec<u8>, TileSetError> {
    let alloc_error = || TileSetError::TileAlloc {
        index,
        size: size as i64,
    };
    let len = usize::try_from(size).map_err(|_| alloc_error())?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| alloc_error())?;
    data.resize(len, 0);
    reader
        .read_exact(&mut data)
        .map_err(|source| TileSetError::TileData { index, source })?;
    Ok(data)
}

/// Saves every tile of a mesh to a tile-set file
pub fn save_tile_set<P: AsRef<Path>>(path: P, mesh: &NavMesh) -> detour_common::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_tile_set(&mut writer, mesh)?;
    writer.flush()?;
    Ok(())
}

/// Writes every tile of a mesh as tile-set data
///
/// The header bounds are the union of the tile bounds.
pub fn write_tile_set<W: Write>(writer: &mut W, mesh: &NavMesh) -> detour_common::Result<()> {
    let mut header = TileSetHeader::new(mesh.tile_count() as i32, mesh.params().clone());
    let mut records = Vec::with_capacity(mesh.tile_count());
    for tile in mesh.tiles() {
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
        let data = tile.to_bytes()?;
        let record = TileRecord {
            tile_ref: mesh.get_tile_ref(tile),
            data_size: i32::try_from(data.len())
                .map_err(|_| Error::Detour(Status::InvalidParam))?,
        };
        records.push((record, data));
    }

    header.write_to(writer)?;
    for (record, data) in &records {
        record.write_to(writer)?;
        writer.write_all(data)?;
    }
    Ok(())
}
