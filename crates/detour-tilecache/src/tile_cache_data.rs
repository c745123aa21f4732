//! Layout of compressed tiles
//!
//! A compressed tile is a [`TileCacheLayerHeader`] followed by the
//! compressor's output. Restoring the output yields a complete `DNAV` tile of
//! `data_size` bytes.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use detour_common::{Error, Result, Status};

/// Magic number of compressed tiles ('DTLR')
pub const TILECACHE_MAGIC: i32 = i32::from_be_bytes(*b"DTLR");

/// Version of the compressed tile layout
pub const TILECACHE_VERSION: i32 = 1;

/// Size of the serialized layer header
pub const TILECACHE_LAYER_HEADER_SIZE: usize = 48;

/// Header at the start of every compressed tile
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCacheLayerHeader {
    pub magic: i32,
    pub version: i32,
    /// Tile position X
    pub tx: i32,
    /// Tile position Y
    pub ty: i32,
    /// Tile layer
    pub tlayer: i32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Size of the decompressed payload
    pub data_size: u32,
}

impl Default for TileCacheLayerHeader {
    fn default() -> Self {
        Self {
            magic: TILECACHE_MAGIC,
            version: TILECACHE_VERSION,
            tx: 0,
            ty: 0,
            tlayer: 0,
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            data_size: 0,
        }
    }
}

impl TileCacheLayerHeader {
    /// Creates a header for the tile at `(tx, ty, tlayer)`
    pub fn new(tx: i32, ty: i32, tlayer: i32, bmin: [f32; 3], bmax: [f32; 3]) -> Self {
        Self {
            tx,
            ty,
            tlayer,
            bmin,
            bmax,
            ..Default::default()
        }
    }

    /// Checks magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != TILECACHE_MAGIC {
            return Err(Error::TileCache(Status::WrongMagic));
        }
        if self.version != TILECACHE_VERSION {
            return Err(Error::TileCache(Status::WrongVersion));
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let magic = reader.read_i32::<LittleEndian>()?;
        let version = reader.read_i32::<LittleEndian>()?;
        let tx = reader.read_i32::<LittleEndian>()?;
        let ty = reader.read_i32::<LittleEndian>()?;
        let tlayer = reader.read_i32::<LittleEndian>()?;
        let mut bmin = [0f32; 3];
        reader.read_f32_into::<LittleEndian>(&mut bmin)?;
        let mut bmax = [0f32; 3];
        reader.read_f32_into::<LittleEndian>(&mut bmax)?;
        let data_size = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            magic,
            version,
            tx,
            ty,
            tlayer,
            bmin,
            bmax,
            data_size,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.magic)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.tx)?;
        writer.write_i32::<LittleEndian>(self.ty)?;
        writer.write_i32::<LittleEndian>(self.tlayer)?;
        for v in self.bmin.iter().chain(self.bmax.iter()) {
            writer.write_f32::<LittleEndian>(*v)?;
        }
        writer.write_u32::<LittleEndian>(self.data_size)
    }

    /// Parses and validates the header at the start of a compressed tile
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < TILECACHE_LAYER_HEADER_SIZE {
            return Err(Error::TileCache(Status::InvalidParam));
        }
        let header = Self::read_from(&mut &data[..TILECACHE_LAYER_HEADER_SIZE])?;
        header.validate()?;
        Ok(header)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(TILECACHE_LAYER_HEADER_SIZE);
        for v in [self.magic, self.version, self.tx, self.ty, self.tlayer] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in self.bmin.iter().chain(self.bmax.iter()) {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&self.data_size.to_le_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = TileCacheLayerHeader::new(3, -2, 1, [0.0, -1.0, 0.0], [8.0, 2.0, 8.0]);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), TILECACHE_LAYER_HEADER_SIZE);
        assert_eq!(&bytes[..4], b"RLTD");
        assert_eq!(&bytes[8..12], &3i32.to_le_bytes());
        assert_eq!(TileCacheLayerHeader::from_bytes(&bytes).unwrap(), header);

        let mut written = Vec::new();
        header.write_to(&mut written).unwrap();
        assert_eq!(written, bytes);
    }

    #[test]
    fn test_header_validation() {
        let mut header = TileCacheLayerHeader::default();
        header.version = 2;
        assert!(matches!(
            TileCacheLayerHeader::from_bytes(&header.to_bytes()),
            Err(Error::TileCache(Status::WrongVersion))
        ));

        let mut bytes = TileCacheLayerHeader::default().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            TileCacheLayerHeader::from_bytes(&bytes),
            Err(Error::TileCache(Status::WrongMagic))
        ));

        assert!(matches!(
            TileCacheLayerHeader::from_bytes(&bytes[..20]),
            Err(Error::TileCache(Status::InvalidParam))
        ));
    }
}
