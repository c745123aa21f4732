//! Binary layout of a single navigation mesh tile
//!
//! Tiles are stored in the Detour `DNAV` format: a fixed header followed by
//! 4-byte aligned sections for vertices, polygons, link space, detail meshes,
//! detail vertices, detail triangles, BV-tree nodes and off-mesh connections.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use detour_common::{align4, Error, Result, Status};

use super::{PolyFlags, PolyType, MAX_VERTS_PER_POLY};

/// Magic number for navigation mesh tiles ('DNAV')
pub const NAVMESH_MAGIC: u32 = u32::from_be_bytes(*b"DNAV");

/// Current navigation mesh tile version
pub const NAVMESH_VERSION: u32 = 7;

/// Size of the serialized tile header
pub const MESH_HEADER_SIZE: usize = 100;

const VERT_SIZE: usize = 12;
const POLY_SIZE: usize = 32;
const LINK_SIZE: usize = 12;
const POLY_DETAIL_SIZE: usize = 12;
const DETAIL_TRI_SIZE: usize = 4;
const BV_NODE_SIZE: usize = 16;
const OFF_MESH_CON_SIZE: usize = 36;

/// Tile header matching Detour's `dtMeshHeader`
#[derive(Debug, Clone, PartialEq)]
pub struct MeshHeader {
    pub magic: u32,
    pub version: u32,
    /// Tile x location in the tile grid
    pub x: i32,
    /// Tile y location in the tile grid
    pub y: i32,
    /// Layer index at the grid location
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    /// Index of the first off-mesh connection polygon
    pub off_mesh_base: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    pub bv_quant_factor: f32,
}

impl Default for MeshHeader {
    fn default() -> Self {
        Self {
            magic: NAVMESH_MAGIC,
            version: NAVMESH_VERSION,
            x: 0,
            y: 0,
            layer: 0,
            user_id: 0,
            poly_count: 0,
            vert_count: 0,
            max_link_count: 0,
            detail_mesh_count: 0,
            detail_vert_count: 0,
            detail_tri_count: 0,
            bv_node_count: 0,
            off_mesh_con_count: 0,
            off_mesh_base: 0,
            walkable_height: 0.0,
            walkable_radius: 0.0,
            walkable_climb: 0.0,
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            bv_quant_factor: 0.0,
        }
    }
}

impl MeshHeader {
    /// Reads a mesh header from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
            x: reader.read_i32::<LittleEndian>()?,
            y: reader.read_i32::<LittleEndian>()?,
            layer: reader.read_i32::<LittleEndian>()?,
            user_id: reader.read_u32::<LittleEndian>()?,
            poly_count: reader.read_i32::<LittleEndian>()?,
            vert_count: reader.read_i32::<LittleEndian>()?,
            max_link_count: reader.read_i32::<LittleEndian>()?,
            detail_mesh_count: reader.read_i32::<LittleEndian>()?,
            detail_vert_count: reader.read_i32::<LittleEndian>()?,
            detail_tri_count: reader.read_i32::<LittleEndian>()?,
            bv_node_count: reader.read_i32::<LittleEndian>()?,
            off_mesh_con_count: reader.read_i32::<LittleEndian>()?,
            off_mesh_base: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            bmin: read_vec3(reader)?,
            bmax: read_vec3(reader)?,
            bv_quant_factor: reader.read_f32::<LittleEndian>()?,
        })
    }

    /// Writes a mesh header to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.x)?;
        writer.write_i32::<LittleEndian>(self.y)?;
        writer.write_i32::<LittleEndian>(self.layer)?;
        writer.write_u32::<LittleEndian>(self.user_id)?;
        writer.write_i32::<LittleEndian>(self.poly_count)?;
        writer.write_i32::<LittleEndian>(self.vert_count)?;
        writer.write_i32::<LittleEndian>(self.max_link_count)?;
        writer.write_i32::<LittleEndian>(self.detail_mesh_count)?;
        writer.write_i32::<LittleEndian>(self.detail_vert_count)?;
        writer.write_i32::<LittleEndian>(self.detail_tri_count)?;
        writer.write_i32::<LittleEndian>(self.bv_node_count)?;
        writer.write_i32::<LittleEndian>(self.off_mesh_con_count)?;
        writer.write_i32::<LittleEndian>(self.off_mesh_base)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        write_vec3(writer, &self.bmin)?;
        write_vec3(writer, &self.bmax)?;
        writer.write_f32::<LittleEndian>(self.bv_quant_factor)?;
        Ok(())
    }

    /// Checks the magic and version fields
    pub fn validate(&self) -> Result<()> {
        if self.magic != NAVMESH_MAGIC {
            return Err(Error::Detour(Status::WrongMagic));
        }
        if self.version != NAVMESH_VERSION {
            return Err(Error::Detour(Status::WrongVersion));
        }
        Ok(())
    }

    fn count(value: i32) -> Result<usize> {
        usize::try_from(value).map_err(|_| Error::Detour(Status::DataCorrupted))
    }

    /// Total number of bytes the sections described by this header occupy
    pub fn data_size(&self) -> Result<usize> {
        Ok(MESH_HEADER_SIZE
            + align4(VERT_SIZE * Self::count(self.vert_count)?)
            + align4(POLY_SIZE * Self::count(self.poly_count)?)
            + align4(LINK_SIZE * Self::count(self.max_link_count)?)
            + align4(POLY_DETAIL_SIZE * Self::count(self.detail_mesh_count)?)
            + align4(VERT_SIZE * Self::count(self.detail_vert_count)?)
            + align4(DETAIL_TRI_SIZE * Self::count(self.detail_tri_count)?)
            + align4(BV_NODE_SIZE * Self::count(self.bv_node_count)?)
            + align4(OFF_MESH_CON_SIZE * Self::count(self.off_mesh_con_count)?))
    }
}

/// Polygon record matching Detour's `dtPoly`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poly {
    /// Index of the first link, `NULL_LINK` when unlinked
    pub first_link: u32,
    /// Vertex indices
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Neighbour entry per edge: 0, internal index + 1, or `EXT_LINK | side`
    pub neis: [u16; MAX_VERTS_PER_POLY],
    pub flags: PolyFlags,
    pub vert_count: u8,
    area_and_type: u8,
}

impl Default for Poly {
    fn default() -> Self {
        Self {
            first_link: super::NULL_LINK,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags: PolyFlags::empty(),
            vert_count: 0,
            area_and_type: 0,
        }
    }
}

impl Poly {
    /// Creates a polygon with the given area, type and flags
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        let mut poly = Self {
            flags,
            ..Default::default()
        };
        poly.set_area(area);
        poly.set_type(poly_type);
        poly
    }

    /// Area id (0..64)
    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    pub fn set_area(&mut self, area: u8) {
        self.area_and_type = (self.area_and_type & 0xc0) | (area & 0x3f);
    }

    pub fn poly_type(&self) -> PolyType {
        if self.area_and_type >> 6 == PolyType::OffMeshConnection as u8 {
            PolyType::OffMeshConnection
        } else {
            PolyType::Ground
        }
    }

    pub fn set_type(&mut self, poly_type: PolyType) {
        self.area_and_type = (self.area_and_type & 0x3f) | ((poly_type as u8) << 6);
    }

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let first_link = reader.read_u32::<LittleEndian>()?;
        let mut verts = [0u16; MAX_VERTS_PER_POLY];
        reader.read_u16_into::<LittleEndian>(&mut verts)?;
        let mut neis = [0u16; MAX_VERTS_PER_POLY];
        reader.read_u16_into::<LittleEndian>(&mut neis)?;
        Ok(Self {
            first_link,
            verts,
            neis,
            flags: PolyFlags::from_bits_retain(reader.read_u16::<LittleEndian>()?),
            vert_count: reader.read_u8()?,
            area_and_type: reader.read_u8()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.first_link)?;
        for v in self.verts {
            writer.write_u16::<LittleEndian>(v)?;
        }
        for n in self.neis {
            writer.write_u16::<LittleEndian>(n)?;
        }
        writer.write_u16::<LittleEndian>(self.flags.bits())?;
        writer.write_u8(self.vert_count)?;
        writer.write_u8(self.area_and_type)?;
        Ok(())
    }
}

/// Detail sub-mesh of a polygon
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolyDetail {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
}

/// Quantized bounding volume node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    /// Polygon index for leaves, negative escape index otherwise
    pub i: i32,
}

/// Off-mesh connection between two points of the mesh
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OffMeshConnection {
    /// Start and end positions
    pub pos: [f32; 6],
    /// Snap radius at either end
    pub rad: f32,
    /// Index of the polygon representing the connection
    pub poly: u16,
    /// `OFFMESH_CON_BIDIR` or 0
    pub flags: u8,
    /// Tile side the end point lies in, 0xff for the same tile
    pub side: u8,
    pub user_id: u32,
}

impl OffMeshConnection {
    pub fn start_pos(&self) -> [f32; 3] {
        [self.pos[0], self.pos[1], self.pos[2]]
    }

    pub fn end_pos(&self) -> [f32; 3] {
        [self.pos[3], self.pos[4], self.pos[5]]
    }

    pub fn is_bidirectional(&self) -> bool {
        self.flags & super::OFFMESH_CON_BIDIR != 0
    }
}

/// Fully parsed tile data
///
/// Link records are runtime state of a mesh; they are skipped when parsing
/// and written back as zeroed reserved space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshTileData {
    pub header: MeshHeader,
    pub verts: Vec<[f32; 3]>,
    pub polys: Vec<Poly>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<[f32; 3]>,
    pub detail_tris: Vec<[u8; 4]>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

impl MeshTileData {
    /// Parses tile data
    ///
    /// Fails with `WrongMagic`/`WrongVersion` for foreign data and
    /// `DataCorrupted` when the sections do not fit. Trailing bytes are
    /// ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = read_tile_header(data)?;
        let required = header.data_size()?;
        if data.len() < required {
            log::warn!(
                "Tile data truncated: {} bytes, header describes {}",
                data.len(),
                required
            );
            return Err(Error::Detour(Status::DataCorrupted));
        }

        let mut cursor = Cursor::new(&data[MESH_HEADER_SIZE..]);
        let verts = read_vec3s(&mut cursor, header.vert_count as usize)?;

        let mut polys = Vec::with_capacity(header.poly_count as usize);
        for _ in 0..header.poly_count {
            polys.push(Poly::read_from(&mut cursor)?);
        }

        // Link records are rebuilt when the tile is added to a mesh
        skip(&mut cursor, align4(LINK_SIZE * header.max_link_count as usize));

        let mut detail_meshes = Vec::with_capacity(header.detail_mesh_count as usize);
        for _ in 0..header.detail_mesh_count {
            let detail = PolyDetail {
                vert_base: cursor.read_u32::<LittleEndian>()?,
                tri_base: cursor.read_u32::<LittleEndian>()?,
                vert_count: cursor.read_u8()?,
                tri_count: cursor.read_u8()?,
            };
            cursor.read_u16::<LittleEndian>()?;
            detail_meshes.push(detail);
        }

        let detail_verts = read_vec3s(&mut cursor, header.detail_vert_count as usize)?;

        let mut detail_tris = Vec::with_capacity(header.detail_tri_count as usize);
        for _ in 0..header.detail_tri_count {
            let mut tri = [0u8; 4];
            cursor.read_exact(&mut tri)?;
            detail_tris.push(tri);
        }

        let mut bv_tree = Vec::with_capacity(header.bv_node_count as usize);
        for _ in 0..header.bv_node_count {
            let mut bmin = [0u16; 3];
            cursor.read_u16_into::<LittleEndian>(&mut bmin)?;
            let mut bmax = [0u16; 3];
            cursor.read_u16_into::<LittleEndian>(&mut bmax)?;
            bv_tree.push(BVNode {
                bmin,
                bmax,
                i: cursor.read_i32::<LittleEndian>()?,
            });
        }

        let mut off_mesh_cons = Vec::with_capacity(header.off_mesh_con_count as usize);
        for _ in 0..header.off_mesh_con_count {
            let mut pos = [0f32; 6];
            cursor.read_f32_into::<LittleEndian>(&mut pos)?;
            off_mesh_cons.push(OffMeshConnection {
                pos,
                rad: cursor.read_f32::<LittleEndian>()?,
                poly: cursor.read_u16::<LittleEndian>()?,
                flags: cursor.read_u8()?,
                side: cursor.read_u8()?,
                user_id: cursor.read_u32::<LittleEndian>()?,
            });
        }

        Ok(Self {
            header,
            verts,
            polys,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree,
            off_mesh_cons,
        })
    }

    /// Serializes the tile, refreshing the header counts from the sections
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = self.header.clone();
        header.vert_count = to_count(self.verts.len())?;
        header.poly_count = to_count(self.polys.len())?;
        header.max_link_count = header.max_link_count.max(0);
        header.detail_mesh_count = to_count(self.detail_meshes.len())?;
        header.detail_vert_count = to_count(self.detail_verts.len())?;
        header.detail_tri_count = to_count(self.detail_tris.len())?;
        header.bv_node_count = to_count(self.bv_tree.len())?;
        header.off_mesh_con_count = to_count(self.off_mesh_cons.len())?;

        let mut buf = Vec::with_capacity(header.data_size()?);
        header.write_to(&mut buf)?;
        for v in &self.verts {
            write_vec3(&mut buf, v)?;
        }
        for poly in &self.polys {
            poly.write_to(&mut buf)?;
        }
        buf.resize(buf.len() + LINK_SIZE * header.max_link_count as usize, 0);
        for detail in &self.detail_meshes {
            buf.write_u32::<LittleEndian>(detail.vert_base)?;
            buf.write_u32::<LittleEndian>(detail.tri_base)?;
            buf.write_u8(detail.vert_count)?;
            buf.write_u8(detail.tri_count)?;
            buf.write_u16::<LittleEndian>(0)?;
        }
        for v in &self.detail_verts {
            write_vec3(&mut buf, v)?;
        }
        for tri in &self.detail_tris {
            buf.write_all(tri)?;
        }
        for node in &self.bv_tree {
            for v in node.bmin {
                buf.write_u16::<LittleEndian>(v)?;
            }
            for v in node.bmax {
                buf.write_u16::<LittleEndian>(v)?;
            }
            buf.write_i32::<LittleEndian>(node.i)?;
        }
        for con in &self.off_mesh_cons {
            for v in con.pos {
                buf.write_f32::<LittleEndian>(v)?;
            }
            buf.write_f32::<LittleEndian>(con.rad)?;
            buf.write_u16::<LittleEndian>(con.poly)?;
            buf.write_u8(con.flags)?;
            buf.write_u8(con.side)?;
            buf.write_u32::<LittleEndian>(con.user_id)?;
        }
        Ok(buf)
    }
}

impl MeshTileData {
    /// Checks that every index stored in the tile points inside the tile
    pub fn validate_indices(&self) -> Result<()> {
        let corrupt = || Error::Detour(Status::DataCorrupted);
        let vert_count = self.verts.len();
        let poly_count = self.polys.len();

        for poly in &self.polys {
            let nv = poly.vert_count as usize;
            if nv > MAX_VERTS_PER_POLY {
                return Err(corrupt());
            }
            if poly.verts[..nv].iter().any(|&v| v as usize >= vert_count) {
                return Err(corrupt());
            }
            match poly.poly_type() {
                PolyType::OffMeshConnection if nv < 2 => return Err(corrupt()),
                PolyType::Ground if nv < 3 => return Err(corrupt()),
                _ => {}
            }
            for &nei in &poly.neis[..nv] {
                if nei != 0 && nei & super::EXT_LINK == 0 && nei as usize > poly_count {
                    return Err(corrupt());
                }
            }
        }

        for con in &self.off_mesh_cons {
            match self.polys.get(con.poly as usize) {
                Some(poly) if poly.poly_type() == PolyType::OffMeshConnection => {}
                _ => return Err(corrupt()),
            }
        }

        for (i, detail) in self.detail_meshes.iter().enumerate() {
            let tri_end = detail.tri_base as usize + detail.tri_count as usize;
            let vert_end = detail.vert_base as usize + detail.vert_count as usize;
            if tri_end > self.detail_tris.len() || vert_end > self.detail_verts.len() {
                return Err(corrupt());
            }
            let limit = self.polys.get(i).map_or(0, |p| p.vert_count as usize)
                + detail.vert_count as usize;
            let tris = &self.detail_tris[detail.tri_base as usize..tri_end];
            if tris.iter().any(|t| t[..3].iter().any(|&v| v as usize >= limit)) {
                return Err(corrupt());
            }
        }
        Ok(())
    }
}

/// Reads and validates the header at the start of tile data
pub fn read_tile_header(data: &[u8]) -> Result<MeshHeader> {
    if data.len() < MESH_HEADER_SIZE {
        return Err(Error::Detour(Status::InvalidParam));
    }
    let header = MeshHeader::read_from(&mut Cursor::new(data))?;
    header.validate()?;
    Ok(header)
}

fn to_count(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::Detour(Status::InvalidParam))
}

fn skip(cursor: &mut Cursor<&[u8]>, bytes: usize) {
    cursor.set_position(cursor.position() + bytes as u64);
}

fn read_vec3<R: Read>(reader: &mut R) -> std::io::Result<[f32; 3]> {
    Ok([
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
    ])
}

fn read_vec3s<R: Read>(reader: &mut R, count: usize) -> std::io::Result<Vec<[f32; 3]>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_vec3(reader)?);
    }
    Ok(out)
}

fn write_vec3<W: Write>(writer: &mut W, v: &[f32; 3]) -> std::io::Result<()> {
    writer.write_f32::<LittleEndian>(v[0])?;
    writer.write_f32::<LittleEndian>(v[1])?;
    writer.write_f32::<LittleEndian>(v[2])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::{empty_tile_bytes, grid_params, GridTileBuilder};

    #[test]
    fn test_magic_value() {
        // 'D' << 24 | 'N' << 16 | 'A' << 8 | 'V'
        assert_eq!(NAVMESH_MAGIC, 0x444E_4156);
    }

    #[test]
    fn test_header_size() {
        let mut buf = Vec::new();
        MeshHeader::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), MESH_HEADER_SIZE);
    }

    #[test]
    fn test_section_sizes() {
        let header = MeshHeader {
            vert_count: 4,
            poly_count: 1,
            max_link_count: 4,
            detail_tri_count: 3,
            off_mesh_con_count: 1,
            ..Default::default()
        };
        // 100 + 48 + 32 + 48 + 12 (3 tris, aligned) + 36
        assert_eq!(header.data_size().unwrap(), 276);
    }

    #[test]
    fn test_poly_area_and_type() {
        let mut poly = Poly::new(5, PolyType::OffMeshConnection, PolyFlags::JUMP);
        assert_eq!(poly.area(), 5);
        assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);
        poly.set_area(63);
        assert_eq!(poly.area(), 63);
        assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);
        poly.set_type(PolyType::Ground);
        assert_eq!(poly.poly_type(), PolyType::Ground);
        assert_eq!(poly.area(), 63);
    }

    #[test]
    fn test_parse_grid_tile() {
        let params = grid_params(8.0, 16, 64);
        let bytes = GridTileBuilder::new(&params, 1, 2, 4)
            .off_mesh_connection([1.0, 0.0, 1.0], [3.0, 0.0, 3.0], 0.5, true)
            .build_bytes();
        let tile = MeshTileData::from_bytes(&bytes).unwrap();
        assert_eq!(tile.header.x, 1);
        assert_eq!(tile.header.y, 2);
        assert_eq!(tile.polys.len(), 17);
        assert_eq!(tile.off_mesh_cons.len(), 1);
        assert_eq!(tile.header.off_mesh_base, 16);
        assert_eq!(tile.polys[16].poly_type(), PolyType::OffMeshConnection);

        // Serializing the parsed tile reproduces the input
        assert_eq!(tile.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_reject_foreign_data() {
        let mut bytes = empty_tile_bytes(0, 0, 128);
        bytes[0] ^= 0xff;
        assert!(matches!(
            MeshTileData::from_bytes(&bytes),
            Err(Error::Detour(Status::WrongMagic))
        ));

        let mut bytes = empty_tile_bytes(0, 0, 128);
        bytes[4] = 8;
        assert!(matches!(
            MeshTileData::from_bytes(&bytes),
            Err(Error::Detour(Status::WrongVersion))
        ));

        assert!(matches!(
            MeshTileData::from_bytes(&bytes[..50]),
            Err(Error::Detour(Status::InvalidParam))
        ));
    }

    #[test]
    fn test_reject_truncated_sections() {
        let params = grid_params(8.0, 16, 64);
        let bytes = GridTileBuilder::new(&params, 0, 0, 2).build_bytes();
        assert!(matches!(
            MeshTileData::from_bytes(&bytes[..bytes.len() - 4]),
            Err(Error::Detour(Status::DataCorrupted))
        ));
    }

    #[test]
    fn test_validate_indices() {
        let params = grid_params(8.0, 16, 64);
        let mut tile = GridTileBuilder::new(&params, 0, 0, 2).build();
        assert!(tile.validate_indices().is_ok());

        tile.polys[0].verts[0] = 200;
        assert!(matches!(
            tile.validate_indices(),
            Err(Error::Detour(Status::DataCorrupted))
        ));
    }

    #[test]
    fn test_trailing_bytes_accepted() {
        let bytes = empty_tile_bytes(3, 4, 128);
        assert_eq!(bytes.len(), 128);
        let tile = MeshTileData::from_bytes(&bytes).unwrap();
        assert_eq!(tile.header.x, 3);
        assert!(tile.polys.is_empty());
    }
}
