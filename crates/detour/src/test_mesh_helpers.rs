//! Builders for small flat grid tiles used by tests
//!
//! A grid tile covers one tile of the mesh with `cells x cells` square
//! polygons at height 0. Polygon `k` is the `k`-th unblocked cell when the
//! cells are walked with x as the outer and z as the inner coordinate.

use crate::{
    MeshHeader, MeshTileData, NavMeshParams, OffMeshConnection, Poly, PolyDetail, PolyFlags,
    PolyRef, PolyType, EXT_LINK, NAVMESH_MAGIC, NAVMESH_VERSION, OFFMESH_CON_BIDIR,
    TILE_SET_MAGIC, TILE_SET_VERSION,
};

/// Mesh parameters for square tiles with the grid origin at zero
pub fn grid_params(tile_size: f32, max_tiles: i32, max_polys: i32) -> NavMeshParams {
    NavMeshParams {
        origin: [0.0; 3],
        tile_width: tile_size,
        tile_height: tile_size,
        max_tiles,
        max_polys_per_tile: max_polys,
    }
}

struct OffMeshSpec {
    start: [f32; 3],
    end: [f32; 3],
    rad: f32,
    bidirectional: bool,
}

/// Builds a flat grid tile
pub struct GridTileBuilder {
    origin: [f32; 3],
    size: [f32; 2],
    tx: i32,
    ty: i32,
    layer: i32,
    cells: usize,
    blocked: Vec<bool>,
    area: u8,
    flags: PolyFlags,
    off_mesh: Vec<OffMeshSpec>,
}

impl GridTileBuilder {
    pub fn new(params: &NavMeshParams, tx: i32, ty: i32, cells: usize) -> Self {
        Self {
            origin: [
                params.origin[0] + tx as f32 * params.tile_width,
                params.origin[1],
                params.origin[2] + ty as f32 * params.tile_height,
            ],
            size: [params.tile_width, params.tile_height],
            tx,
            ty,
            layer: 0,
            cells,
            blocked: vec![false; cells * cells],
            area: 0,
            flags: PolyFlags::WALK,
            off_mesh: Vec::new(),
        }
    }

    /// Removes the cell at x index `i` and z index `j`
    pub fn block(mut self, i: usize, j: usize) -> Self {
        self.blocked[i * self.cells + j] = true;
        self
    }

    pub fn layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn area(mut self, area: u8) -> Self {
        self.area = area;
        self
    }

    pub fn flags(mut self, flags: PolyFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn off_mesh_connection(
        mut self,
        start: [f32; 3],
        end: [f32; 3],
        rad: f32,
        bidirectional: bool,
    ) -> Self {
        self.off_mesh.push(OffMeshSpec {
            start,
            end,
            rad,
            bidirectional,
        });
        self
    }

    fn poly_index_map(&self) -> Vec<Option<u16>> {
        let mut next = 0u16;
        self.blocked
            .iter()
            .map(|&blocked| {
                if blocked {
                    None
                } else {
                    next += 1;
                    Some(next - 1)
                }
            })
            .collect()
    }

    pub fn build(&self) -> MeshTileData {
        let n = self.cells;
        let cell_w = self.size[0] / n as f32;
        let cell_h = self.size[1] / n as f32;
        let vert = |a: usize, b: usize| (a * (n + 1) + b) as u16;

        let mut verts = Vec::with_capacity((n + 1) * (n + 1));
        for a in 0..=n {
            for b in 0..=n {
                verts.push([
                    self.origin[0] + a as f32 * cell_w,
                    0.0,
                    self.origin[2] + b as f32 * cell_h,
                ]);
            }
        }

        let map = self.poly_index_map();
        let neighbour = |i: isize, j: isize, border_side: u16| -> u16 {
            if i < 0 || j < 0 || i >= n as isize || j >= n as isize {
                return EXT_LINK | border_side;
            }
            map[i as usize * n + j as usize].map_or(0, |p| p + 1)
        };

        let mut polys = Vec::new();
        let mut detail_meshes = Vec::new();
        let mut detail_tris = Vec::new();
        let mut portal_count = 0;
        for i in 0..n {
            for j in 0..n {
                if self.blocked[i * n + j] {
                    continue;
                }
                let (si, sj) = (i as isize, j as isize);
                let mut poly = Poly::new(self.area, PolyType::Ground, self.flags);
                poly.vert_count = 4;
                poly.verts[..4].copy_from_slice(&[
                    vert(i, j),
                    vert(i, j + 1),
                    vert(i + 1, j + 1),
                    vert(i + 1, j),
                ]);
                poly.neis[..4].copy_from_slice(&[
                    neighbour(si - 1, sj, 4),
                    neighbour(si, sj + 1, 2),
                    neighbour(si + 1, sj, 0),
                    neighbour(si, sj - 1, 6),
                ]);
                portal_count += poly.neis[..4].iter().filter(|&&e| e & EXT_LINK != 0).count();

                detail_meshes.push(PolyDetail {
                    vert_base: 0,
                    tri_base: detail_tris.len() as u32,
                    vert_count: 0,
                    tri_count: 2,
                });
                detail_tris.push([0, 1, 2, 0]);
                detail_tris.push([0, 2, 3, 0]);
                polys.push(poly);
            }
        }

        let bmin = [self.origin[0], 0.0, self.origin[2]];
        let bmax = [self.origin[0] + self.size[0], 1.0, self.origin[2] + self.size[1]];

        let off_mesh_base = polys.len();
        let mut off_mesh_cons = Vec::with_capacity(self.off_mesh.len());
        for (k, spec) in self.off_mesh.iter().enumerate() {
            let v0 = verts.len() as u16;
            verts.push(spec.start);
            verts.push(spec.end);

            let mut poly = Poly::new(self.area, PolyType::OffMeshConnection, PolyFlags::JUMP);
            poly.vert_count = 2;
            poly.verts[0] = v0;
            poly.verts[1] = v0 + 1;
            polys.push(poly);

            off_mesh_cons.push(OffMeshConnection {
                pos: [
                    spec.start[0],
                    spec.start[1],
                    spec.start[2],
                    spec.end[0],
                    spec.end[1],
                    spec.end[2],
                ],
                rad: spec.rad,
                poly: (off_mesh_base + k) as u16,
                flags: if spec.bidirectional { OFFMESH_CON_BIDIR } else { 0 },
                side: classify_off_mesh_point(&spec.end, &bmin, &bmax),
                user_id: k as u32,
            });
        }

        let header = MeshHeader {
            magic: NAVMESH_MAGIC,
            version: NAVMESH_VERSION,
            x: self.tx,
            y: self.ty,
            layer: self.layer,
            poly_count: polys.len() as i32,
            vert_count: verts.len() as i32,
            max_link_count: (off_mesh_base * 4 + portal_count * 2 + off_mesh_cons.len() * 4) as i32,
            detail_mesh_count: detail_meshes.len() as i32,
            detail_tri_count: detail_tris.len() as i32,
            off_mesh_con_count: off_mesh_cons.len() as i32,
            off_mesh_base: off_mesh_base as i32,
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.9,
            bmin,
            bmax,
            ..Default::default()
        };

        MeshTileData {
            header,
            verts,
            polys,
            detail_meshes,
            detail_verts: Vec::new(),
            detail_tris,
            bv_tree: Vec::new(),
            off_mesh_cons,
        }
    }

    pub fn build_bytes(&self) -> Vec<u8> {
        self.build().to_bytes().expect("grid tile serializes")
    }
}

/// Tile side an off-mesh end point lies on, 0xff when inside the tile
fn classify_off_mesh_point(pt: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> u8 {
    const XP: u8 = 1 << 0;
    const ZP: u8 = 1 << 1;
    const XM: u8 = 1 << 2;
    const ZM: u8 = 1 << 3;

    let mut outcode = 0;
    if pt[0] >= bmax[0] {
        outcode |= XP;
    }
    if pt[2] >= bmax[2] {
        outcode |= ZP;
    }
    if pt[0] < bmin[0] {
        outcode |= XM;
    }
    if pt[2] < bmin[2] {
        outcode |= ZM;
    }

    match outcode {
        XP => 0,
        o if o == XP | ZP => 1,
        ZP => 2,
        o if o == XM | ZP => 3,
        XM => 4,
        o if o == XM | ZM => 5,
        ZM => 6,
        o if o == XP | ZM => 7,
        _ => 0xff,
    }
}

/// A valid tile header with no geometry, zero padded to `len` bytes
pub fn empty_tile_bytes(tx: i32, ty: i32, len: usize) -> Vec<u8> {
    let header = MeshHeader {
        magic: NAVMESH_MAGIC,
        version: NAVMESH_VERSION,
        x: tx,
        y: ty,
        ..Default::default()
    };
    let mut bytes = Vec::with_capacity(len);
    header.write_to(&mut bytes).expect("header serializes");
    bytes.resize(len.max(bytes.len()), 0);
    bytes
}

/// Raw tile-set file contents
///
/// Each record stores the length of its bytes, so an empty slice produces a
/// zero length record that ends the set.
pub fn tile_set_bytes(params: &NavMeshParams, records: &[(PolyRef, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&TILE_SET_MAGIC);
    out.extend_from_slice(&TILE_SET_VERSION.to_le_bytes());
    out.extend_from_slice(&(records.len() as i32).to_le_bytes());
    params.write_to(&mut out).expect("params serialize");
    out.resize(crate::TILE_SET_HEADER_SIZE, 0);
    for (tile_ref, data) in records {
        out.extend_from_slice(&tile_ref.id().to_le_bytes());
        out.extend_from_slice(&(data.len() as i32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_tile_neighbours() {
        let params = grid_params(8.0, 16, 64);
        let tile = GridTileBuilder::new(&params, 0, 0, 2).block(1, 1).build();
        assert_eq!(tile.polys.len(), 3);
        // Cell (0,0): west and -z are tile borders
        assert_eq!(tile.polys[0].neis[..4], [EXT_LINK | 4, 2, 3, EXT_LINK | 6]);
        // Cell (1,0): +z neighbour is blocked
        assert_eq!(tile.polys[2].neis[..4], [1, 0, EXT_LINK, EXT_LINK | 6]);
    }

    #[test]
    fn test_off_mesh_side() {
        let bmin = [0.0, 0.0, 0.0];
        let bmax = [8.0, 1.0, 8.0];
        assert_eq!(classify_off_mesh_point(&[4.0, 0.0, 4.0], &bmin, &bmax), 0xff);
        assert_eq!(classify_off_mesh_point(&[9.0, 0.0, 4.0], &bmin, &bmax), 0);
        assert_eq!(classify_off_mesh_point(&[4.0, 0.0, -1.0], &bmin, &bmax), 6);
        assert_eq!(classify_off_mesh_point(&[-1.0, 0.0, 9.0], &bmin, &bmax), 3);
    }

    #[test]
    fn test_tile_set_header_size() {
        let params = grid_params(8.0, 16, 64);
        let bytes = tile_set_bytes(&params, &[]);
        assert_eq!(bytes.len(), crate::TILE_SET_HEADER_SIZE);
    }
}
