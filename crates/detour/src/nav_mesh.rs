//! Navigation mesh implementation for Detour
//!
//! The navigation mesh is a grid of tiles whose polygons form one graph.
//! Polygons inside a tile are linked through their neighbour entries, border
//! edges are linked to matching edges of the eight neighbouring tiles and of
//! other layers at the same grid location, and off-mesh connections are
//! snapped onto the polygons they land on.

use std::collections::BTreeMap;

use detour_common::{
    calc_poly_center, closest_height_point_triangle, dist_pt_seg_sqr_2d,
    distance_pt_poly_edges_sqr, ilog2, next_pow2, overlap_bounds, point_in_polygon_2d, sqr,
    vdist_sqr, visfinite, vlerp, Error, Result, Status,
};

use super::tile_data::{
    BVNode, MeshHeader, MeshTileData, OffMeshConnection, Poly, PolyDetail,
};
use super::{
    NavMeshParams, PolyFlags, PolyRef, PolyType, TileFlags, TileRef, EXT_LINK, MAX_VERTS_PER_POLY,
    NULL_LINK,
};

/// Link between two polygons
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// Reference to the connected polygon
    pub reference: PolyRef,
    /// Index of the next link of the same polygon
    pub next: u32,
    /// Edge of the owning polygon the link crosses, 0xff for off-mesh landings
    pub edge: u8,
    /// Tile side for portal links, 0xff for links inside the tile
    pub side: u8,
    /// Start of the shared portal segment, 0..255 along the edge
    pub bmin: u8,
    /// End of the shared portal segment, 0..255 along the edge
    pub bmax: u8,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            reference: PolyRef::null(),
            next: NULL_LINK,
            edge: 0,
            side: 0,
            bmin: 0,
            bmax: 0,
        }
    }
}

/// Iterator over the links of one polygon
pub struct LinkIter<'a> {
    links: &'a [Link],
    next: u32,
}

impl<'a> Iterator for LinkIter<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.links.get(self.next as usize)?;
        self.next = link.next;
        Some(link)
    }
}

/// Vertices of one polygon copied out of tile storage
#[derive(Debug, Clone, Copy)]
pub struct PolyVerts {
    verts: [[f32; 3]; MAX_VERTS_PER_POLY],
    count: usize,
}

impl PolyVerts {
    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.verts[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A tile slot of the navigation mesh
#[derive(Debug, Clone)]
pub struct MeshTile {
    /// Salt of the slot, bumped every time a tile is removed from it
    pub salt: u32,
    /// Header of the tile, `None` for free slots
    pub header: Option<MeshHeader>,
    pub verts: Vec<[f32; 3]>,
    pub polys: Vec<Poly>,
    pub links: Vec<Link>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<[f32; 3]>,
    pub detail_tris: Vec<[u8; 4]>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
    pub flags: TileFlags,
    links_free_list: u32,
    index: usize,
    next: Option<usize>,
}

impl MeshTile {
    fn empty(index: usize) -> Self {
        Self {
            salt: 1,
            header: None,
            verts: Vec::new(),
            polys: Vec::new(),
            links: Vec::new(),
            detail_meshes: Vec::new(),
            detail_verts: Vec::new(),
            detail_tris: Vec::new(),
            bv_tree: Vec::new(),
            off_mesh_cons: Vec::new(),
            flags: TileFlags::empty(),
            links_free_list: NULL_LINK,
            index,
            next: None,
        }
    }

    /// Slot index of this tile
    pub fn index(&self) -> usize {
        self.index
    }

    /// Walkable climb height of the tile, 0 for free slots
    pub fn walkable_climb(&self) -> f32 {
        self.header.as_ref().map_or(0.0, |h| h.walkable_climb)
    }

    /// Iterates the links of a polygon of this tile
    pub fn links_of(&self, poly: &Poly) -> LinkIter<'_> {
        LinkIter {
            links: &self.links,
            next: poly.first_link,
        }
    }

    /// Copies out the vertices of a polygon of this tile
    pub fn poly_verts(&self, poly: &Poly) -> PolyVerts {
        let mut out = PolyVerts {
            verts: [[0.0; 3]; MAX_VERTS_PER_POLY],
            count: 0,
        };
        for &v in &poly.verts[..(poly.vert_count as usize).min(MAX_VERTS_PER_POLY)] {
            if let Some(vert) = self.verts.get(v as usize) {
                out.verts[out.count] = *vert;
                out.count += 1;
            }
        }
        out
    }

    /// Serializes the current state of the tile in the tile data format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_tile_data()?.to_bytes()
    }

    /// Snapshot of the tile as tile data, with link state dropped
    pub fn to_tile_data(&self) -> Result<MeshTileData> {
        let header = self
            .header
            .clone()
            .ok_or(Error::Detour(Status::InvalidParam))?;
        let mut polys = self.polys.clone();
        for poly in &mut polys {
            poly.first_link = NULL_LINK;
        }
        Ok(MeshTileData {
            header,
            verts: self.verts.clone(),
            polys,
            detail_meshes: self.detail_meshes.clone(),
            detail_verts: self.detail_verts.clone(),
            detail_tris: self.detail_tris.clone(),
            bv_tree: self.bv_tree.clone(),
            off_mesh_cons: self.off_mesh_cons.clone(),
        })
    }

    fn install(&mut self, data: MeshTileData, flags: TileFlags) {
        let link_capacity = data.header.max_link_count.max(0) as usize;
        self.header = Some(data.header);
        self.verts = data.verts;
        self.polys = data.polys;
        self.links = Vec::with_capacity(link_capacity);
        self.links_free_list = NULL_LINK;
        self.detail_meshes = data.detail_meshes;
        self.detail_verts = data.detail_verts;
        self.detail_tris = data.detail_tris;
        self.bv_tree = data.bv_tree;
        self.off_mesh_cons = data.off_mesh_cons;
        self.flags = flags;
    }

    fn clear(&mut self) {
        let salt = self.salt;
        let index = self.index;
        *self = Self::empty(index);
        self.salt = salt;
    }

    fn alloc_link(&mut self) -> u32 {
        if self.links_free_list != NULL_LINK {
            let idx = self.links_free_list;
            self.links_free_list = self.links[idx as usize].next;
            idx
        } else {
            self.links.push(Link::default());
            (self.links.len() - 1) as u32
        }
    }

    fn free_link(&mut self, idx: u32) {
        self.links[idx as usize] = Link {
            next: self.links_free_list,
            ..Default::default()
        };
        self.links_free_list = idx;
    }

    fn push_link(&mut self, poly_idx: usize, mut link: Link) {
        let idx = self.alloc_link();
        link.next = self.polys[poly_idx].first_link;
        self.links[idx as usize] = link;
        self.polys[poly_idx].first_link = idx;
    }
}

/// Navigation mesh made of tiles
#[derive(Debug, Clone)]
pub struct NavMesh {
    params: NavMeshParams,
    tiles: Vec<MeshTile>,
    pos_lookup: BTreeMap<(i32, i32, i32), usize>,
    next_free: Option<usize>,
    salt_bits: u32,
    tile_bits: u32,
    poly_bits: u32,
}

impl NavMesh {
    /// Creates an empty navigation mesh
    ///
    /// Fails with `InvalidParam` when the parameters are not usable and with
    /// `OutOfMemory` when the tile slots cannot be allocated.
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if !visfinite(&params.origin)
            || !(params.tile_width.is_finite() && params.tile_width > 0.0)
            || !(params.tile_height.is_finite() && params.tile_height > 0.0)
        {
            return Err(Error::Detour(Status::InvalidParam));
        }
        if params.max_tiles <= 0 || params.max_polys_per_tile <= 0 {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let poly_bits = ilog2(next_pow2(params.max_polys_per_tile as u32));
        // Only allow 31 salt bits, since the salt mask is calculated using 32-bit uint
        let salt_bits = 31u32.min(32u32.saturating_sub(tile_bits + poly_bits));
        if salt_bits < 10 {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let max_tiles = params.max_tiles as usize;
        let mut tiles = Vec::new();
        tiles
            .try_reserve_exact(max_tiles)
            .map_err(|_| Error::Detour(Status::OutOfMemory))?;
        for i in 0..max_tiles {
            let mut tile = MeshTile::empty(i);
            tile.next = (i + 1 < max_tiles).then_some(i + 1);
            tiles.push(tile);
        }

        Ok(Self {
            params,
            tiles,
            pos_lookup: BTreeMap::new(),
            next_free: Some(0),
            salt_bits,
            tile_bits,
            poly_bits,
        })
    }

    /// Gets the construction parameters
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Gets the number of tile slots
    pub fn max_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Number of tiles currently in the mesh
    pub fn tile_count(&self) -> usize {
        self.pos_lookup.len()
    }

    /// Iterates all live tiles in slot order
    pub fn tiles(&self) -> impl Iterator<Item = &MeshTile> {
        self.tiles.iter().filter(|t| t.header.is_some())
    }

    /// Gets a tile slot by index
    pub fn tile_by_index(&self, index: usize) -> Option<&MeshTile> {
        self.tiles.get(index)
    }

    /// Encodes a polygon reference
    #[inline]
    pub fn encode_poly_id(&self, salt: u32, tile: u32, poly: u32) -> PolyRef {
        PolyRef::new(
            (salt << (self.poly_bits + self.tile_bits)) | (tile << self.poly_bits) | poly,
        )
    }

    /// Decodes a polygon reference into salt, tile index and polygon index
    #[inline]
    pub fn decode_poly_id(&self, reference: PolyRef) -> (u32, u32, u32) {
        (
            self.decode_poly_id_salt(reference),
            self.decode_poly_id_tile(reference),
            self.decode_poly_id_poly(reference),
        )
    }

    #[inline]
    pub fn decode_poly_id_salt(&self, reference: PolyRef) -> u32 {
        let salt_mask = (1u32 << self.salt_bits) - 1;
        (reference.id() >> (self.poly_bits + self.tile_bits)) & salt_mask
    }

    #[inline]
    pub fn decode_poly_id_tile(&self, reference: PolyRef) -> u32 {
        let tile_mask = (1u32 << self.tile_bits) - 1;
        (reference.id() >> self.poly_bits) & tile_mask
    }

    #[inline]
    pub fn decode_poly_id_poly(&self, reference: PolyRef) -> u32 {
        let poly_mask = (1u32 << self.poly_bits) - 1;
        reference.id() & poly_mask
    }

    /// Calculates the tile grid location of a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    /// Adds a tile from serialized tile data
    ///
    /// When `last_ref` is not null the tile is restored into the slot and with
    /// the salt that reference encodes, so saved tile references stay valid.
    pub fn add_tile(&mut self, data: Vec<u8>, flags: TileFlags, last_ref: TileRef) -> Result<TileRef> {
        let tile_data = MeshTileData::from_bytes(&data)?;
        self.add_tile_data(tile_data, flags, last_ref)
    }

    /// Adds an already parsed tile
    pub fn add_tile_data(
        &mut self,
        data: MeshTileData,
        flags: TileFlags,
        last_ref: TileRef,
    ) -> Result<TileRef> {
        data.header.validate()?;
        data.validate_indices()?;
        if data.polys.len() > (1usize << self.poly_bits) {
            log::warn!(
                "Tile has {} polygons, mesh allows {}",
                data.polys.len(),
                1usize << self.poly_bits
            );
            return Err(Error::Detour(Status::InvalidParam));
        }

        let location = (data.header.x, data.header.y, data.header.layer);
        if self.pos_lookup.contains_key(&location) {
            return Err(Error::Detour(Status::AlreadyOccupied));
        }

        let index = if last_ref.is_null() {
            let index = self.next_free.ok_or(Error::Detour(Status::OutOfMemory))?;
            self.next_free = self.tiles[index].next.take();
            index
        } else {
            let index = self.decode_poly_id_tile(last_ref) as usize;
            if index >= self.tiles.len() {
                return Err(Error::Detour(Status::OutOfMemory));
            }
            self.take_free_slot(index)?;
            let salt = self.decode_poly_id_salt(last_ref);
            if salt != 0 {
                self.tiles[index].salt = salt;
            } else {
                log::debug!("Tile reference {} has no salt, keeping slot salt", last_ref);
            }
            index
        };

        self.tiles[index].install(data, flags);
        self.pos_lookup.insert(location, index);

        self.connect_int_links(index);
        self.base_off_mesh_links(index);
        self.connect_ext_off_mesh_links(index, index, -1);

        let (x, y, _) = location;
        for other in self.tile_indices_at(x, y) {
            if other == index {
                continue;
            }
            self.connect_ext_links(index, other, -1);
            self.connect_ext_links(other, index, -1);
            self.connect_ext_off_mesh_links(index, other, -1);
            self.connect_ext_off_mesh_links(other, index, -1);
        }

        for side in 0..8 {
            for other in self.neighbour_tile_indices_at(x, y, side) {
                self.connect_ext_links(index, other, side);
                self.connect_ext_links(other, index, opposite_tile(side));
                self.connect_ext_off_mesh_links(index, other, side);
                self.connect_ext_off_mesh_links(other, index, opposite_tile(side));
            }
        }

        let tile_ref = self.tile_ref_by_index(index);
        log::debug!(
            "Added tile ({}, {}, {}) as {} with {} polygons",
            location.0,
            location.1,
            location.2,
            tile_ref,
            self.tiles[index].polys.len()
        );
        Ok(tile_ref)
    }

    fn take_free_slot(&mut self, index: usize) -> Result<()> {
        let mut prev = None;
        let mut cur = self.next_free;
        while let Some(c) = cur {
            if c == index {
                break;
            }
            prev = Some(c);
            cur = self.tiles[c].next;
        }
        if cur != Some(index) {
            return Err(Error::Detour(Status::AlreadyOccupied));
        }
        let next = self.tiles[index].next.take();
        match prev {
            None => self.next_free = next,
            Some(p) => self.tiles[p].next = next,
        }
        Ok(())
    }

    /// Removes a tile from the mesh
    ///
    /// Returns the tile data when the tile was added without
    /// `TileFlags::FREE_DATA`, handing ownership back to the caller.
    pub fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Option<Vec<u8>>> {
        if tile_ref.is_null() {
            return Err(Error::Detour(Status::InvalidParam));
        }
        let (salt, index, _) = self.decode_poly_id(tile_ref);
        let index = index as usize;
        let tile = self
            .tiles
            .get(index)
            .ok_or(Error::Detour(Status::InvalidParam))?;
        let header = match &tile.header {
            Some(header) if tile.salt == salt => header.clone(),
            _ => return Err(Error::Detour(Status::InvalidParam)),
        };

        let data = if tile.flags.contains(TileFlags::FREE_DATA) {
            None
        } else {
            Some(tile.to_bytes()?)
        };

        self.pos_lookup.remove(&(header.x, header.y, header.layer));

        for other in self.tile_indices_at(header.x, header.y) {
            self.unconnect_links(other, index);
        }
        for side in 0..8 {
            for other in self.neighbour_tile_indices_at(header.x, header.y, side) {
                self.unconnect_links(other, index);
            }
        }

        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile = &mut self.tiles[index];
        tile.clear();
        tile.salt = (tile.salt + 1) & salt_mask;
        if tile.salt == 0 {
            tile.salt += 1;
        }
        tile.next = self.next_free;
        self.next_free = Some(index);

        log::debug!("Removed tile ({}, {}, {})", header.x, header.y, header.layer);
        Ok(data)
    }

    /// Gets the tile at a grid location and layer
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.pos_lookup.get(&(x, y, layer)).map(|&i| &self.tiles[i])
    }

    /// Gets all layers at a grid location, ordered by layer
    pub fn get_tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.tile_indices_at(x, y)
            .into_iter()
            .map(|i| &self.tiles[i])
            .collect()
    }

    /// Gets the reference of the tile at a grid location, null if none
    pub fn get_tile_ref_at(&self, x: i32, y: i32, layer: i32) -> TileRef {
        self.pos_lookup
            .get(&(x, y, layer))
            .map_or(TileRef::null(), |&i| self.tile_ref_by_index(i))
    }

    /// Gets the reference of a tile
    pub fn get_tile_ref(&self, tile: &MeshTile) -> TileRef {
        if tile.header.is_none() {
            return TileRef::null();
        }
        self.tile_ref_by_index(tile.index)
    }

    /// Gets a live tile by reference
    pub fn get_tile_by_ref(&self, tile_ref: TileRef) -> Option<&MeshTile> {
        if tile_ref.is_null() {
            return None;
        }
        let (salt, index, _) = self.decode_poly_id(tile_ref);
        self.tiles
            .get(index as usize)
            .filter(|t| t.salt == salt && t.header.is_some())
    }

    /// Gets the reference of polygon 0 of a tile
    pub fn get_poly_ref_base(&self, tile: &MeshTile) -> PolyRef {
        self.encode_poly_id(tile.salt, tile.index as u32, 0)
    }

    fn tile_ref_by_index(&self, index: usize) -> TileRef {
        self.encode_poly_id(self.tiles[index].salt, index as u32, 0)
    }

    fn tile_indices_at(&self, x: i32, y: i32) -> Vec<usize> {
        self.pos_lookup
            .range((x, y, i32::MIN)..=(x, y, i32::MAX))
            .map(|(_, &i)| i)
            .collect()
    }

    fn neighbour_tile_indices_at(&self, x: i32, y: i32, side: i32) -> Vec<usize> {
        let (nx, ny) = match side {
            0 => (x + 1, y),
            1 => (x + 1, y + 1),
            2 => (x, y + 1),
            3 => (x - 1, y + 1),
            4 => (x - 1, y),
            5 => (x - 1, y - 1),
            6 => (x, y - 1),
            7 => (x + 1, y - 1),
            _ => (x, y),
        };
        self.tile_indices_at(nx, ny)
    }

    fn decode_valid(&self, reference: PolyRef) -> Result<(usize, usize)> {
        if reference.is_null() {
            return Err(Error::Detour(Status::InvalidParam));
        }
        let (salt, it, ip) = self.decode_poly_id(reference);
        let tile = self
            .tiles
            .get(it as usize)
            .ok_or(Error::Detour(Status::InvalidParam))?;
        if tile.salt != salt || tile.header.is_none() || ip as usize >= tile.polys.len() {
            return Err(Error::Detour(Status::InvalidParam));
        }
        Ok((it as usize, ip as usize))
    }

    /// Gets the tile and polygon of a polygon reference
    pub fn get_tile_and_poly_by_ref(&self, reference: PolyRef) -> Result<(&MeshTile, &Poly)> {
        let (it, ip) = self.decode_valid(reference)?;
        let tile = &self.tiles[it];
        Ok((tile, &tile.polys[ip]))
    }

    /// Checks whether a polygon reference points at a live polygon
    pub fn is_valid_poly_ref(&self, reference: PolyRef) -> bool {
        self.decode_valid(reference).is_ok()
    }

    pub fn get_poly_flags(&self, reference: PolyRef) -> Result<PolyFlags> {
        let (_, poly) = self.get_tile_and_poly_by_ref(reference)?;
        Ok(poly.flags)
    }

    pub fn set_poly_flags(&mut self, reference: PolyRef, flags: PolyFlags) -> Result<()> {
        let (it, ip) = self.decode_valid(reference)?;
        self.tiles[it].polys[ip].flags = flags;
        Ok(())
    }

    pub fn get_poly_area(&self, reference: PolyRef) -> Result<u8> {
        let (_, poly) = self.get_tile_and_poly_by_ref(reference)?;
        Ok(poly.area())
    }

    pub fn set_poly_area(&mut self, reference: PolyRef, area: u8) -> Result<()> {
        let (it, ip) = self.decode_valid(reference)?;
        self.tiles[it].polys[ip].set_area(area);
        Ok(())
    }

    /// Gets the end points of an off-mesh connection, ordered by travel
    /// direction when entering from `prev_ref`
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> Result<([f32; 3], [f32; 3])> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(poly_ref)?;
        if poly.poly_type() != PolyType::OffMeshConnection {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let (mut idx0, mut idx1) = (0, 1);
        if let Some(link) = tile.links_of(poly).find(|l| l.edge == 0) {
            if link.reference != prev_ref {
                idx0 = 1;
                idx1 = 0;
            }
        }
        Ok((
            tile.verts[poly.verts[idx0] as usize],
            tile.verts[poly.verts[idx1] as usize],
        ))
    }

    /// Finds the point on a polygon closest to `pos`
    ///
    /// The flag tells whether `pos` lies over the polygon.
    pub fn closest_point_on_poly(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<([f32; 3], bool)> {
        let (it, ip) = self.decode_valid(reference)?;
        Ok(self.closest_point_on_poly_in_tile(&self.tiles[it], ip, pos))
    }

    /// Finds the point on the polygon boundary closest to `pos`, or `pos`
    /// itself when it lies inside the polygon
    pub fn closest_point_on_poly_boundary(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<[f32; 3]> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(reference)?;
        Ok(closest_point_on_boundary(tile.poly_verts(poly).as_slice(), pos))
    }

    /// Gets the height of a polygon at `pos`, `None` if `pos` is outside it
    pub fn get_poly_height(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<Option<f32>> {
        let (it, ip) = self.decode_valid(reference)?;
        Ok(self.poly_height_in_tile(&self.tiles[it], ip, pos))
    }

    /// Center of a polygon
    pub fn get_poly_center(&self, reference: PolyRef) -> Result<[f32; 3]> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(reference)?;
        Ok(calc_poly_center(tile.poly_verts(poly).as_slice()))
    }

    pub(crate) fn closest_point_on_poly_in_tile(
        &self,
        tile: &MeshTile,
        ip: usize,
        pos: &[f32; 3],
    ) -> ([f32; 3], bool) {
        let poly = &tile.polys[ip];
        let verts = tile.poly_verts(poly);
        if poly.poly_type() == PolyType::OffMeshConnection {
            let v = verts.as_slice();
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v[0], &v[1]);
            return (vlerp(&v[0], &v[1], t), false);
        }

        match self.poly_height_in_tile(tile, ip, pos) {
            Some(h) => ([pos[0], h, pos[2]], true),
            None => (closest_point_on_boundary(verts.as_slice(), pos), false),
        }
    }

    pub(crate) fn poly_height_in_tile(&self, tile: &MeshTile, ip: usize, pos: &[f32; 3]) -> Option<f32> {
        let poly = &tile.polys[ip];
        let verts = tile.poly_verts(poly);
        let v = verts.as_slice();

        if poly.poly_type() == PolyType::OffMeshConnection {
            let (_, t) = dist_pt_seg_sqr_2d(pos, &v[0], &v[1]);
            return Some(v[0][1] + (v[1][1] - v[0][1]) * t);
        }

        if !point_in_polygon_2d(pos, v) {
            return None;
        }

        match tile.detail_meshes.get(ip).filter(|d| d.tri_count > 0) {
            Some(detail) => {
                let nv = poly.vert_count;
                let vertex = |k: u8| -> Option<[f32; 3]> {
                    if k < nv {
                        tile.verts.get(poly.verts[k as usize] as usize).copied()
                    } else {
                        tile.detail_verts
                            .get(detail.vert_base as usize + (k - nv) as usize)
                            .copied()
                    }
                };
                for j in 0..detail.tri_count as usize {
                    let Some(t) = tile.detail_tris.get(detail.tri_base as usize + j) else {
                        break;
                    };
                    if let (Some(a), Some(b), Some(c)) = (vertex(t[0]), vertex(t[1]), vertex(t[2])) {
                        if let Some(h) = closest_height_point_triangle(pos, &a, &b, &c) {
                            return Some(h);
                        }
                    }
                }
            }
            None => {
                for j in 1..v.len().saturating_sub(1) {
                    if let Some(h) = closest_height_point_triangle(pos, &v[0], &v[j], &v[j + 1]) {
                        return Some(h);
                    }
                }
            }
        }

        // Degenerate triangles: the point sits on an edge
        Some(closest_point_on_boundary_edges(v, pos)[1])
    }

    /// Polygons of a tile whose bounds overlap the query box
    pub(crate) fn query_polygons_in_tile(
        &self,
        tile: &MeshTile,
        qmin: &[f32; 3],
        qmax: &[f32; 3],
    ) -> Vec<PolyRef> {
        let base = self.get_poly_ref_base(tile);
        let mut out = Vec::new();
        for (i, poly) in tile.polys.iter().enumerate() {
            if poly.poly_type() == PolyType::OffMeshConnection {
                continue;
            }
            let verts = tile.poly_verts(poly);
            let mut bmin = [f32::MAX; 3];
            let mut bmax = [f32::MIN; 3];
            for v in verts.as_slice() {
                for k in 0..3 {
                    bmin[k] = bmin[k].min(v[k]);
                    bmax[k] = bmax[k].max(v[k]);
                }
            }
            if overlap_bounds(qmin, qmax, &bmin, &bmax) {
                out.push(PolyRef::new(base.id() | i as u32));
            }
        }
        out
    }

    /// Nearest polygon of one tile, ignoring filters
    pub(crate) fn find_nearest_poly_in_tile(
        &self,
        tile: &MeshTile,
        center: &[f32; 3],
        half_extents: &[f32; 3],
    ) -> Option<(PolyRef, [f32; 3])> {
        let bmin = [
            center[0] - half_extents[0],
            center[1] - half_extents[1],
            center[2] - half_extents[2],
        ];
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];

        let climb = tile.walkable_climb();
        let mut nearest = None;
        let mut nearest_dist = f32::MAX;
        for reference in self.query_polygons_in_tile(tile, &bmin, &bmax) {
            let ip = self.decode_poly_id_poly(reference) as usize;
            let (closest, over_poly) = self.closest_point_on_poly_in_tile(tile, ip, center);
            let d = if over_poly {
                // Being directly over a polygon counts as on it within climb height
                let d = (center[1] - closest[1]).abs() - climb;
                if d > 0.0 {
                    d * d
                } else {
                    0.0
                }
            } else {
                vdist_sqr(center, &closest)
            };
            if d < nearest_dist {
                nearest_dist = d;
                nearest = Some((reference, closest));
            }
        }
        nearest
    }

    fn connect_int_links(&mut self, index: usize) {
        let base = self.tile_ref_by_index(index).id();
        let tile = &mut self.tiles[index];
        for i in 0..tile.polys.len() {
            tile.polys[i].first_link = NULL_LINK;
            if tile.polys[i].poly_type() == PolyType::OffMeshConnection {
                continue;
            }
            // Build edge links backwards so that the links are in edge order
            for j in (0..tile.polys[i].vert_count as usize).rev() {
                let nei = tile.polys[i].neis[j];
                if nei == 0 || nei & EXT_LINK != 0 {
                    continue;
                }
                tile.push_link(
                    i,
                    Link {
                        reference: PolyRef::new(base | (nei as u32 - 1)),
                        edge: j as u8,
                        side: 0xff,
                        ..Default::default()
                    },
                );
            }
        }
    }

    fn connect_ext_links(&mut self, index: usize, target: usize, side: i32) {
        let mut pending = Vec::new();
        {
            let tile = &self.tiles[index];
            if tile.header.is_none() || self.tiles[target].header.is_none() {
                return;
            }
            for (i, poly) in tile.polys.iter().enumerate() {
                let nv = poly.vert_count as usize;
                for j in 0..nv {
                    if poly.neis[j] & EXT_LINK == 0 {
                        continue;
                    }
                    let dir = (poly.neis[j] & 0xff) as i32;
                    if side != -1 && dir != side {
                        continue;
                    }

                    let va = tile.verts[poly.verts[j] as usize];
                    let vb = tile.verts[poly.verts[(j + 1) % nv] as usize];
                    for (reference, area) in
                        self.find_connecting_polys(&va, &vb, target, opposite_tile(dir))
                    {
                        let (mut tmin, mut tmax) = match dir {
                            0 | 4 => (
                                (area[0] - va[2]) / (vb[2] - va[2]),
                                (area[1] - va[2]) / (vb[2] - va[2]),
                            ),
                            2 | 6 => (
                                (area[0] - va[0]) / (vb[0] - va[0]),
                                (area[1] - va[0]) / (vb[0] - va[0]),
                            ),
                            _ => (0.0, 1.0),
                        };
                        if tmin > tmax {
                            std::mem::swap(&mut tmin, &mut tmax);
                        }
                        pending.push((
                            i,
                            Link {
                                reference,
                                edge: j as u8,
                                side: dir as u8,
                                bmin: (tmin.clamp(0.0, 1.0) * 255.0).round() as u8,
                                bmax: (tmax.clamp(0.0, 1.0) * 255.0).round() as u8,
                                ..Default::default()
                            },
                        ));
                    }
                }
            }
        }

        let tile = &mut self.tiles[index];
        for (poly_idx, link) in pending {
            tile.push_link(poly_idx, link);
        }
    }

    fn find_connecting_polys(
        &self,
        va: &[f32; 3],
        vb: &[f32; 3],
        target: usize,
        side: i32,
    ) -> Vec<(PolyRef, [f32; 2])> {
        const MAX_CONNECTIONS: usize = 4;

        let tile = &self.tiles[target];
        let (amin, amax) = calc_slab_end_points(va, vb, side);
        let apos = get_slab_coord(va, side);
        let climb = tile.walkable_climb();
        let base = self.get_poly_ref_base(tile);
        let m = EXT_LINK | side as u16;

        let mut out = Vec::new();
        for (i, poly) in tile.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                if poly.neis[j] != m {
                    continue;
                }
                let vc = &tile.verts[poly.verts[j] as usize];
                let vd = &tile.verts[poly.verts[(j + 1) % nv] as usize];
                let bpos = get_slab_coord(vc, side);
                if (apos - bpos).abs() > 0.01 {
                    continue;
                }
                let (bmin, bmax) = calc_slab_end_points(vc, vd, side);
                if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, climb) {
                    continue;
                }
                if out.len() < MAX_CONNECTIONS {
                    out.push((
                        PolyRef::new(base.id() | i as u32),
                        [amin[0].max(bmin[0]), amax[0].min(bmax[0])],
                    ));
                }
                break;
            }
        }
        out
    }

    fn unconnect_links(&mut self, index: usize, target: usize) {
        let target_num = target as u32;
        let tile_mask = (1u32 << self.tile_bits) - 1;
        let poly_bits = self.poly_bits;
        let tile = &mut self.tiles[index];

        for i in 0..tile.polys.len() {
            let mut j = tile.polys[i].first_link;
            let mut prev = NULL_LINK;
            while j != NULL_LINK {
                let link = tile.links[j as usize];
                if (link.reference.id() >> poly_bits) & tile_mask == target_num {
                    if prev == NULL_LINK {
                        tile.polys[i].first_link = link.next;
                    } else {
                        tile.links[prev as usize].next = link.next;
                    }
                    tile.free_link(j);
                } else {
                    prev = j;
                }
                j = link.next;
            }
        }
    }

    fn base_off_mesh_links(&mut self, index: usize) {
        let mut pending = Vec::new();
        {
            let tile = &self.tiles[index];
            let climb = tile.walkable_climb();
            for con in &tile.off_mesh_cons {
                let ext = [con.rad, climb, con.rad];
                let p = con.start_pos();
                let Some((reference, nearest)) = self.find_nearest_poly_in_tile(tile, &p, &ext)
                else {
                    continue;
                };
                if sqr(nearest[0] - p[0]) + sqr(nearest[2] - p[2]) > sqr(con.rad) {
                    continue;
                }
                pending.push((con.poly as usize, reference, nearest));
            }
        }

        let base = self.tile_ref_by_index(index).id();
        let poly_mask = (1u32 << self.poly_bits) - 1;
        let tile = &mut self.tiles[index];
        for (con_poly, landing, nearest) in pending {
            // Snap the start of the connection onto the mesh
            let v = tile.polys[con_poly].verts[0] as usize;
            tile.verts[v] = nearest;

            tile.push_link(
                con_poly,
                Link {
                    reference: landing,
                    edge: 0,
                    side: 0xff,
                    ..Default::default()
                },
            );
            tile.push_link(
                (landing.id() & poly_mask) as usize,
                Link {
                    reference: PolyRef::new(base | con_poly as u32),
                    edge: 0xff,
                    side: 0xff,
                    ..Default::default()
                },
            );
        }
    }

    fn connect_ext_off_mesh_links(&mut self, index: usize, target: usize, side: i32) {
        let opposite_side = if side == -1 {
            0xff
        } else {
            opposite_tile(side) as u8
        };

        let mut pending = Vec::new();
        {
            let tile = &self.tiles[index];
            let target_tile = &self.tiles[target];
            if tile.header.is_none() || target_tile.header.is_none() {
                return;
            }
            let climb = target_tile.walkable_climb();
            for con in &target_tile.off_mesh_cons {
                if con.side != opposite_side {
                    continue;
                }
                // Skip connections whose start could not be connected
                if target_tile.polys[con.poly as usize].first_link == NULL_LINK {
                    continue;
                }
                let ext = [con.rad, climb, con.rad];
                let p = con.end_pos();
                let Some((reference, nearest)) = self.find_nearest_poly_in_tile(tile, &p, &ext)
                else {
                    continue;
                };
                if sqr(nearest[0] - p[0]) + sqr(nearest[2] - p[2]) > sqr(con.rad) {
                    continue;
                }
                pending.push((con.poly as usize, reference, nearest, con.is_bidirectional()));
            }
        }

        let target_base = self.tile_ref_by_index(target).id();
        let poly_mask = (1u32 << self.poly_bits) - 1;
        let back_side = if side == -1 { 0xff } else { side as u8 };
        for (con_poly, landing, nearest, bidirectional) in pending {
            let target_tile = &mut self.tiles[target];
            let v = target_tile.polys[con_poly].verts[1] as usize;
            target_tile.verts[v] = nearest;
            target_tile.push_link(
                con_poly,
                Link {
                    reference: landing,
                    edge: 1,
                    side: opposite_side,
                    ..Default::default()
                },
            );

            if bidirectional {
                self.tiles[index].push_link(
                    (landing.id() & poly_mask) as usize,
                    Link {
                        reference: PolyRef::new(target_base | con_poly as u32),
                        edge: 0xff,
                        side: back_side,
                        ..Default::default()
                    },
                );
            }
        }
    }
}

/// Side of the neighbouring tile facing `side`
#[inline]
pub fn opposite_tile(side: i32) -> i32 {
    (side + 4) & 0x7
}

fn get_slab_coord(va: &[f32; 3], side: i32) -> f32 {
    match side {
        0 | 4 => va[0],
        2 | 6 => va[2],
        _ => 0.0,
    }
}

fn calc_slab_end_points(va: &[f32; 3], vb: &[f32; 3], side: i32) -> ([f32; 2], [f32; 2]) {
    match side {
        0 | 4 => {
            if va[2] < vb[2] {
                ([va[2], va[1]], [vb[2], vb[1]])
            } else {
                ([vb[2], vb[1]], [va[2], va[1]])
            }
        }
        2 | 6 => {
            if va[0] < vb[0] {
                ([va[0], va[1]], [vb[0], vb[1]])
            } else {
                ([vb[0], vb[1]], [va[0], va[1]])
            }
        }
        _ => ([0.0; 2], [0.0; 2]),
    }
}

fn overlap_slabs(
    amin: &[f32; 2],
    amax: &[f32; 2],
    bmin: &[f32; 2],
    bmax: &[f32; 2],
    px: f32,
    py: f32,
) -> bool {
    // Check for horizontal overlap; the segment is shrunk a little so that
    // slabs which touch at end points are not connected
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    // Check vertical overlap
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing segments always overlap
    if dmin * dmax < 0.0 {
        return true;
    }

    // Check for overlap at endpoints
    let thr = sqr(py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

fn closest_point_on_boundary(verts: &[[f32; 3]], pos: &[f32; 3]) -> [f32; 3] {
    if point_in_polygon_2d(pos, verts) {
        return *pos;
    }
    closest_point_on_boundary_edges(verts, pos)
}

fn closest_point_on_boundary_edges(verts: &[[f32; 3]], pos: &[f32; 3]) -> [f32; 3] {
    let (_, edges) = distance_pt_poly_edges_sqr(pos, verts);
    let Some((imin, &(_, t))) = edges
        .iter()
        .enumerate()
        .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
    else {
        return *pos;
    };
    let va = &verts[imin];
    let vb = &verts[(imin + 1) % verts.len()];
    vlerp(va, vb, t)
}
