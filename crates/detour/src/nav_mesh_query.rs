//! Navigation mesh query implementation for Detour
//!
//! Answers spatial and path queries against a [`NavMesh`]: nearest polygon
//! lookup, polygon queries, graph search, string pulling and raycasts.

use detour_common::{
    dist_pt_seg_sqr_2d, intersect_segment_poly_2d, next_pow2, sqr, tri_area_2d, vequal,
    visfinite, vlerp, vmad, vnormalize, vsub, Error, Result, Status,
};

use super::nav_mesh::NavMesh;
use super::node_pool::{NodePool, NodeQueue, MAX_NODES};
use super::query_filter::QueryFilter;
use super::sliced_pathfinding::{PathResult, SearchState, SlicedPathSession};
use super::{FindPathOptions, PolyRef, PolyType, RaycastOptions, StraightPathFlags};

/// Node pool size used when none is given
pub const DEFAULT_MAX_NODES: usize = 2048;

/// Result of a raycast along the mesh surface
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastHit {
    /// Hit parameter along the segment, `f32::MAX` when the end was reached
    pub t: f32,
    /// Normal of the wall that was hit
    pub hit_normal: [f32; 3],
    /// Edge of the last visited polygon the ray left through
    pub hit_edge_index: Option<usize>,
    /// Polygons visited by the ray
    pub path: Vec<PolyRef>,
    /// Traversal cost, only accumulated with `RaycastOptions::USE_COSTS`
    pub path_cost: f32,
}

impl RaycastHit {
    /// Whether the ray reached its end without hitting a wall
    pub fn reached_end(&self) -> bool {
        self.t == f32::MAX
    }
}

/// String-pulled path through a polygon corridor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StraightPath {
    pub points: Vec<[f32; 3]>,
    pub flags: Vec<StraightPathFlags>,
    pub refs: Vec<PolyRef>,
    /// The corridor was cut short by an invalid polygon
    pub partial: bool,
    /// More vertices were needed than allowed
    pub truncated: bool,
}

impl StraightPath {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends a vertex, merging it with the previous one when equal
    ///
    /// Returns `false` once the path is complete or full.
    fn append_vertex(
        &mut self,
        pos: &[f32; 3],
        flags: StraightPathFlags,
        reference: PolyRef,
        max_points: usize,
    ) -> bool {
        if let Some(last) = self.points.last() {
            if vequal(last, pos) {
                let i = self.points.len() - 1;
                self.flags[i] = flags;
                self.refs[i] = reference;
                return true;
            }
        }

        self.points.push(*pos);
        self.flags.push(flags);
        self.refs.push(reference);

        if self.points.len() >= max_points {
            self.truncated = true;
            return false;
        }
        flags != StraightPathFlags::END
    }
}

/// Query context bound to one navigation mesh
///
/// The node pool and open list are owned by the query and reused by every
/// search; a [`SlicedPathSession`] borrows them exclusively.
#[derive(Debug)]
pub struct NavMeshQuery<'a> {
    pub(crate) nav_mesh: &'a NavMesh,
    pub(crate) node_pool: NodePool,
    pub(crate) open_list: NodeQueue,
    pub(crate) search: SearchState,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query with a node pool of `max_nodes` entries
    pub fn new(nav_mesh: &'a NavMesh, max_nodes: usize) -> Result<Self> {
        if max_nodes == 0 || max_nodes > MAX_NODES {
            return Err(Error::Detour(Status::InvalidParam));
        }
        let hash_size = next_pow2((max_nodes / 4) as u32) as usize;
        Ok(Self {
            nav_mesh,
            node_pool: NodePool::new(max_nodes, hash_size),
            open_list: NodeQueue::new(max_nodes),
            search: SearchState::default(),
        })
    }

    pub fn nav_mesh(&self) -> &'a NavMesh {
        self.nav_mesh
    }

    pub fn max_nodes(&self) -> usize {
        self.node_pool.max_nodes()
    }

    /// Starts a sliced search session on this query
    pub fn sliced_session(&mut self) -> SlicedPathSession<'_, 'a> {
        SlicedPathSession::new(self)
    }

    /// Finds the polygon nearest to `center` within the search box
    ///
    /// Fails with `NotFound` when no polygon passing the filter overlaps the box.
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<(PolyRef, [f32; 3])> {
        let mut nearest = None;
        let mut nearest_dist = f32::MAX;

        for reference in self.query_polygons(center, half_extents, filter)? {
            let (tile, _) = self.nav_mesh.get_tile_and_poly_by_ref(reference)?;
            let (closest, over_poly) = self.nav_mesh.closest_point_on_poly(reference, center)?;

            // Being over a polygon within climb height counts as being on it
            let d = if over_poly {
                let d = (center[1] - closest[1]).abs() - tile.walkable_climb();
                if d > 0.0 {
                    d * d
                } else {
                    0.0
                }
            } else {
                detour_common::vdist_sqr(center, &closest)
            };

            if d < nearest_dist {
                nearest_dist = d;
                nearest = Some((reference, closest));
            }
        }

        nearest.ok_or(Error::Detour(Status::NotFound))
    }

    /// Collects the polygons passing the filter whose bounds overlap the search box
    pub fn query_polygons(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Result<Vec<PolyRef>> {
        if !visfinite(center) || !visfinite(half_extents) || half_extents.iter().any(|&e| e < 0.0)
        {
            return Err(Error::Detour(Status::InvalidParam));
        }

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

        let (minx, miny) = self.nav_mesh.calc_tile_loc(&bmin);
        let (maxx, maxy) = self.nav_mesh.calc_tile_loc(&bmax);

        let mut polys = Vec::new();
        for y in miny..=maxy {
            for x in minx..=maxx {
                for tile in self.nav_mesh.get_tiles_at(x, y) {
                    for reference in self.nav_mesh.query_polygons_in_tile(tile, &bmin, &bmax) {
                        let ip = self.nav_mesh.decode_poly_id_poly(reference) as usize;
                        if filter.pass_filter(reference, tile, &tile.polys[ip]) {
                            polys.push(reference);
                        }
                    }
                }
            }
        }
        Ok(polys)
    }

    /// Finds a polygon corridor from `start_ref` to `end_ref`
    ///
    /// Runs a complete search in one go and writes the corridor into `path`.
    /// When the goal cannot be reached the corridor ends at the polygon
    /// nearest to it and the result is marked partial.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        path: &mut [PolyRef],
    ) -> Result<PathResult> {
        if path.is_empty() {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let mut session = self.sliced_session();
        session.init(
            start_ref,
            end_ref,
            start_pos,
            end_pos,
            filter,
            FindPathOptions::empty(),
        )?;
        while session.state().is_in_progress() {
            session.update(usize::MAX)?;
        }
        session.finalize(path)
    }

    /// String-pulls a polygon corridor into a list of turning points
    ///
    /// At most `max_points` vertices are produced.
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
    ) -> Result<StraightPath> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Err(Error::Detour(Status::InvalidParam));
        };
        if first.is_null() || max_points == 0 {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let mesh = self.nav_mesh;
        let invalid = |_| Error::Detour(Status::InvalidParam);
        let closest_start = mesh.closest_point_on_poly_boundary(first, start_pos).map_err(invalid)?;
        let mut closest_end = mesh.closest_point_on_poly_boundary(last, end_pos).map_err(invalid)?;

        let mut out = StraightPath::default();
        if !out.append_vertex(&closest_start, StraightPathFlags::START, first, max_points) {
            return Ok(out);
        }

        if path.len() > 1 {
            let mut apex = closest_start;
            let mut portal_left = apex;
            let mut portal_right = apex;
            let mut left_index = 0;
            let mut right_index = 0;
            let mut left_poly_type = PolyType::Ground;
            let mut right_poly_type = PolyType::Ground;
            let mut left_poly_ref = first;
            let mut right_poly_ref = first;

            let mut i = 0;
            while i < path.len() {
                let (left, right, to_type) = if i + 1 < path.len() {
                    match portal_points(mesh, path[i], path[i + 1]) {
                        Ok((left, right, _, to_type)) => {
                            // Starting really close to the portal, advance
                            if i == 0 && dist_pt_seg_sqr_2d(&apex, &left, &right).0 < sqr(0.001) {
                                i += 1;
                                continue;
                            }
                            (left, right, to_type)
                        }
                        Err(_) => {
                            // path[i + 1] is not a valid polygon, end the path at path[i]
                            closest_end = mesh
                                .closest_point_on_poly_boundary(path[i], end_pos)
                                .map_err(invalid)?;
                            out.append_vertex(
                                &closest_end,
                                StraightPathFlags::empty(),
                                path[i],
                                max_points,
                            );
                            out.partial = true;
                            return Ok(out);
                        }
                    }
                } else {
                    (closest_end, closest_end, PolyType::Ground)
                };

                // Right vertex
                if tri_area_2d(&apex, &portal_right, &right) <= 0.0 {
                    if vequal(&apex, &portal_right) || tri_area_2d(&apex, &portal_left, &right) > 0.0 {
                        portal_right = right;
                        right_poly_ref = path.get(i + 1).copied().unwrap_or_default();
                        right_poly_type = to_type;
                        right_index = i;
                    } else {
                        apex = portal_left;
                        let apex_index = left_index;

                        let flags = if left_poly_ref.is_null() {
                            StraightPathFlags::END
                        } else if left_poly_type == PolyType::OffMeshConnection {
                            StraightPathFlags::OFFMESH_CONNECTION
                        } else {
                            StraightPathFlags::empty()
                        };
                        if !out.append_vertex(&apex, flags, left_poly_ref, max_points) {
                            return Ok(out);
                        }

                        portal_left = apex;
                        portal_right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left vertex
                if tri_area_2d(&apex, &portal_left, &left) >= 0.0 {
                    if vequal(&apex, &portal_left) || tri_area_2d(&apex, &portal_right, &left) < 0.0 {
                        portal_left = left;
                        left_poly_ref = path.get(i + 1).copied().unwrap_or_default();
                        left_poly_type = to_type;
                        left_index = i;
                    } else {
                        apex = portal_right;
                        let apex_index = right_index;

                        let flags = if right_poly_ref.is_null() {
                            StraightPathFlags::END
                        } else if right_poly_type == PolyType::OffMeshConnection {
                            StraightPathFlags::OFFMESH_CONNECTION
                        } else {
                            StraightPathFlags::empty()
                        };
                        if !out.append_vertex(&apex, flags, right_poly_ref, max_points) {
                            return Ok(out);
                        }

                        portal_left = apex;
                        portal_right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }
        }

        out.append_vertex(&closest_end, StraightPathFlags::END, PolyRef::null(), max_points);
        Ok(out)
    }

    /// Casts a walkability ray from `start_pos` towards `end_pos`
    pub fn raycast(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        options: RaycastOptions,
    ) -> Result<RaycastHit> {
        raycast(self.nav_mesh, start_ref, start_pos, end_pos, filter, options)
    }

    /// Gets the portal shared by two adjacent polygons as (left, right)
    pub fn get_portal_points(&self, from: PolyRef, to: PolyRef) -> Result<([f32; 3], [f32; 3])> {
        let (left, right, _, _) = portal_points(self.nav_mesh, from, to)?;
        Ok((left, right))
    }

    /// Gets the middle of the portal shared by two adjacent polygons
    pub fn get_edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<[f32; 3]> {
        edge_mid_point(self.nav_mesh, from, to)
    }

    /// Finds the point on a polygon closest to `pos`
    pub fn closest_point_on_poly(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<([f32; 3], bool)> {
        self.nav_mesh.closest_point_on_poly(reference, pos)
    }

    /// Checks that a reference is valid and passes the filter
    pub fn is_valid_poly_ref(&self, reference: PolyRef, filter: &QueryFilter) -> bool {
        self.nav_mesh
            .get_tile_and_poly_by_ref(reference)
            .is_ok_and(|(tile, poly)| filter.pass_filter(reference, tile, poly))
    }
}

/// Portal between two adjacent polygons as (left, right, from type, to type)
pub(crate) fn portal_points(
    mesh: &NavMesh,
    from: PolyRef,
    to: PolyRef,
) -> Result<([f32; 3], [f32; 3], PolyType, PolyType)> {
    let (from_tile, from_poly) = mesh.get_tile_and_poly_by_ref(from)?;
    let (to_tile, to_poly) = mesh.get_tile_and_poly_by_ref(to)?;
    let from_type = from_poly.poly_type();
    let to_type = to_poly.poly_type();

    let link = from_tile
        .links_of(from_poly)
        .find(|l| l.reference == to)
        .ok_or(Error::Detour(Status::InvalidParam))?;

    // Off-mesh connections collapse the portal onto the connection end point
    if from_type == PolyType::OffMeshConnection {
        let v = from_tile.verts[from_poly.verts[link.edge as usize] as usize];
        return Ok((v, v, from_type, to_type));
    }
    if to_type == PolyType::OffMeshConnection {
        let back = to_tile
            .links_of(to_poly)
            .find(|l| l.reference == from)
            .ok_or(Error::Detour(Status::InvalidParam))?;
        let v = to_tile.verts[to_poly.verts[back.edge as usize] as usize];
        return Ok((v, v, from_type, to_type));
    }

    let edge = link.edge as usize;
    let nv = from_poly.vert_count as usize;
    if edge >= nv {
        return Err(Error::Detour(Status::InvalidParam));
    }
    let v0 = from_tile.verts[from_poly.verts[edge] as usize];
    let v1 = from_tile.verts[from_poly.verts[(edge + 1) % nv] as usize];

    // Clamp tile border portals to the part shared with the neighbour
    if link.side != 0xff && (link.bmin != 0 || link.bmax != 255) {
        let s = 1.0 / 255.0;
        let left = vlerp(&v0, &v1, link.bmin as f32 * s);
        let right = vlerp(&v0, &v1, link.bmax as f32 * s);
        return Ok((left, right, from_type, to_type));
    }
    Ok((v0, v1, from_type, to_type))
}

pub(crate) fn edge_mid_point(mesh: &NavMesh, from: PolyRef, to: PolyRef) -> Result<[f32; 3]> {
    let (left, right, _, _) = portal_points(mesh, from, to)?;
    Ok(vlerp(&left, &right, 0.5))
}

/// Walks the mesh along a segment, polygon by polygon, until a wall is hit
/// or the end of the segment is reached
pub(crate) fn raycast(
    mesh: &NavMesh,
    start_ref: PolyRef,
    start_pos: &[f32; 3],
    end_pos: &[f32; 3],
    filter: &QueryFilter,
    options: RaycastOptions,
) -> Result<RaycastHit> {
    if !mesh.is_valid_poly_ref(start_ref) || !visfinite(start_pos) || !visfinite(end_pos) {
        return Err(Error::Detour(Status::InvalidParam));
    }

    let mut hit = RaycastHit {
        t: 0.0,
        hit_normal: [0.0; 3],
        hit_edge_index: None,
        path: Vec::new(),
        path_cost: 0.0,
    };

    let dir = vsub(end_pos, start_pos);
    let mut cur_pos = *start_pos;
    let mut cur_ref = start_ref;

    loop {
        let (tile, poly) = mesh.get_tile_and_poly_by_ref(cur_ref)?;
        let verts = tile.poly_verts(poly);
        let verts = verts.as_slice();

        let Some(seg) = intersect_segment_poly_2d(start_pos, end_pos, verts) else {
            // Could not hit the polygon, keep the old t and report hit
            return Ok(hit);
        };
        hit.hit_edge_index = seg.seg_max;
        if seg.tmax > hit.t {
            hit.t = seg.tmax;
        }
        hit.path.push(cur_ref);

        // Ray end is completely inside the polygon
        let Some(seg_max) = seg.seg_max else {
            hit.t = f32::MAX;
            if options.contains(RaycastOptions::USE_COSTS) {
                hit.path_cost += filter.get_cost(&cur_pos, end_pos, poly);
            }
            return Ok(hit);
        };

        let mut next_ref = PolyRef::null();
        for link in tile.links_of(poly) {
            if link.edge as usize != seg_max {
                continue;
            }
            let Ok((next_tile, next_poly)) = mesh.get_tile_and_poly_by_ref(link.reference) else {
                continue;
            };
            if next_poly.poly_type() == PolyType::OffMeshConnection {
                continue;
            }
            if !filter.pass_filter(link.reference, next_tile, next_poly) {
                continue;
            }

            // Internal links and links spanning the whole edge are always crossed
            if link.side == 0xff || (link.bmin == 0 && link.bmax == 255) {
                next_ref = link.reference;
                break;
            }

            // Partial portal: the crossing must lie inside the shared part
            let left = &verts[seg_max];
            let right = &verts[(seg_max + 1) % verts.len()];
            let axis = match link.side {
                0 | 4 => 2,
                2 | 6 => 0,
                _ => continue,
            };
            let s = 1.0 / 255.0;
            let mut lmin = left[axis] + (right[axis] - left[axis]) * (link.bmin as f32 * s);
            let mut lmax = left[axis] + (right[axis] - left[axis]) * (link.bmax as f32 * s);
            if lmin > lmax {
                std::mem::swap(&mut lmin, &mut lmax);
            }
            let p = start_pos[axis] + (end_pos[axis] - start_pos[axis]) * seg.tmax;
            if p >= lmin && p <= lmax {
                next_ref = link.reference;
                break;
            }
        }

        if options.contains(RaycastOptions::USE_COSTS) {
            // Intersection at the far side of the polygon, with the height
            // corrected on the crossed edge since the ray moves in 2D
            let last_pos = cur_pos;
            cur_pos = vmad(start_pos, &dir, hit.t);
            let e1 = &verts[seg_max];
            let e2 = &verts[(seg_max + 1) % verts.len()];
            let e_dir = vsub(e2, e1);
            let diff = vsub(&cur_pos, e1);
            let s = if sqr(e_dir[0]) > sqr(e_dir[2]) {
                diff[0] / e_dir[0]
            } else {
                diff[2] / e_dir[2]
            };
            cur_pos[1] = e1[1] + e_dir[1] * s;
            hit.path_cost += filter.get_cost(&last_pos, &cur_pos, poly);
        }

        if next_ref.is_null() {
            // Hit a wall
            let va = &verts[seg_max];
            let vb = &verts[(seg_max + 1) % verts.len()];
            let dx = vb[0] - va[0];
            let dz = vb[2] - va[2];
            hit.hit_normal = vnormalize(&[dz, 0.0, -dx]);
            return Ok(hit);
        }

        cur_ref = next_ref;
    }
}
