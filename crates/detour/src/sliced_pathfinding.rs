//! Sliced pathfinding for budgeted per-frame searches
//!
//! A [`SlicedPathSession`] runs the same A* search as
//! [`NavMeshQuery::find_path`], but lets the caller advance it a fixed number
//! of node expansions at a time. The session is a small state machine:
//!
//! ```text
//! Idle --init--> InProgress --update--> Succeeded --finalize--> Idle
//!                    |
//!                    +--------> Failed
//! ```
//!
//! Splitting the iteration budget over many `update` calls yields the same
//! path as a single call.

use detour_common::{sqr, vdist, vdist_sqr, visfinite, Error, Result, Status};

use super::nav_mesh_query::{edge_mid_point, raycast, NavMeshQuery};
use super::node_pool::{NodeFlags, NodeIndex};
use super::{FindPathOptions, PolyRef, QueryFilter, RaycastOptions, H_SCALE, RAY_CAST_LIMIT_PROPORTIONS};

/// State of a sliced search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlicedPathState {
    /// No search has been started, or the last one was finalized
    #[default]
    Idle,
    /// The search needs more `update` calls
    InProgress,
    /// The search is done; `partial` when the goal could not be reached
    Succeeded { partial: bool },
    /// The search was started with invalid input or the mesh changed under it
    Failed,
}

impl SlicedPathState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Status code equivalent of the state
    pub fn status(&self) -> Status {
        match self {
            Self::Idle => Status::Success,
            Self::InProgress => Status::InProgress,
            Self::Succeeded { partial: false } => Status::Success,
            Self::Succeeded { partial: true } => Status::PartialResult,
            Self::Failed => Status::Failure,
        }
    }
}

/// Outcome of finalizing a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResult {
    /// Number of references written to the output buffer
    pub count: usize,
    /// Length of the full corridor, larger than `count` when truncated
    pub total: usize,
    /// The corridor does not end at the goal polygon
    pub partial: bool,
    /// The node pool ran out during the search
    pub out_of_nodes: bool,
}

impl PathResult {
    pub fn is_truncated(&self) -> bool {
        self.count < self.total
    }
}

/// Search data kept by a query between `update` calls
#[derive(Debug, Clone)]
pub(crate) struct SearchState {
    pub(crate) state: SlicedPathState,
    start_ref: PolyRef,
    end_ref: PolyRef,
    end_pos: [f32; 3],
    filter: QueryFilter,
    options: FindPathOptions,
    raycast_limit_sqr: f32,
    last_best: Option<NodeIndex>,
    last_best_cost: f32,
    out_of_nodes: bool,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            state: SlicedPathState::Idle,
            start_ref: PolyRef::null(),
            end_ref: PolyRef::null(),
            end_pos: [0.0; 3],
            filter: QueryFilter::default(),
            options: FindPathOptions::empty(),
            raycast_limit_sqr: f32::MAX,
            last_best: None,
            last_best_cost: f32::MAX,
            out_of_nodes: false,
        }
    }
}

/// Incremental path search over a [`NavMeshQuery`]
///
/// The session borrows the query exclusively, so one query runs at most one
/// session at a time. Dropping the session clears the node pool and open list.
pub struct SlicedPathSession<'q, 'a> {
    query: &'q mut NavMeshQuery<'a>,
}

impl<'q, 'a> SlicedPathSession<'q, 'a> {
    pub(crate) fn new(query: &'q mut NavMeshQuery<'a>) -> Self {
        query.search = SearchState::default();
        Self { query }
    }

    pub fn state(&self) -> SlicedPathState {
        self.query.search.state
    }

    /// Starts a search, resetting any search in progress
    ///
    /// Invalid references or non-finite positions leave the session `Failed`
    /// and return `InvalidParam`.
    pub fn init(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        options: FindPathOptions,
    ) -> Result<SlicedPathState> {
        let query = &mut *self.query;
        let nav_mesh = query.nav_mesh;
        query.node_pool.clear();
        query.open_list.clear();
        query.search = SearchState {
            state: SlicedPathState::Failed,
            start_ref,
            end_ref,
            end_pos: *end_pos,
            filter: filter.clone(),
            options,
            ..Default::default()
        };

        if !nav_mesh.is_valid_poly_ref(start_ref)
            || !nav_mesh.is_valid_poly_ref(end_ref)
            || !visfinite(start_pos)
            || !visfinite(end_pos)
        {
            log::debug!("Sliced search rejected: {} -> {}", start_ref, end_ref);
            return Err(Error::Detour(Status::InvalidParam));
        }

        if options.contains(FindPathOptions::ANY_ANGLE) {
            // Limit shortcuts to a few agent radii
            let radius = nav_mesh
                .get_tile_by_ref(start_ref)
                .and_then(|t| t.header.as_ref())
                .map_or(0.0, |h| h.walkable_radius);
            query.search.raycast_limit_sqr = sqr(radius * RAY_CAST_LIMIT_PROPORTIONS);
        }

        if start_ref == end_ref {
            query.search.state = SlicedPathState::Succeeded { partial: false };
            return Ok(query.search.state);
        }

        let start_idx = query
            .node_pool
            .get_node(start_ref, 0)
            .ok_or(Error::Detour(Status::OutOfNodes))?;
        let start = query.node_pool.node_mut(start_idx);
        start.pos = *start_pos;
        start.pidx = None;
        start.cost = 0.0;
        start.total = vdist(start_pos, end_pos) * H_SCALE;
        start.flags = NodeFlags::OPEN;
        let total = start.total;
        query.open_list.push(start_idx, &query.node_pool);

        query.search.last_best = Some(start_idx);
        query.search.last_best_cost = total;
        query.search.state = SlicedPathState::InProgress;
        Ok(query.search.state)
    }

    /// Expands up to `max_iter` nodes
    ///
    /// Returns the new state and the number of iterations consumed. Calling
    /// it outside `InProgress` is an error and leaves the state unchanged.
    pub fn update(&mut self, max_iter: usize) -> Result<(SlicedPathState, usize)> {
        let query = &mut *self.query;
        if !query.search.state.is_in_progress() {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let nav_mesh = query.nav_mesh;
        let search = &mut query.search;
        let pool = &mut query.node_pool;
        let open = &mut query.open_list;

        // The mesh may have changed since the last slice
        if !nav_mesh.is_valid_poly_ref(search.start_ref) || !nav_mesh.is_valid_poly_ref(search.end_ref)
        {
            search.state = SlicedPathState::Failed;
            return Ok((search.state, 0));
        }

        let mut iter = 0;
        while iter < max_iter {
            let Some(best_idx) = open.pop(pool) else {
                break;
            };
            iter += 1;

            let best = {
                let node = pool.node_mut(best_idx);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
                node.clone()
            };

            // Reached the goal
            if best.id == search.end_ref {
                search.last_best = Some(best_idx);
                search.state = SlicedPathState::Succeeded { partial: false };
                return Ok((search.state, iter));
            }

            let Ok((best_tile, best_poly)) = nav_mesh.get_tile_and_poly_by_ref(best.id) else {
                search.state = SlicedPathState::Failed;
                return Ok((search.state, iter));
            };

            let parent = best.pidx.map(|p| pool.node(p).clone());
            let parent_ref = parent.as_ref().map_or(PolyRef::null(), |p| p.id);
            let grandpa_ref = parent
                .as_ref()
                .and_then(|p| p.pidx)
                .map_or(PolyRef::null(), |g| pool.node(g).id);
            if !parent_ref.is_null()
                && (!nav_mesh.is_valid_poly_ref(parent_ref)
                    || (!grandpa_ref.is_null() && !nav_mesh.is_valid_poly_ref(grandpa_ref)))
            {
                // A polygon disappeared during the search
                search.state = SlicedPathState::Failed;
                return Ok((search.state, iter));
            }

            let try_los = search.options.contains(FindPathOptions::ANY_ANGLE)
                && parent
                    .as_ref()
                    .is_some_and(|p| vdist_sqr(&p.pos, &best.pos) < search.raycast_limit_sqr);

            for link in best_tile.links_of(best_poly) {
                let neighbour_ref = link.reference;
                // Skip invalid ids and do not expand back to where we came from
                if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                    continue;
                }
                let Ok((neighbour_tile, neighbour_poly)) =
                    nav_mesh.get_tile_and_poly_by_ref(neighbour_ref)
                else {
                    continue;
                };
                if !search.filter.pass_filter(neighbour_ref, neighbour_tile, neighbour_poly) {
                    continue;
                }

                let Some(neighbour_idx) = pool.get_node(neighbour_ref, 0) else {
                    search.out_of_nodes = true;
                    continue;
                };

                let neighbour = pool.node(neighbour_idx);
                // Already visited from the same parent
                if neighbour.pidx.is_some() && neighbour.pidx == best.pidx {
                    continue;
                }
                if neighbour.flags.is_empty() {
                    if let Ok(mid) = edge_mid_point(nav_mesh, best.id, neighbour_ref) {
                        pool.node_mut(neighbour_idx).pos = mid;
                    }
                }
                let neighbour_pos = pool.node(neighbour_idx).pos;

                let mut found_shortcut = false;
                let mut shortcut_cost = 0.0;
                if let (true, Some(parent)) = (try_los, parent.as_ref()) {
                    if let Ok(hit) = raycast(
                        nav_mesh,
                        parent_ref,
                        &parent.pos,
                        &neighbour_pos,
                        &search.filter,
                        RaycastOptions::USE_COSTS,
                    ) {
                        found_shortcut = hit.t >= 1.0;
                        shortcut_cost = hit.path_cost;
                    }
                }

                let mut cost = match (found_shortcut, parent.as_ref()) {
                    (true, Some(parent)) => parent.cost + shortcut_cost,
                    _ => best.cost + search.filter.get_cost(&best.pos, &neighbour_pos, best_poly),
                };

                let heuristic = if neighbour_ref == search.end_ref {
                    cost += search
                        .filter
                        .get_cost(&neighbour_pos, &search.end_pos, neighbour_poly);
                    0.0
                } else {
                    vdist(&neighbour_pos, &search.end_pos) * H_SCALE
                };
                let total = cost + heuristic;

                let neighbour = pool.node_mut(neighbour_idx);
                if neighbour.flags.intersects(NodeFlags::OPEN | NodeFlags::CLOSED)
                    && total >= neighbour.total
                {
                    continue;
                }

                neighbour.pidx = if found_shortcut {
                    best.pidx
                } else {
                    Some(best_idx)
                };
                neighbour.flags.remove(NodeFlags::CLOSED | NodeFlags::PARENT_DETACHED);
                neighbour.cost = cost;
                neighbour.total = total;
                if found_shortcut {
                    neighbour.flags.insert(NodeFlags::PARENT_DETACHED);
                }

                if neighbour.flags.contains(NodeFlags::OPEN) {
                    open.modify(neighbour_idx, pool);
                } else {
                    neighbour.flags.insert(NodeFlags::OPEN);
                    open.push(neighbour_idx, pool);
                }

                // Track the node nearest to the goal for partial results
                if heuristic < search.last_best_cost {
                    search.last_best_cost = heuristic;
                    search.last_best = Some(neighbour_idx);
                }
            }
        }

        // Open list exhausted without reaching the goal
        if open.is_empty() {
            search.state = SlicedPathState::Succeeded { partial: true };
        }

        Ok((search.state, iter))
    }

    /// Writes the found corridor into `path` and returns the session to `Idle`
    ///
    /// Only valid once the search succeeded; otherwise nothing is written and
    /// the state is unchanged.
    pub fn finalize(&mut self, path: &mut [PolyRef]) -> Result<PathResult> {
        if !self.state().is_succeeded() || path.is_empty() {
            return Err(Error::Detour(Status::InvalidParam));
        }
        let end = self.query.search.last_best;
        self.write_path(end, path)
    }

    /// Like [`finalize`](Self::finalize), but when the goal was not reached the
    /// corridor ends at the furthest polygon of `existing` the search visited
    ///
    /// Also valid while the search is still in progress, which lets a caller
    /// cut a long search short and continue along its old corridor.
    pub fn finalize_partial(&mut self, existing: &[PolyRef], path: &mut [PolyRef]) -> Result<PathResult> {
        let state = self.state();
        if !(state.is_succeeded() || state.is_in_progress()) || existing.is_empty() || path.is_empty()
        {
            return Err(Error::Detour(Status::InvalidParam));
        }

        let query = &*self.query;
        let search = &query.search;
        let reached = search
            .last_best
            .is_some_and(|i| query.node_pool.node(i).id == search.end_ref);
        let end = if reached {
            search.last_best
        } else {
            existing
                .iter()
                .rev()
                .find_map(|r| query.node_pool.find_nodes(*r).first().copied())
                .or(search.last_best)
        };
        self.write_path(end, path)
    }

    fn write_path(&mut self, end: Option<NodeIndex>, path: &mut [PolyRef]) -> Result<PathResult> {
        let search = &self.query.search;
        let corridor = if search.start_ref == search.end_ref {
            vec![search.start_ref]
        } else {
            let end = end.ok_or(Error::Detour(Status::InvalidParam))?;
            self.collect_corridor(end)
        };

        let count = corridor.len().min(path.len());
        path[..count].copy_from_slice(&corridor[..count]);
        let result = PathResult {
            count,
            total: corridor.len(),
            partial: corridor.last() != Some(&search.end_ref),
            out_of_nodes: search.out_of_nodes,
        };

        log::debug!(
            "Sliced search finalized: {} polygons, partial {}",
            result.total,
            result.partial
        );
        self.query.search = SearchState::default();
        Ok(result)
    }

    /// Walks the parent chain from `end` back to the start and fills the gaps
    /// left by shortcuts with the polygons a raycast crosses
    fn collect_corridor(&self, end: NodeIndex) -> Vec<PolyRef> {
        let pool = &self.query.node_pool;
        let nav_mesh = self.query.nav_mesh;
        let filter = &self.query.search.filter;

        let mut chain = Vec::new();
        let mut cur = Some(end);
        while let Some(idx) = cur {
            if chain.len() > pool.node_count() {
                break;
            }
            chain.push(idx);
            cur = pool.node(idx).pidx;
        }
        chain.reverse();

        let mut corridor = Vec::with_capacity(chain.len());
        for (k, &idx) in chain.iter().enumerate() {
            let node = pool.node(idx);
            let next = chain.get(k + 1).map(|&n| pool.node(n));
            match next {
                Some(next) if next.flags.contains(NodeFlags::PARENT_DETACHED) => {
                    match raycast(nav_mesh, node.id, &node.pos, &next.pos, filter, RaycastOptions::empty()) {
                        Ok(hit) => {
                            corridor.extend(hit.path);
                            // The ray may end on the next polygon
                            if corridor.last() == Some(&next.id) {
                                corridor.pop();
                            }
                        }
                        Err(_) => corridor.push(node.id),
                    }
                }
                _ => corridor.push(node.id),
            }
        }
        corridor
    }
}

impl Drop for SlicedPathSession<'_, '_> {
    fn drop(&mut self) {
        self.query.node_pool.clear();
        self.query.open_list.clear();
        self.query.search = SearchState::default();
    }
}
