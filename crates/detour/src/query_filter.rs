//! Polygon filter and traversal costs for navigation queries

use super::nav_mesh::MeshTile;
use super::tile_data::Poly;
use super::{PolyFlags, PolyRef, MAX_AREAS};

/// Filter deciding which polygons a query may visit and what crossing them costs
///
/// A polygon passes when it has at least one flag of `include_flags` and none
/// of `exclude_flags`. The cost of moving inside a polygon is the travelled
/// distance scaled by the area cost of the polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    /// Cost multiplier per area id
    pub area_cost: [f32; MAX_AREAS],
    pub include_flags: PolyFlags,
    pub exclude_flags: PolyFlags,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            area_cost: [1.0; MAX_AREAS],
            include_flags: PolyFlags::ALL,
            exclude_flags: PolyFlags::empty(),
        }
    }
}

impl QueryFilter {
    /// Creates a filter with unit area costs
    pub fn new(include_flags: PolyFlags, exclude_flags: PolyFlags) -> Self {
        Self {
            include_flags,
            exclude_flags,
            ..Default::default()
        }
    }

    pub fn area_cost(&self, area: u8) -> f32 {
        self.area_cost[area as usize % MAX_AREAS]
    }

    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        if let Some(slot) = self.area_cost.get_mut(area as usize) {
            *slot = cost;
        }
    }

    /// Checks whether a polygon may be visited
    pub fn pass_filter(&self, _poly_ref: PolyRef, _tile: &MeshTile, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    /// Cost of moving from `pa` to `pb` inside `poly`
    pub fn get_cost(&self, pa: &[f32; 3], pb: &[f32; 3], poly: &Poly) -> f32 {
        detour_common::vdist(pa, pb) * self.area_cost(poly.area())
    }
}
