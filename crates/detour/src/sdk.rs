//! Minimal handle for embedding: load a tile set and ask for paths
//!
//! ```rust,ignore
//! let mut sdk = NavMeshSdk::new();
//! assert_eq!(sdk.load("world.bin"), 0);
//! let mut points = [0.0f32; 3 * 64];
//! let count = sdk.find_path(&[1.0, 0.0, 1.0], &[9.0, 0.0, 9.0], &mut points, 64)?;
//! ```

use std::path::Path;

use detour_common::{Error, Result, Status};

use super::nav_mesh::NavMesh;
use super::nav_mesh_query::{NavMeshQuery, DEFAULT_MAX_NODES};
use super::query_filter::QueryFilter;
use super::tile_set::load_tile_set;
use super::{PolyFlags, PolyRef};

/// Search box used to place the path end points on the mesh
pub const SDK_SEARCH_EXTENTS: [f32; 3] = [2.0, 4.0, 2.0];

/// Navigation handle holding at most one loaded mesh
#[derive(Debug, Default)]
pub struct NavMeshSdk {
    nav_mesh: Option<NavMesh>,
}

impl NavMeshSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a static tile set, replacing the current mesh on success
    ///
    /// Returns 0 on success or the tile-set error code. A failed load keeps
    /// the previously loaded mesh.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> i32 {
        match load_tile_set(path) {
            Ok(mesh) => {
                self.nav_mesh = Some(mesh);
                0
            }
            Err(e) => {
                log::warn!("Tile set load failed: {}", e);
                e.code()
            }
        }
    }

    pub fn nav_mesh(&self) -> Option<&NavMesh> {
        self.nav_mesh.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.nav_mesh.is_some()
    }

    /// Finds a straight path between two world positions
    ///
    /// `out_points` receives xyz triples and must hold at least
    /// `3 * max_polys` floats. Returns the number of points written, 0 when
    /// no corridor connects the end points.
    pub fn find_path(
        &self,
        start: &[f32; 3],
        end: &[f32; 3],
        out_points: &mut [f32],
        max_polys: usize,
    ) -> Result<usize> {
        let needed = max_polys
            .checked_mul(3)
            .ok_or(Error::Detour(Status::InvalidParam))?;
        if max_polys == 0 || out_points.len() < needed {
            return Err(Error::Detour(Status::InvalidParam));
        }
        let nav_mesh = self
            .nav_mesh
            .as_ref()
            .ok_or(Error::Detour(Status::NotFound))?;

        let mut query = NavMeshQuery::new(nav_mesh, DEFAULT_MAX_NODES)?;
        let filter = QueryFilter::new(PolyFlags::ALL ^ PolyFlags::DISABLED, PolyFlags::empty());

        let (start_ref, start_pos) = query.find_nearest_poly(start, &SDK_SEARCH_EXTENTS, &filter)?;
        let (end_ref, mut end_pos) = query.find_nearest_poly(end, &SDK_SEARCH_EXTENTS, &filter)?;

        let mut polys = vec![PolyRef::null(); max_polys];
        let result = query.find_path(start_ref, end_ref, &start_pos, &end_pos, &filter, &mut polys)?;
        if result.count == 0 {
            return Ok(0);
        }
        let corridor = &polys[..result.count];

        // A partial corridor ends short of the goal; aim for the closest reachable point
        if let Some(&last) = corridor.last() {
            if last != end_ref {
                end_pos = query.closest_point_on_poly(last, &end_pos)?.0;
            }
        }

        let straight = query.find_straight_path(&start_pos, &end_pos, corridor, max_polys)?;
        for (dst, point) in out_points.chunks_exact_mut(3).zip(&straight.points) {
            dst.copy_from_slice(point);
        }
        Ok(straight.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::{grid_params, tile_set_bytes, GridTileBuilder};
    use tempfile::NamedTempFile;

    fn write_grid_set(file: &NamedTempFile) {
        let params = grid_params(8.0, 16, 64);
        let tile = GridTileBuilder::new(&params, 0, 0, 4)
            .block(1, 0)
            .block(1, 1)
            .block(1, 2)
            .build_bytes();
        let mesh = NavMesh::new(params.clone()).unwrap();
        let tile_ref = mesh.encode_poly_id(1, 0, 0);
        std::fs::write(file.path(), tile_set_bytes(&params, &[(tile_ref, &tile)])).unwrap();
    }

    #[test]
    fn test_load_reports_codes() {
        let mut sdk = NavMeshSdk::new();
        assert_eq!(sdk.load("/nonexistent/world.bin"), 101);
        assert!(!sdk.is_loaded());

        let file = NamedTempFile::new().unwrap();
        write_grid_set(&file);
        assert_eq!(sdk.load(file.path()), 0);
        assert_eq!(sdk.nav_mesh().unwrap().tile_count(), 1);
    }

    #[test]
    fn test_find_path_writes_triples() {
        let file = NamedTempFile::new().unwrap();
        write_grid_set(&file);
        let mut sdk = NavMeshSdk::new();
        assert_eq!(sdk.load(file.path()), 0);

        let mut points = [0.0f32; 3 * 16];
        let count = sdk
            .find_path(&[1.0, 0.0, 1.0], &[5.0, 0.0, 1.0], &mut points, 16)
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(&points[..3], &[1.0, 0.0, 1.0]);
        assert_eq!(&points[3..6], &[2.0, 0.0, 6.0]);
        assert_eq!(&points[6..9], &[4.0, 0.0, 6.0]);
        assert_eq!(&points[9..12], &[5.0, 0.0, 1.0]);
    }

    #[test]
    fn test_find_path_preconditions() {
        let sdk = NavMeshSdk::new();
        let mut points = [0.0f32; 8];
        assert!(matches!(
            sdk.find_path(&[0.0; 3], &[1.0; 3], &mut points, 3),
            Err(Error::Detour(Status::InvalidParam))
        ));
        assert!(matches!(
            sdk.find_path(&[0.0; 3], &[1.0; 3], &mut points, usize::MAX),
            Err(Error::Detour(Status::InvalidParam))
        ));
        assert!(matches!(
            sdk.find_path(&[0.0; 3], &[1.0; 3], &mut points, 2),
            Err(Error::Detour(Status::NotFound))
        ));
    }
}
