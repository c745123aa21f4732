//! Tests for linking tiles together and off-mesh connections
//!
//! Tiles sharing a border are connected through portal edges when either one
//! is added, and disconnected again when one is removed.

#[cfg(test)]
mod tests {
    use crate::test_mesh_helpers::{grid_params, GridTileBuilder};
    use crate::{
        NavMesh, NavMeshParams, NavMeshQuery, PolyRef, PolyType, QueryFilter, TileFlags, TileRef,
    };

    fn add_grid(mesh: &mut NavMesh, params: &NavMeshParams, tx: i32, ty: i32) -> TileRef {
        mesh.add_tile(
            GridTileBuilder::new(params, tx, ty, 2).build_bytes(),
            TileFlags::FREE_DATA,
            TileRef::null(),
        )
        .unwrap()
    }

    /// Links of a polygon that cross into the neighbour tile on `side`
    fn side_links(mesh: &NavMesh, poly_ref: PolyRef, side: u8) -> Vec<PolyRef> {
        let (tile, poly) = mesh.get_tile_and_poly_by_ref(poly_ref).unwrap();
        tile.links_of(poly)
            .filter(|l| l.side == side)
            .map(|l| l.reference)
            .collect()
    }

    #[test]
    fn test_neighbour_tiles_are_linked() {
        let params = grid_params(8.0, 16, 64);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        let west = add_grid(&mut mesh, &params, 0, 0);
        let east = add_grid(&mut mesh, &params, 1, 0);

        // Cell (1, 0) of the west tile touches cell (0, 0) of the east tile
        let west_poly = PolyRef::new(west.id() | 2);
        let east_poly = PolyRef::new(east.id());
        assert_eq!(side_links(&mesh, west_poly, 0), vec![east_poly]);
        assert_eq!(side_links(&mesh, east_poly, 4), vec![west_poly]);

        // The whole edge is shared
        let (tile, poly) = mesh.get_tile_and_poly_by_ref(west_poly).unwrap();
        let link = tile.links_of(poly).find(|l| l.side == 0).unwrap();
        assert_eq!((link.bmin, link.bmax), (0, 255));
    }

    #[test]
    fn test_link_order_does_not_matter() {
        let params = grid_params(8.0, 16, 64);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        // Add the east tile first; the west tile links both ways on arrival
        let east = add_grid(&mut mesh, &params, 1, 0);
        let west = add_grid(&mut mesh, &params, 0, 0);
        assert_eq!(
            side_links(&mesh, PolyRef::new(east.id() | 1), 4),
            vec![PolyRef::new(west.id() | 3)]
        );
    }

    #[test]
    fn test_remove_tile_unlinks_neighbours() {
        let params = grid_params(8.0, 16, 64);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        let west = add_grid(&mut mesh, &params, 0, 0);
        let east = add_grid(&mut mesh, &params, 1, 0);
        let west_poly = PolyRef::new(west.id() | 2);

        mesh.remove_tile(east).unwrap();
        assert!(side_links(&mesh, west_poly, 0).is_empty());
        // Internal links survive
        let (tile, poly) = mesh.get_tile_and_poly_by_ref(west_poly).unwrap();
        assert_eq!(tile.links_of(poly).count(), 2);

        let east = add_grid(&mut mesh, &params, 1, 0);
        assert_eq!(side_links(&mesh, west_poly, 0), vec![PolyRef::new(east.id())]);
    }

    #[test]
    fn test_path_across_tiles() {
        let params = grid_params(8.0, 16, 64);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        for tx in 0..3 {
            add_grid(&mut mesh, &params, tx, 0);
        }

        let mut query = NavMeshQuery::new(&mesh, 256).unwrap();
        let filter = QueryFilter::default();
        let start_pos = [1.0, 0.0, 1.0];
        let end_pos = [23.0, 0.0, 1.0];
        let (start, _) = query.find_nearest_poly(&start_pos, &[1.0, 1.0, 1.0], &filter).unwrap();
        let (end, _) = query.find_nearest_poly(&end_pos, &[1.0, 1.0, 1.0], &filter).unwrap();
        assert_eq!(mesh.decode_poly_id_tile(end), mesh.decode_poly_id_tile(mesh.get_tile_ref_at(2, 0, 0)));

        let mut path = [PolyRef::null(); 16];
        let result = query
            .find_path(start, end, &start_pos, &end_pos, &filter, &mut path)
            .unwrap();
        assert!(!result.partial);
        // Two cells per tile along the bottom row
        assert_eq!(result.count, 6);
        assert_eq!(path[result.count - 1], end);

        let straight = query
            .find_straight_path(&start_pos, &end_pos, &path[..result.count], 8)
            .unwrap();
        assert_eq!(straight.points, vec![start_pos, end_pos]);
    }

    #[test]
    fn test_layers_share_a_location() {
        let params = grid_params(8.0, 16, 64);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        let upper = mesh
            .add_tile(
                GridTileBuilder::new(&params, 0, 0, 1).layer(1).build_bytes(),
                TileFlags::FREE_DATA,
                TileRef::null(),
            )
            .unwrap();
        let lower = add_grid(&mut mesh, &params, 0, 0);

        let layers: Vec<_> = mesh
            .get_tiles_at(0, 0)
            .into_iter()
            .map(|t| mesh.get_tile_ref(t))
            .collect();
        assert_eq!(layers, vec![lower, upper]);
        assert_eq!(mesh.get_tile_ref_at(0, 0, 1), upper);
        assert!(mesh.get_tile_at(0, 0, 2).is_none());
    }

    /// A 4x4 tile whose middle row is blocked, bridged by a jump link
    fn bridged_mesh(bidirectional: bool) -> (NavMesh, TileRef) {
        let params = grid_params(8.0, 16, 64);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        let tile_ref = mesh
            .add_tile(
                GridTileBuilder::new(&params, 0, 0, 4)
                    .block(0, 2)
                    .block(1, 2)
                    .block(2, 2)
                    .block(3, 2)
                    .off_mesh_connection([1.0, 0.0, 3.0], [1.0, 0.0, 7.0], 0.5, bidirectional)
                    .build_bytes(),
                TileFlags::FREE_DATA,
                TileRef::null(),
            )
            .unwrap();
        (mesh, tile_ref)
    }

    #[test]
    fn test_off_mesh_connection_links() {
        let (mesh, base) = bridged_mesh(true);
        let off_mesh = PolyRef::new(base.id() | 12);
        let (tile, poly) = mesh.get_tile_and_poly_by_ref(off_mesh).unwrap();
        assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);

        // Cell (0, 1) holds the start, cell (0, 3) the end
        let landings: Vec<_> = tile.links_of(poly).map(|l| (l.edge, l.reference)).collect();
        assert!(landings.contains(&(0, PolyRef::new(base.id() | 1))));
        assert!(landings.contains(&(1, PolyRef::new(base.id() | 2))));

        let (start, end) = mesh
            .get_off_mesh_connection_poly_end_points(PolyRef::new(base.id() | 1), off_mesh)
            .unwrap();
        assert_eq!(start, [1.0, 0.0, 3.0]);
        assert_eq!(end, [1.0, 0.0, 7.0]);

        // Entering from the far side swaps the end points
        let (start, end) = mesh
            .get_off_mesh_connection_poly_end_points(PolyRef::new(base.id() | 2), off_mesh)
            .unwrap();
        assert_eq!(start, [1.0, 0.0, 7.0]);
        assert_eq!(end, [1.0, 0.0, 3.0]);

        // Ground polygons are not off-mesh connections
        assert!(mesh
            .get_off_mesh_connection_poly_end_points(PolyRef::new(base.id() | 1), base)
            .is_err());
    }

    #[test]
    fn test_path_uses_off_mesh_connection() {
        let (mesh, base) = bridged_mesh(true);
        let mut query = NavMeshQuery::new(&mesh, 256).unwrap();
        let filter = QueryFilter::default();
        let poly = |i: u32| PolyRef::new(base.id() | i);

        let mut path = [PolyRef::null(); 16];
        let result = query
            .find_path(poly(0), poly(2), &[1.0, 0.0, 1.0], &[1.0, 0.0, 7.0], &filter, &mut path)
            .unwrap();
        assert!(!result.partial);
        assert_eq!(&path[..result.count], &[poly(0), poly(1), poly(12), poly(2)]);

        // Bidirectional connections work backwards too
        let result = query
            .find_path(poly(2), poly(0), &[1.0, 0.0, 7.0], &[1.0, 0.0, 1.0], &filter, &mut path)
            .unwrap();
        assert!(!result.partial);
        assert_eq!(&path[..result.count], &[poly(2), poly(12), poly(1), poly(0)]);
    }

    #[test]
    fn test_one_way_off_mesh_connection() {
        let (mesh, base) = bridged_mesh(false);
        let mut query = NavMeshQuery::new(&mesh, 256).unwrap();
        let filter = QueryFilter::default();
        let poly = |i: u32| PolyRef::new(base.id() | i);

        let mut path = [PolyRef::null(); 16];
        let result = query
            .find_path(poly(2), poly(0), &[1.0, 0.0, 7.0], &[1.0, 0.0, 1.0], &filter, &mut path)
            .unwrap();
        assert!(result.partial);
        assert_ne!(path[result.count - 1], poly(0));
    }

    #[test]
    fn test_jump_filter_blocks_off_mesh_connection() {
        let (mesh, base) = bridged_mesh(true);
        let mut query = NavMeshQuery::new(&mesh, 256).unwrap();
        let filter = QueryFilter::new(crate::PolyFlags::WALK, crate::PolyFlags::JUMP);
        let poly = |i: u32| PolyRef::new(base.id() | i);

        let mut path = [PolyRef::null(); 16];
        let result = query
            .find_path(poly(0), poly(2), &[1.0, 0.0, 1.0], &[1.0, 0.0, 7.0], &filter, &mut path)
            .unwrap();
        assert!(result.partial);
        assert!(!path[..result.count].contains(&poly(12)));
    }
}
