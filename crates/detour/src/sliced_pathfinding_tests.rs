//! Tests for sliced path searches
//!
//! Covers the session state machine, misuse handling, budget splitting and the
//! any-angle variant.

#[cfg(test)]
mod tests {
    use crate::test_mesh_helpers::{grid_params, GridTileBuilder};
    use crate::{
        Error, FindPathOptions, NavMesh, NavMeshQuery, PolyRef, QueryFilter, SlicedPathState,
        Status, TileFlags, TileRef,
    };

    fn grid_mesh(cells: usize, blocked: &[(usize, usize)]) -> (NavMesh, TileRef) {
        let params = grid_params(8.0, 16, 256);
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        let mut builder = GridTileBuilder::new(&params, 0, 0, cells);
        for &(i, j) in blocked {
            builder = builder.block(i, j);
        }
        let base = mesh
            .add_tile(builder.build_bytes(), TileFlags::FREE_DATA, TileRef::null())
            .unwrap();
        (mesh, base)
    }

    fn nearest(query: &NavMeshQuery<'_>, pos: &[f32; 3]) -> PolyRef {
        query
            .find_nearest_poly(pos, &[0.5, 1.0, 0.5], &QueryFilter::default())
            .unwrap()
            .0
    }

    /// Runs a search with the given budget per update and returns the corridor
    fn run_sliced(
        mesh: &NavMesh,
        start_pos: [f32; 3],
        end_pos: [f32; 3],
        options: FindPathOptions,
        budget: usize,
    ) -> (Vec<PolyRef>, usize) {
        let mut query = NavMeshQuery::new(mesh, 512).unwrap();
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);
        let filter = QueryFilter::default();

        let mut session = query.sliced_session();
        let mut state = session
            .init(start, end, &start_pos, &end_pos, &filter, options)
            .unwrap();
        let mut updates = 0;
        while state.is_in_progress() {
            let (next, iters) = session.update(budget).unwrap();
            assert!(iters <= budget);
            state = next;
            updates += 1;
        }
        assert_eq!(state, SlicedPathState::Succeeded { partial: false });

        let mut path = [PolyRef::null(); 64];
        let result = session.finalize(&mut path).unwrap();
        assert_eq!(session.state(), SlicedPathState::Idle);
        (path[..result.count].to_vec(), updates)
    }

    /// Cells (2, 0) to (2, 4) and (5, 3) to (5, 7) block an 8x8 tile
    fn maze() -> (NavMesh, TileRef) {
        let mut blocked = Vec::new();
        for j in 0..5 {
            blocked.push((2, j));
        }
        for j in 3..8 {
            blocked.push((5, j));
        }
        grid_mesh(8, &blocked)
    }

    #[test]
    fn test_budget_split_gives_same_path() {
        let (mesh, _) = maze();
        let start = [0.5, 0.0, 0.5];
        let end = [7.5, 0.0, 7.5];

        let (whole, whole_updates) = run_sliced(&mesh, start, end, FindPathOptions::empty(), usize::MAX);
        let (sliced, sliced_updates) = run_sliced(&mesh, start, end, FindPathOptions::empty(), 1);
        assert_eq!(whole_updates, 1);
        assert!(sliced_updates > 1);
        assert_eq!(whole, sliced);

        let (sliced, _) = run_sliced(&mesh, start, end, FindPathOptions::empty(), 3);
        assert_eq!(whole, sliced);
    }

    #[test]
    fn test_sliced_matches_find_path() {
        let (mesh, _) = maze();
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [7.5, 0.0, 7.5];
        let (sliced, _) = run_sliced(&mesh, start_pos, end_pos, FindPathOptions::empty(), 2);

        let mut query = NavMeshQuery::new(&mesh, 512).unwrap();
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);
        let mut path = [PolyRef::null(); 64];
        let result = query
            .find_path(start, end, &start_pos, &end_pos, &QueryFilter::default(), &mut path)
            .unwrap();
        assert_eq!(&path[..result.count], sliced.as_slice());
    }

    #[test]
    fn test_finalize_before_success_writes_nothing() {
        let (mesh, _) = maze();
        let mut query = NavMeshQuery::new(&mesh, 512).unwrap();
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [7.5, 0.0, 7.5];
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);

        let mut session = query.sliced_session();
        let sentinel = PolyRef::new(0xdead);
        let mut path = [sentinel; 8];

        // Idle
        assert!(session.finalize(&mut path).is_err());
        assert!(session.update(4).is_err());
        assert_eq!(session.state(), SlicedPathState::Idle);

        // In progress
        session
            .init(start, end, &start_pos, &end_pos, &QueryFilter::default(), FindPathOptions::empty())
            .unwrap();
        let (state, iters) = session.update(1).unwrap();
        assert_eq!(iters, 1);
        assert!(state.is_in_progress());
        assert!(matches!(
            session.finalize(&mut path),
            Err(Error::Detour(Status::InvalidParam))
        ));
        assert!(path.iter().all(|&r| r == sentinel));
        assert!(session.state().is_in_progress());

        // The session still completes normally
        while session.state().is_in_progress() {
            session.update(8).unwrap();
        }
        let mut full = [PolyRef::null(); 64];
        let result = session.finalize(&mut full).unwrap();
        assert!(!result.partial);
        assert_eq!(result.count, result.total);
        assert_eq!(full[0], start);
        assert_eq!(full[result.count - 1], end);

        // Back to idle
        assert!(session.update(1).is_err());
        assert!(session.finalize(&mut path).is_err());
    }

    #[test]
    fn test_init_rejects_invalid_input() {
        let (mesh, base) = grid_mesh(2, &[]);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();
        let filter = QueryFilter::default();
        let mut session = query.sliced_session();

        let bogus = PolyRef::new(base.id() | 9);
        let err = session
            .init(base, bogus, &[1.0, 0.0, 1.0], &[5.0, 0.0, 5.0], &filter, FindPathOptions::empty())
            .unwrap_err();
        assert!(matches!(err, Error::Detour(Status::InvalidParam)));
        assert!(session.state().is_failed());
        assert!(session.update(1).is_err());
        assert!(session.state().is_failed());

        let err = session
            .init(base, base, &[f32::NAN, 0.0, 1.0], &[1.0, 0.0, 1.0], &filter, FindPathOptions::empty())
            .unwrap_err();
        assert!(matches!(err, Error::Detour(Status::InvalidParam)));
    }

    #[test]
    fn test_same_start_and_end() {
        let (mesh, base) = grid_mesh(2, &[]);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();
        let mut session = query.sliced_session();
        let state = session
            .init(
                base,
                base,
                &[1.0, 0.0, 1.0],
                &[2.0, 0.0, 2.0],
                &QueryFilter::default(),
                FindPathOptions::empty(),
            )
            .unwrap();
        assert_eq!(state, SlicedPathState::Succeeded { partial: false });

        let mut path = [PolyRef::null(); 4];
        let result = session.finalize(&mut path).unwrap();
        assert_eq!(result.count, 1);
        assert!(!result.partial);
        assert_eq!(path[0], base);
    }

    #[test]
    fn test_init_resets_running_search() {
        let (mesh, _) = maze();
        let mut query = NavMeshQuery::new(&mesh, 512).unwrap();
        let a = nearest(&query, &[0.5, 0.0, 0.5]);
        let b = nearest(&query, &[7.5, 0.0, 7.5]);
        let c = nearest(&query, &[1.5, 0.0, 0.5]);
        let filter = QueryFilter::default();

        let mut session = query.sliced_session();
        session
            .init(a, b, &[0.5, 0.0, 0.5], &[7.5, 0.0, 7.5], &filter, FindPathOptions::empty())
            .unwrap();
        session.update(5).unwrap();

        // Restart towards a neighbour cell
        session
            .init(a, c, &[0.5, 0.0, 0.5], &[1.5, 0.0, 0.5], &filter, FindPathOptions::empty())
            .unwrap();
        while session.state().is_in_progress() {
            session.update(1).unwrap();
        }
        let mut path = [PolyRef::null(); 8];
        let result = session.finalize(&mut path).unwrap();
        assert_eq!(&path[..result.count], &[a, c]);
    }

    #[test]
    fn test_unreachable_goal_gives_partial_path() {
        // Column x = 2..4 is fully blocked
        let (mesh, base) = grid_mesh(4, &[(1, 0), (1, 1), (1, 2), (1, 3)]);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();
        let start_pos = [1.0, 0.0, 1.0];
        let end_pos = [7.0, 0.0, 1.0];
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);
        assert_eq!(start, base);

        let mut session = query.sliced_session();
        session
            .init(start, end, &start_pos, &end_pos, &QueryFilter::default(), FindPathOptions::empty())
            .unwrap();
        let (state, _) = session.update(100).unwrap();
        assert_eq!(state, SlicedPathState::Succeeded { partial: true });
        assert_eq!(state.status(), Status::PartialResult);

        let mut path = [PolyRef::null(); 8];
        let result = session.finalize(&mut path).unwrap();
        assert!(result.partial);
        assert_eq!(path[0], start);
        assert!(!path[..result.count].contains(&end));
    }

    #[test]
    fn test_finalize_partial_follows_existing_corridor() {
        let (mesh, base) = grid_mesh(4, &[]);
        let mut query = NavMeshQuery::new(&mesh, 64).unwrap();
        let poly = |i: u32| PolyRef::new(base.id() | i);
        let start_pos = [1.0, 0.0, 1.0];
        let end_pos = [1.0, 0.0, 7.0];

        let mut session = query.sliced_session();
        session
            .init(poly(0), poly(3), &start_pos, &end_pos, &QueryFilter::default(), FindPathOptions::empty())
            .unwrap();
        // One expansion visits the start and its two neighbours
        session.update(1).unwrap();
        assert!(session.state().is_in_progress());

        let existing = [poly(0), poly(1), poly(2), poly(3)];
        let mut path = [PolyRef::null(); 8];
        let result = session.finalize_partial(&existing, &mut path).unwrap();
        assert_eq!(&path[..result.count], &[poly(0), poly(1)]);
        assert!(result.partial);
        assert_eq!(session.state(), SlicedPathState::Idle);

        // Needs a corridor to follow
        assert!(session.finalize_partial(&[], &mut path).is_err());
    }

    #[test]
    fn test_finalize_truncates_to_buffer() {
        let (mesh, _) = maze();
        let mut query = NavMeshQuery::new(&mesh, 512).unwrap();
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [7.5, 0.0, 7.5];
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);

        let mut session = query.sliced_session();
        session
            .init(start, end, &start_pos, &end_pos, &QueryFilter::default(), FindPathOptions::empty())
            .unwrap();
        session.update(usize::MAX).unwrap();
        let mut path = [PolyRef::null(); 3];
        let result = session.finalize(&mut path).unwrap();
        assert_eq!(result.count, 3);
        assert!(result.total > 3);
        assert!(result.is_truncated());
        assert_eq!(path[0], start);
    }

    #[test]
    fn test_out_of_nodes() {
        let (mesh, _) = grid_mesh(8, &[]);
        let mut query = NavMeshQuery::new(&mesh, 4).unwrap();
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [7.5, 0.0, 7.5];
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);

        let mut path = [PolyRef::null(); 16];
        let result = query
            .find_path(start, end, &start_pos, &end_pos, &QueryFilter::default(), &mut path)
            .unwrap();
        assert!(result.out_of_nodes);
        assert!(result.partial);
    }

    #[test]
    fn test_any_angle_corridor_is_connected() {
        let (mesh, _) = maze();
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [7.5, 0.0, 7.5];
        let (corridor, _) = run_sliced(&mesh, start_pos, end_pos, FindPathOptions::ANY_ANGLE, 4);

        let query = NavMeshQuery::new(&mesh, 64).unwrap();
        assert_eq!(corridor.first(), Some(&nearest(&query, &start_pos)));
        assert_eq!(corridor.last(), Some(&nearest(&query, &end_pos)));
        // Gaps left by shortcuts are filled with the crossed polygons
        for pair in corridor.windows(2) {
            assert!(query.get_edge_mid_point(pair[0], pair[1]).is_ok());
        }

        // Budget splitting holds for any-angle searches too
        let (whole, _) = run_sliced(&mesh, start_pos, end_pos, FindPathOptions::ANY_ANGLE, usize::MAX);
        assert_eq!(whole, corridor);
    }

    #[test]
    fn test_session_drop_releases_nodes() {
        let (mesh, _) = maze();
        let mut query = NavMeshQuery::new(&mesh, 512).unwrap();
        let start_pos = [0.5, 0.0, 0.5];
        let end_pos = [7.5, 0.0, 7.5];
        let start = nearest(&query, &start_pos);
        let end = nearest(&query, &end_pos);

        {
            let mut session = query.sliced_session();
            session
                .init(start, end, &start_pos, &end_pos, &QueryFilter::default(), FindPathOptions::empty())
                .unwrap();
            session.update(10).unwrap();
        }
        assert_eq!(query.node_pool.node_count(), 0);
        assert!(query.open_list.is_empty());
        assert_eq!(query.sliced_session().state(), SlicedPathState::Idle);
    }
}
