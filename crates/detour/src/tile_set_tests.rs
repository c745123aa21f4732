//! Tests for loading and saving static tile-set files
//!
//! Every failure maps to a fixed numeric code, and a record with a null
//! reference or zero length ends the tile list successfully.

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use crate::test_mesh_helpers::{empty_tile_bytes, grid_params, tile_set_bytes, GridTileBuilder};
    use crate::{
        load_tile_set, read_tile_set, save_tile_set, write_tile_set, NavMesh, NavMeshParams,
        NavMeshQuery, PolyRef, QueryFilter, TileFlags, TileRef, TileSetError, TileSetHeader,
        TILE_SET_HEADER_SIZE,
    };

    fn params() -> NavMeshParams {
        grid_params(8.0, 16, 64)
    }

    fn tile_ref(index: u32) -> TileRef {
        NavMesh::new(params()).unwrap().encode_poly_id(1, index, 0)
    }

    /// A set with one empty 128 byte tile
    fn single_tile_set() -> Vec<u8> {
        let tile = empty_tile_bytes(0, 0, 128);
        tile_set_bytes(&params(), &[(tile_ref(0), &tile)])
    }

    fn load_code(bytes: &[u8]) -> i32 {
        match read_tile_set(bytes) {
            Ok(_) => 0,
            Err(e) => e.code(),
        }
    }

    #[test]
    fn test_load_single_tile_file() {
        let bytes = single_tile_set();
        assert_eq!(bytes.len(), TILE_SET_HEADER_SIZE + 8 + 128);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let mesh = load_tile_set(file.path()).unwrap();
        assert_eq!(mesh.tile_count(), 1);
        assert_eq!(mesh.get_tile_ref_at(0, 0, 0), tile_ref(0));
    }

    #[test]
    fn test_magic_is_tesm_on_disk() {
        let bytes = single_tile_set();
        assert_eq!(&bytes[..4], b"TESM");
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = single_tile_set();
        bytes[4..8].copy_from_slice(&2i32.to_le_bytes());
        let err = read_tile_set(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, TileSetError::Version(2)));
        assert_eq!(err.code(), 104);
    }

    #[test]
    fn test_any_magic_mutation_is_rejected() {
        for i in 0..4 {
            for flip in [0x01u8, 0x80, 0xff] {
                let mut bytes = single_tile_set();
                bytes[i] ^= flip;
                assert_eq!(load_code(&bytes), 103, "byte {} flipped with {:#x}", i, flip);
            }
        }
    }

    #[test]
    fn test_open_and_header_failures() {
        let err = load_tile_set("/nonexistent/dir/world.bin").unwrap_err();
        assert_eq!(err.code(), 101);

        let bytes = single_tile_set();
        assert_eq!(load_code(&bytes[..TILE_SET_HEADER_SIZE - 1]), 102);
        assert_eq!(load_code(&[]), 102);
    }

    #[test]
    fn test_mesh_parameters_rejected() {
        let mut bad = params();
        bad.max_tiles = 0;
        let tile = empty_tile_bytes(0, 0, 128);
        let bytes = tile_set_bytes(&bad, &[(tile_ref(0), &tile)]);
        assert_eq!(load_code(&bytes), 106);
    }

    #[test]
    fn test_truncated_records() {
        let bytes = single_tile_set();
        // Record cut in half
        assert_eq!(load_code(&bytes[..TILE_SET_HEADER_SIZE + 4]), 107);
        // Data cut short
        assert_eq!(load_code(&bytes[..bytes.len() - 1]), 108);

        // Fewer records than declared
        let tile = empty_tile_bytes(0, 0, 128);
        let mut bytes = tile_set_bytes(&params(), &[(tile_ref(0), &tile)]);
        bytes[8..12].copy_from_slice(&2i32.to_le_bytes());
        assert_eq!(load_code(&bytes), 107);
    }

    #[test]
    fn test_negative_tile_size() {
        let mut bytes = single_tile_set();
        let size_at = TILE_SET_HEADER_SIZE + 4;
        bytes[size_at..size_at + 4].copy_from_slice(&(-5i32).to_le_bytes());
        let err = read_tile_set(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, TileSetError::TileAlloc { index: 0, size: -5 }));
        assert_eq!(err.code(), 109);
    }

    #[test]
    fn test_rejected_tile() {
        let mut tile = empty_tile_bytes(0, 0, 128);
        tile[0] ^= 0xff;
        let bytes = tile_set_bytes(&params(), &[(tile_ref(0), &tile)]);
        let err = read_tile_set(bytes.as_slice()).unwrap_err();
        assert_eq!(err.code(), 110);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "detour error: Wrong magic number");

        // Two tiles claiming the same location
        let a = empty_tile_bytes(0, 0, 128);
        let b = empty_tile_bytes(0, 0, 128);
        let bytes = tile_set_bytes(&params(), &[(tile_ref(0), &a), (tile_ref(1), &b)]);
        assert!(matches!(
            read_tile_set(bytes.as_slice()),
            Err(TileSetError::AddTile { index: 1, .. })
        ));
    }

    #[test]
    fn test_sentinel_stops_loading() {
        const DECLARED: usize = 4;
        let tiles: Vec<Vec<u8>> = (0..DECLARED)
            .map(|i| empty_tile_bytes(i as i32, 0, 128))
            .collect();

        for k in 1..=DECLARED {
            // Null reference as the k-th record
            let records: Vec<(PolyRef, &[u8])> = (0..DECLARED)
                .map(|i| {
                    let reference = if i == k - 1 { TileRef::null() } else { tile_ref(i as u32) };
                    (reference, tiles[i].as_slice())
                })
                .collect();
            let mesh = read_tile_set(tile_set_bytes(&params(), &records).as_slice()).unwrap();
            assert_eq!(mesh.tile_count(), k - 1, "null reference at record {}", k);

            // Zero length as the k-th record, nothing after it is read
            let mut records: Vec<(PolyRef, &[u8])> = (0..k - 1)
                .map(|i| (tile_ref(i as u32), tiles[i].as_slice()))
                .collect();
            records.push((tile_ref(k as u32 - 1), &[]));
            let mut bytes = tile_set_bytes(&params(), &records);
            bytes[8..12].copy_from_slice(&(DECLARED as i32).to_le_bytes());
            let mesh = read_tile_set(bytes.as_slice()).unwrap();
            assert_eq!(mesh.tile_count(), k - 1, "zero length at record {}", k);
        }
    }

    fn two_tile_set() -> Vec<u8> {
        let params = params();
        let west = GridTileBuilder::new(&params, 0, 0, 2).build_bytes();
        let east = GridTileBuilder::new(&params, 1, 0, 2).block(0, 1).build_bytes();
        tile_set_bytes(&params, &[(tile_ref(3), &west), (tile_ref(7), &east)])
    }

    fn poly_refs(mesh: &NavMesh) -> Vec<PolyRef> {
        let query = NavMeshQuery::new(mesh, 64).unwrap();
        let mut refs = query
            .query_polygons(&[8.0, 0.0, 4.0], &[8.0, 1.0, 4.0], &QueryFilter::default())
            .unwrap();
        refs.sort();
        refs
    }

    #[test]
    fn test_loading_is_deterministic() {
        let bytes = two_tile_set();
        let a = read_tile_set(bytes.as_slice()).unwrap();
        let b = read_tile_set(bytes.as_slice()).unwrap();

        assert_eq!(a.tile_count(), 2);
        assert_eq!(a.tile_count(), b.tile_count());
        let refs = |m: &NavMesh| m.tiles().map(|t| m.get_tile_ref(t)).collect::<Vec<_>>();
        assert_eq!(refs(&a), vec![tile_ref(3), tile_ref(7)]);
        assert_eq!(refs(&a), refs(&b));
        assert_eq!(poly_refs(&a).len(), 7);
        assert_eq!(poly_refs(&a), poly_refs(&b));
    }

    #[test]
    fn test_save_and_reload() {
        let mesh = read_tile_set(two_tile_set().as_slice()).unwrap();
        let file = NamedTempFile::new().unwrap();
        save_tile_set(file.path(), &mesh).unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        let header = TileSetHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.num_tiles, 2);
        assert_eq!(header.params, mesh.params().clone());
        assert_eq!(header.bounds_min, [0.0, 0.0, 0.0]);
        assert_eq!(header.bounds_max, [16.0, 1.0, 8.0]);

        let reloaded = load_tile_set(file.path()).unwrap();
        assert_eq!(reloaded.tile_count(), 2);
        assert_eq!(reloaded.get_tile_ref_at(1, 0, 0), tile_ref(7));
        assert_eq!(poly_refs(&reloaded), poly_refs(&mesh));
    }

    #[test]
    fn test_write_empty_mesh() {
        let mesh = NavMesh::new(params()).unwrap();
        let mut buf = Vec::new();
        write_tile_set(&mut buf, &mesh).unwrap();
        assert_eq!(buf.len(), TILE_SET_HEADER_SIZE);

        let reloaded = read_tile_set(buf.as_slice()).unwrap();
        assert_eq!(reloaded.tile_count(), 0);
    }

    #[test]
    fn test_tiles_added_directly_round_trip() {
        let params = params();
        let mut mesh = NavMesh::new(params.clone()).unwrap();
        let tile_ref = mesh
            .add_tile(
                GridTileBuilder::new(&params, 2, 2, 1).build_bytes(),
                TileFlags::FREE_DATA,
                TileRef::null(),
            )
            .unwrap();

        let mut buf = Vec::new();
        write_tile_set(&mut buf, &mesh).unwrap();
        let reloaded = read_tile_set(buf.as_slice()).unwrap();
        assert_eq!(reloaded.get_tile_ref_at(2, 2, 0), tile_ref);
    }
}
