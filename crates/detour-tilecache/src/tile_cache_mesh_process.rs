//! Post-processing of rebuilt tiles before they enter the navigation mesh

use detour::{MeshTileData, PolyFlags, PolyType};

/// Adjusts a decompressed tile before it is added to the navigation mesh
pub trait TileCacheMeshProcess: std::fmt::Debug {
    fn process(&mut self, tile: &mut MeshTileData);
}

/// Leaves tiles untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMeshProcess;

impl TileCacheMeshProcess for NoopMeshProcess {
    fn process(&mut self, _tile: &mut MeshTileData) {}
}

/// Polygon areas used by baked tiles
pub mod area {
    pub const GROUND: u8 = 0;
    pub const WATER: u8 = 1;
    pub const ROAD: u8 = 2;
    pub const DOOR: u8 = 3;
    pub const GRASS: u8 = 4;
    pub const JUMP: u8 = 5;
    /// Area the layer builder marks walkable cells with
    pub const WALKABLE: u8 = 63;
}

/// Derives polygon flags from polygon areas
///
/// Ground, road and grass polygons are walkable, water is swimmable, doors
/// are walkable doors and jump areas need the jump ability. Polygons still
/// carrying the generic walkable area become ground first. Polygons with any
/// other area keep their flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaFlagsMeshProcess;

impl AreaFlagsMeshProcess {
    pub fn flags_for_area(area: u8) -> Option<PolyFlags> {
        match area {
            area::GROUND | area::ROAD | area::GRASS => Some(PolyFlags::WALK),
            area::WATER => Some(PolyFlags::SWIM),
            area::DOOR => Some(PolyFlags::WALK | PolyFlags::DOOR),
            area::JUMP => Some(PolyFlags::JUMP),
            _ => None,
        }
    }
}

impl TileCacheMeshProcess for AreaFlagsMeshProcess {
    fn process(&mut self, tile: &mut MeshTileData) {
        for poly in tile
            .polys
            .iter_mut()
            .filter(|p| p.poly_type() == PolyType::Ground)
        {
            if poly.area() == area::WALKABLE {
                poly.set_area(area::GROUND);
            }
            if let Some(flags) = Self::flags_for_area(poly.area()) {
                poly.flags = flags;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour::test_mesh_helpers::{grid_params, GridTileBuilder};

    fn tile_with_area(a: u8) -> MeshTileData {
        GridTileBuilder::new(&grid_params(8.0, 4, 16), 0, 0, 1)
            .area(a)
            .flags(PolyFlags::empty())
            .build()
    }

    #[test]
    fn test_area_table() {
        for (a, expected) in [
            (area::GROUND, PolyFlags::WALK),
            (area::ROAD, PolyFlags::WALK),
            (area::GRASS, PolyFlags::WALK),
            (area::WATER, PolyFlags::SWIM),
            (area::DOOR, PolyFlags::WALK | PolyFlags::DOOR),
            (area::JUMP, PolyFlags::JUMP),
        ] {
            let mut tile = tile_with_area(a);
            AreaFlagsMeshProcess.process(&mut tile);
            assert_eq!(tile.polys[0].flags, expected, "area {}", a);
        }
    }

    #[test]
    fn test_walkable_area_becomes_ground() {
        let mut tile = tile_with_area(area::WALKABLE);
        AreaFlagsMeshProcess.process(&mut tile);
        assert_eq!(tile.polys[0].area(), area::GROUND);
        assert_eq!(tile.polys[0].flags, PolyFlags::WALK);
    }

    #[test]
    fn test_unknown_area_keeps_flags() {
        let mut tile = tile_with_area(20);
        AreaFlagsMeshProcess.process(&mut tile);
        assert_eq!(tile.polys[0].flags, PolyFlags::empty());

        let mut tile = tile_with_area(area::WATER);
        NoopMeshProcess.process(&mut tile);
        assert_eq!(tile.polys[0].flags, PolyFlags::empty());
    }
}
