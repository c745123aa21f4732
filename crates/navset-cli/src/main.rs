//! CLI utility for inspecting tile-set files and running path queries

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use detour::sdk::SDK_SEARCH_EXTENTS;
use detour::{
    load_tile_set, FindPathOptions, NavMesh, NavMeshQuery, PolyFlags, PolyRef, QueryFilter,
    DEFAULT_MAX_NODES,
};
use detour_tilecache::{load_tile_cache_set, TileCacheWorld};

/// Inspect navigation tile sets and find paths on them
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Print debug output
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the parameters and tiles of a file
    Info {
        /// Tile-set file
        #[clap(value_parser)]
        file: PathBuf,

        /// Read a tile-cache-set file instead of a static tile set
        #[clap(long)]
        dynamic: bool,
    },
    /// Find a path with a sliced search
    FindPath {
        /// Tile-set file
        #[clap(value_parser)]
        file: PathBuf,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector, allow_hyphen_values = true)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector, allow_hyphen_values = true)]
        end: Vec3,

        /// Read a tile-cache-set file instead of a static tile set
        #[clap(long)]
        dynamic: bool,

        /// Shortcut over polygon chains with raycasts
        #[clap(long)]
        any_angle: bool,

        /// Node expansions per update
        #[clap(long, default_value = "32")]
        slice: usize,

        /// Maximum number of polygons in the path
        #[clap(long, default_value = "256")]
        max_path: usize,
    },
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();

    if parts.len() != 3 {
        return Err(format!(
            "Vector must have 3 components, got {}",
            parts.len()
        ));
    }

    let x = parts[0].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let z = parts[2].trim().parse::<f32>().map_err(|e| e.to_string())?;

    Ok(Vec3::new(x, y, z))
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

/// A mesh loaded from either kind of file
enum LoadedMesh {
    Static(NavMesh),
    Dynamic(TileCacheWorld),
}

impl LoadedMesh {
    fn nav_mesh(&self) -> &NavMesh {
        match self {
            LoadedMesh::Static(mesh) => mesh,
            LoadedMesh::Dynamic(world) => &world.nav_mesh,
        }
    }
}

fn load_mesh(file: &Path, dynamic: bool) -> Result<LoadedMesh> {
    tracing::info!("Loading {}", file.display());
    if dynamic {
        let world = load_tile_cache_set(file).map_err(|e| {
            anyhow!(e).context(format!("Failed to load tile cache set {}", file.display()))
        })?;
        Ok(LoadedMesh::Dynamic(world))
    } else {
        let mesh = load_tile_set(file).map_err(|e| {
            anyhow!(e).context(format!("Failed to load tile set {}", file.display()))
        })?;
        Ok(LoadedMesh::Static(mesh))
    }
}

/// Human readable summary of a loaded file
fn describe(loaded: &LoadedMesh) -> Vec<String> {
    let mesh = loaded.nav_mesh();
    let params = mesh.params();
    let mut lines = vec![
        format!("origin: {:?}", params.origin),
        format!("tile size: {} x {}", params.tile_width, params.tile_height),
        format!(
            "max tiles: {}, max polygons per tile: {}",
            params.max_tiles, params.max_polys_per_tile
        ),
    ];

    if let LoadedMesh::Dynamic(world) = loaded {
        let cache = &world.tile_cache;
        let cp = cache.params();
        lines.push(format!(
            "cache: cs {} ch {}, {} x {} cells, {} compressed tiles",
            cp.cs,
            cp.ch,
            cp.width,
            cp.height,
            cache.tile_count()
        ));
        for tile in cache.tiles() {
            if let Some(header) = tile.header.as_ref() {
                lines.push(format!(
                    "  compressed ({}, {}, {}) ref {} {} bytes",
                    header.tx,
                    header.ty,
                    header.tlayer,
                    cache.get_tile_ref(tile),
                    tile.data().len()
                ));
            }
        }
    }

    lines.push(format!("mesh tiles: {}", mesh.tile_count()));
    for tile in mesh.tiles() {
        if let Some(header) = tile.header.as_ref() {
            lines.push(format!(
                "  tile ({}, {}, {}) ref {} polygons {}",
                header.x,
                header.y,
                header.layer,
                mesh.get_tile_ref(tile),
                tile.polys.len()
            ));
        }
    }
    lines
}

/// Outcome of a path query
#[derive(Debug)]
struct PathReport {
    polys: Vec<PolyRef>,
    partial: bool,
    updates: usize,
    iterations: usize,
    points: Vec<[f32; 3]>,
}

fn find_path(
    nav_mesh: &NavMesh,
    start: Vec3,
    end: Vec3,
    options: FindPathOptions,
    slice: usize,
    max_path: usize,
) -> Result<PathReport> {
    let mut query = NavMeshQuery::new(nav_mesh, DEFAULT_MAX_NODES)
        .context("Failed to create navigation query")?;
    let filter = QueryFilter::new(PolyFlags::ALL ^ PolyFlags::DISABLED, PolyFlags::empty());

    let (start_ref, start_pos) = query
        .find_nearest_poly(&start.to_array(), &SDK_SEARCH_EXTENTS, &filter)
        .with_context(|| format!("No polygon near start {}", start))?;
    let (end_ref, mut end_pos) = query
        .find_nearest_poly(&end.to_array(), &SDK_SEARCH_EXTENTS, &filter)
        .with_context(|| format!("No polygon near end {}", end))?;
    tracing::debug!("Start polygon {} at {:?}", start_ref, start_pos);
    tracing::debug!("End polygon {} at {:?}", end_ref, end_pos);

    let mut polys = vec![PolyRef::null(); max_path.max(1)];
    let mut updates = 0;
    let mut iterations = 0;
    let result = {
        let mut session = query.sliced_session();
        session
            .init(start_ref, end_ref, &start_pos, &end_pos, &filter, options)
            .context("Failed to start path search")?;
        while session.state().is_in_progress() {
            let (_, done) = session.update(slice.max(1))?;
            updates += 1;
            iterations += done;
        }
        session.finalize(&mut polys).context("Path search failed")?
    };
    polys.truncate(result.count);
    tracing::debug!(
        "Search took {} updates and {} iterations",
        updates,
        iterations
    );

    // Aim for the closest reachable point when the goal was not reached
    if let Some(&last) = polys.last() {
        if last != end_ref {
            end_pos = query.closest_point_on_poly(last, &end_pos)?.0;
        }
    }
    let straight = query
        .find_straight_path(&start_pos, &end_pos, &polys, max_path.max(2))
        .context("Failed to find straight path")?;

    Ok(PathReport {
        polys,
        partial: result.partial,
        updates,
        iterations,
        points: straight.points,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    match args.command {
        Commands::Info { file, dynamic } => {
            let loaded = load_mesh(&file, dynamic)?;
            for line in describe(&loaded) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::FindPath {
            file,
            start,
            end,
            dynamic,
            any_angle,
            slice,
            max_path,
        } => {
            let loaded = load_mesh(&file, dynamic)?;
            let options = if any_angle {
                FindPathOptions::ANY_ANGLE
            } else {
                FindPathOptions::empty()
            };
            let report = find_path(loaded.nav_mesh(), start, end, options, slice, max_path)?;

            println!(
                "Found {}path with {} polygons in {} updates ({} iterations)",
                if report.partial { "partial " } else { "" },
                report.polys.len(),
                report.updates,
                report.iterations
            );
            for poly in &report.polys {
                println!("  {}", poly);
            }
            println!("Straight path:");
            for (i, p) in report.points.iter().enumerate() {
                println!("{}: {},{},{}", i, p[0], p[1], p[2]);
            }
            Ok(())
        }
    }
}
