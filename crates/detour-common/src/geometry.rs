//! Geometry helpers working on the xz-plane
//!
//! Detour treats y as up; adjacency, containment and segment tests are all
//! done on the ground plane.

/// Twice the signed area of triangle `abc` on the xz-plane
#[inline]
pub fn tri_area_2d(a: &[f32; 3], b: &[f32; 3], c: &[f32; 3]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Perp dot product on the xz-plane
#[inline]
pub fn vperp_2d(u: &[f32; 3], v: &[f32; 3]) -> f32 {
    u[2] * v[0] - u[0] * v[2]
}

/// Squared distance from `pt` to segment `p..q` on the xz-plane and the
/// parametric position of the closest point
pub fn dist_pt_seg_sqr_2d(pt: &[f32; 3], p: &[f32; 3], q: &[f32; 3]) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqz = q[2] - p[2];
    let dx = pt[0] - p[0];
    let dz = pt[2] - p[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = p[0] + t * pqx - pt[0];
    let dz = p[2] + t * pqz - pt[2];
    (dx * dx + dz * dz, t)
}

/// Crossing-number containment test on the xz-plane
pub fn point_in_polygon_2d(pt: &[f32; 3], verts: &[[f32; 3]]) -> bool {
    let mut inside = false;
    let n = verts.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = &verts[i];
        let vj = &verts[j];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance from a point to every edge of a polygon
///
/// Returns whether the point is inside the polygon together with the squared
/// distance and parametric position of each edge `verts[k] -> verts[k + 1]`
/// at index `k`.
pub fn distance_pt_poly_edges_sqr(pt: &[f32; 3], verts: &[[f32; 3]]) -> (bool, Vec<(f32, f32)>) {
    let n = verts.len();
    let mut edges = Vec::with_capacity(n);
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        edges.push(dist_pt_seg_sqr_2d(pt, &verts[j], &verts[i]));
        j = i;
    }
    if n > 0 {
        edges.rotate_left(1);
    }
    (point_in_polygon_2d(pt, verts), edges)
}

/// Result of clipping a segment against a convex polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPolyHit {
    /// Parametric entry position
    pub tmin: f32,
    /// Parametric exit position
    pub tmax: f32,
    /// Edge the segment enters through, `None` if it starts inside
    pub seg_min: Option<usize>,
    /// Edge the segment exits through, `None` if it ends inside
    pub seg_max: Option<usize>,
}

/// Clips segment `p0..p1` against a convex polygon on the xz-plane
///
/// Edge `k` runs from `verts[k]` to `verts[k + 1]`. Returns `None` when the
/// segment misses the polygon.
pub fn intersect_segment_poly_2d(
    p0: &[f32; 3],
    p1: &[f32; 3],
    verts: &[[f32; 3]],
) -> Option<SegmentPolyHit> {
    const EPS: f32 = 0.000_000_01;

    let mut hit = SegmentPolyHit {
        tmin: 0.0,
        tmax: 1.0,
        seg_min: None,
        seg_max: None,
    };

    let dir = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
    let n = verts.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let edge = [
            verts[i][0] - verts[j][0],
            verts[i][1] - verts[j][1],
            verts[i][2] - verts[j][2],
        ];
        let diff = [
            p0[0] - verts[j][0],
            p0[1] - verts[j][1],
            p0[2] - verts[j][2],
        ];
        let num = vperp_2d(&edge, &diff);
        let den = vperp_2d(&dir, &edge);
        if den.abs() < EPS {
            // Parallel to this edge
            if num < 0.0 {
                return None;
            }
            j = i;
            continue;
        }
        let t = num / den;
        if den < 0.0 {
            // Entering across edge j -> i
            if t > hit.tmin {
                hit.tmin = t;
                hit.seg_min = Some(j);
                if hit.tmin > hit.tmax {
                    return None;
                }
            }
        } else if t < hit.tmax {
            // Leaving across edge j -> i
            hit.tmax = t;
            hit.seg_max = Some(j);
            if hit.tmax < hit.tmin {
                return None;
            }
        }
        j = i;
    }
    Some(hit)
}

/// Height of `p` over triangle `abc`, if `p` projects inside it
pub fn closest_height_point_triangle(
    p: &[f32; 3],
    a: &[f32; 3],
    b: &[f32; 3],
    c: &[f32; 3],
) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    let mut denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }
    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];
    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

/// Checks whether two axis-aligned boxes overlap
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    !(amin[0] > bmax[0]
        || amax[0] < bmin[0]
        || amin[1] > bmax[1]
        || amax[1] < bmin[1]
        || amin[2] > bmax[2]
        || amax[2] < bmin[2])
}

/// Average of the polygon's vertices
pub fn calc_poly_center(verts: &[[f32; 3]]) -> [f32; 3] {
    let mut center = [0.0f32; 3];
    if verts.is_empty() {
        return center;
    }
    for v in verts {
        center[0] += v[0];
        center[1] += v[1];
        center[2] += v[2];
    }
    let s = 1.0 / verts.len() as f32;
    [center[0] * s, center[1] * s, center[2] * s]
}
