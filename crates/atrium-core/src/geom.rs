//! Geodesic and planar geometry over WGS84 coordinates.
//!
//! All coordinates are `[lng, lat]` in decimal degrees (GeoJSON axis order).
//! Distances are returned in meters unless noted. Polygon operations work in
//! a local ENU (east-north-up) approximation scaled at a reference latitude,
//! which is accurate at building scale.

use crate::mvf::Geometry;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Flat-earth meters per degree of latitude, used for quick degree/meter
/// conversions in tight loops.
pub const DEG_LAT_M: f64 = 111_320.0;

/// Tolerance for deduplicating coincident intersection points, in degrees.
const COINCIDENT_EPS_DEG: f64 = 1e-9;

pub type Coord = [f64; 2];

/// Great-circle distance between two points in meters (Haversine formula).
pub fn distance_m(a: Coord, b: Coord) -> f64 {
    let phi1 = a[1].to_radians();
    let phi2 = b[1].to_radians();
    let dphi = (b[1] - a[1]).to_radians();
    let dlambda = (b[0] - a[0]).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Equirectangular approximation of [`distance_m`]. Agrees with the
/// haversine result to well under 0.1% at building scale; used in
/// neighbor-enumeration inner loops.
pub fn fast_distance_m(a: Coord, b: Coord) -> f64 {
    let mean_lat = ((a[1] + b[1]) / 2.0).to_radians();
    let dx = (b[0] - a[0]).to_radians() * mean_lat.cos();
    let dy = (b[1] - a[1]).to_radians();
    (dx * dx + dy * dy).sqrt() * EARTH_RADIUS_M
}

/// Forward azimuth from `a` to `b` in degrees, normalized to `[0, 360)`.
/// 0 = north, 90 = east.
pub fn bearing_deg(a: Coord, b: Coord) -> f64 {
    let phi1 = a[1].to_radians();
    let phi2 = b[1].to_radians();
    let delta_lambda = (b[0] - a[0]).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    (x.atan2(y).to_degrees() + 360.0) % 360.0
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Project a coordinate into local ENU meters relative to `origin`.
fn to_enu(p: Coord, origin: Coord) -> (f64, f64) {
    let x = (p[0] - origin[0]) * meters_per_deg_lon(origin[1]);
    let y = (p[1] - origin[1]) * meters_per_deg_lat(origin[1]);
    (x, y)
}

/// Inverse of [`to_enu`].
fn from_enu(x: f64, y: f64, origin: Coord) -> Coord {
    [
        origin[0] + x / meters_per_deg_lon(origin[1]).max(1e-9),
        origin[1] + y / meters_per_deg_lat(origin[1]).max(1e-9),
    ]
}

/// Minimum distance from `p` to the segment `[a, b]`, in meters.
pub fn point_to_segment_m(p: Coord, a: Coord, b: Coord) -> f64 {
    let (px, py) = to_enu(p, a);
    let (sx, sy) = to_enu(b, a);

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 1e-9 {
        return (px * px + py * py).sqrt();
    }

    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = px - t * sx;
    let dy = py - t * sy;
    (dx * dx + dy * dy).sqrt()
}

/// Ray-casting containment test against a single ring, boundary exclusive.
fn point_in_ring(p: Coord, ring: &[Coord]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);
        if ((yi > p[1]) != (yj > p[1])) && (p[0] < (xj - xi) * (p[1] - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether `p` lies on the boundary of `ring`, within [`COINCIDENT_EPS_DEG`].
fn point_on_ring(p: Coord, ring: &[Coord]) -> bool {
    ring.windows(2).any(|w| {
        let a = w[0];
        let b = w[1];
        // Degree-space point/segment distance; adequate as a boundary test.
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq < 1e-30 {
            0.0
        } else {
            (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len_sq).clamp(0.0, 1.0)
        };
        let ex = p[0] - (a[0] + t * dx);
        let ey = p[1] - (a[1] + t * dy);
        (ex * ex + ey * ey).sqrt() <= COINCIDENT_EPS_DEG
    })
}

fn point_in_rings(p: Coord, rings: &[Vec<Coord>]) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    if point_on_ring(p, outer) {
        return true;
    }
    if !point_in_ring(p, outer) {
        return false;
    }
    // Holes: on a hole boundary still counts as inside the polygon.
    for hole in &rings[1..] {
        if point_in_ring(p, hole) && !point_on_ring(p, hole) {
            return false;
        }
    }
    true
}

/// Edge-inclusive polygon containment. Accepts `Polygon` and `MultiPolygon`
/// geometry (holes honored); every other geometry contains nothing.
pub fn point_in_polygon(p: Coord, geometry: &Geometry) -> bool {
    match geometry {
        Geometry::Polygon { coordinates } => point_in_rings(p, coordinates),
        Geometry::MultiPolygon { coordinates } => {
            coordinates.iter().any(|rings| point_in_rings(p, rings))
        }
        _ => false,
    }
}

/// Proper intersection of segments `[a1,a2]` and `[b1,b2]` in degree space.
///
/// Affine scaling between degrees and local meters preserves incidence, so
/// the test runs directly on coordinates.
pub fn segment_intersection(a1: Coord, a2: Coord, b1: Coord, b2: Coord) -> Option<Coord> {
    let d1x = a2[0] - a1[0];
    let d1y = a2[1] - a1[1];
    let d2x = b2[0] - b1[0];
    let d2y = b2[1] - b1[1];

    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() < 1e-24 {
        return None; // parallel or degenerate
    }

    let t = ((b1[0] - a1[0]) * d2y - (b1[1] - a1[1]) * d2x) / denom;
    let u = ((b1[0] - a1[0]) * d1y - (b1[1] - a1[1]) * d1x) / denom;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some([a1[0] + t * d1x, a1[1] + t * d1y])
    } else {
        None
    }
}

fn ring_segment_intersections(a: Coord, b: Coord, ring: &[Coord], out: &mut Vec<Coord>) {
    for w in ring.windows(2) {
        if let Some(p) = segment_intersection(a, b, w[0], w[1]) {
            out.push(p);
        }
    }
}

/// All intersection points of the segment `[a, b]` with the boundary of the
/// given polygon or multipolygon. Coincident points within 1e-9 degrees are
/// deduplicated.
pub fn line_intersect(a: Coord, b: Coord, geometry: &Geometry) -> Vec<Coord> {
    let mut points = Vec::new();
    match geometry {
        Geometry::Polygon { coordinates } => {
            for ring in coordinates {
                ring_segment_intersections(a, b, ring, &mut points);
            }
        }
        Geometry::MultiPolygon { coordinates } => {
            for rings in coordinates {
                for ring in rings {
                    ring_segment_intersections(a, b, ring, &mut points);
                }
            }
        }
        _ => {}
    }

    let mut deduped: Vec<Coord> = Vec::with_capacity(points.len());
    for p in points {
        let duplicate = deduped.iter().any(|q| {
            (q[0] - p[0]).abs() <= COINCIDENT_EPS_DEG && (q[1] - p[1]).abs() <= COINCIDENT_EPS_DEG
        });
        if !duplicate {
            deduped.push(p);
        }
    }
    deduped
}

fn extend_bbox(bbox: &mut [f64; 4], p: Coord) {
    bbox[0] = bbox[0].min(p[0]);
    bbox[1] = bbox[1].min(p[1]);
    bbox[2] = bbox[2].max(p[0]);
    bbox[3] = bbox[3].max(p[1]);
}

/// Axis-aligned bounding box `[min_lng, min_lat, max_lng, max_lat]`.
pub fn bbox(geometry: &Geometry) -> [f64; 4] {
    let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for p in geometry.coords() {
        extend_bbox(&mut out, p);
    }
    out
}

/// Whether two bboxes overlap (inclusive).
pub fn bboxes_overlap(a: &[f64; 4], b: &[f64; 4]) -> bool {
    a[0] <= b[2] && b[0] <= a[2] && a[1] <= b[3] && b[1] <= a[3]
}

/// Bbox of a single segment, padded by `pad_deg` on each side.
pub fn segment_bbox(a: Coord, b: Coord, pad_deg: f64) -> [f64; 4] {
    [
        a[0].min(b[0]) - pad_deg,
        a[1].min(b[1]) - pad_deg,
        a[0].max(b[0]) + pad_deg,
        a[1].max(b[1]) + pad_deg,
    ]
}

/// Geometric centroid. Polygons use the area-weighted centroid of the outer
/// ring; lines and points average their vertices.
pub fn centroid(geometry: &Geometry) -> Option<Coord> {
    match geometry {
        Geometry::Point { coordinates } => Some(*coordinates),
        Geometry::Polygon { coordinates } => coordinates.first().and_then(|r| ring_centroid(r)),
        Geometry::MultiPolygon { coordinates } => {
            // Largest part wins; good enough for labeling and buffering.
            coordinates
                .iter()
                .filter_map(|rings| rings.first())
                .max_by(|a, b| {
                    ring_area_deg(a)
                        .abs()
                        .partial_cmp(&ring_area_deg(b).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .and_then(|r| ring_centroid(r))
        }
        _ => {
            let mut n = 0usize;
            let mut sum = [0.0, 0.0];
            for p in geometry.coords() {
                sum[0] += p[0];
                sum[1] += p[1];
                n += 1;
            }
            if n == 0 {
                None
            } else {
                Some([sum[0] / n as f64, sum[1] / n as f64])
            }
        }
    }
}

/// Signed shoelace area of a ring in squared degrees. Positive for
/// counter-clockwise winding.
fn ring_area_deg(ring: &[Coord]) -> f64 {
    let mut sum = 0.0;
    for w in ring.windows(2) {
        sum += w[0][0] * w[1][1] - w[1][0] * w[0][1];
    }
    sum / 2.0
}

fn ring_centroid(ring: &[Coord]) -> Option<Coord> {
    if ring.len() < 3 {
        return None;
    }
    let area = ring_area_deg(ring);
    if area.abs() < 1e-24 {
        // Degenerate ring; fall back to the vertex average.
        let n = ring.len() as f64;
        let sum = ring
            .iter()
            .fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
        return Some([sum[0] / n, sum[1] / n]);
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for w in ring.windows(2) {
        let cross = w[0][0] * w[1][1] - w[1][0] * w[0][1];
        cx += (w[0][0] + w[1][0]) * cross;
        cy += (w[0][1] + w[1][1]) * cross;
    }
    Some([cx / (6.0 * area), cy / (6.0 * area)])
}

/// Planar area of a polygon or multipolygon in square meters, holes
/// subtracted, evaluated in ENU at the feature centroid latitude.
pub fn area_m2(geometry: &Geometry) -> f64 {
    let Some(origin) = centroid(geometry) else {
        return 0.0;
    };
    let ring_area_m2 = |ring: &[Coord]| -> f64 {
        let mut sum = 0.0;
        let pts: Vec<(f64, f64)> = ring.iter().map(|p| to_enu(*p, origin)).collect();
        for w in pts.windows(2) {
            sum += w[0].0 * w[1].1 - w[1].0 * w[0].1;
        }
        (sum / 2.0).abs()
    };
    match geometry {
        Geometry::Polygon { coordinates } => polygon_area(coordinates, &ring_area_m2),
        Geometry::MultiPolygon { coordinates } => coordinates
            .iter()
            .map(|rings| polygon_area(rings, &ring_area_m2))
            .sum(),
        _ => 0.0,
    }
}

fn polygon_area(rings: &[Vec<Coord>], ring_area_m2: &dyn Fn(&[Coord]) -> f64) -> f64 {
    let Some(outer) = rings.first() else {
        return 0.0;
    };
    let holes: f64 = rings[1..].iter().map(|r| ring_area_m2(r)).sum();
    (ring_area_m2(outer) - holes).max(0.0)
}

/// Polygonal buffer of a line or polygon by `meters`, interpreted
/// geodesically at the feature's centroid latitude.
///
/// Returns `None` for degenerate geometry (callers drop the feature).
pub fn buffer(geometry: &Geometry, meters: f64) -> Option<Geometry> {
    if !meters.is_finite() || meters <= 0.0 {
        return None;
    }
    match geometry {
        Geometry::LineString { coordinates } => {
            let ring = buffer_polyline(coordinates, meters)?;
            Some(Geometry::Polygon {
                coordinates: vec![ring],
            })
        }
        Geometry::MultiLineString { coordinates } => {
            let parts: Vec<Vec<Vec<Coord>>> = coordinates
                .iter()
                .filter_map(|line| buffer_polyline(line, meters).map(|ring| vec![ring]))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(Geometry::MultiPolygon { coordinates: parts })
            }
        }
        Geometry::Polygon { coordinates } => {
            let rings = buffer_polygon_rings(coordinates, meters)?;
            Some(Geometry::Polygon { coordinates: rings })
        }
        Geometry::MultiPolygon { coordinates } => {
            let parts: Vec<Vec<Vec<Coord>>> = coordinates
                .iter()
                .filter_map(|rings| buffer_polygon_rings(rings, meters))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(Geometry::MultiPolygon { coordinates: parts })
            }
        }
        Geometry::Point { .. } => None,
    }
}

/// Average of a point set, used as the ENU anchor so buffer meters are
/// interpreted at the feature's centroid latitude.
fn vertex_average(pts: &[Coord]) -> Coord {
    let n = pts.len() as f64;
    let sum = pts
        .iter()
        .fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
    [sum[0] / n, sum[1] / n]
}

/// Ribbon polygon around a polyline: both sides offset by `meters` with
/// mitered joints, flat end caps.
fn buffer_polyline(line: &[Coord], meters: f64) -> Option<Vec<Coord>> {
    let pts = dedup_consecutive(line);
    if pts.len() < 2 {
        return None;
    }
    let origin = vertex_average(&pts);
    let enu: Vec<(f64, f64)> = pts.iter().map(|p| to_enu(*p, origin)).collect();

    let normals = segment_normals(&enu)?;
    let left = offset_side(&enu, &normals, meters);
    let right = offset_side(&enu, &normals, -meters);

    let mut ring: Vec<Coord> = Vec::with_capacity(left.len() + right.len() + 1);
    for (x, y) in left {
        ring.push(from_enu(x, y, origin));
    }
    for (x, y) in right.into_iter().rev() {
        ring.push(from_enu(x, y, origin));
    }
    ring.push(ring[0]);
    Some(ring)
}

fn buffer_polygon_rings(rings: &[Vec<Coord>], meters: f64) -> Option<Vec<Vec<Coord>>> {
    let outer = rings.first()?;
    let expanded = offset_ring(outer, meters)?;
    let mut out = vec![expanded];
    // Holes are kept verbatim: outward growth of the outer boundary is what
    // room-boundary tolerance needs.
    out.extend(rings[1..].iter().cloned());
    Some(out)
}

/// Offset a closed ring outward by `meters` (inward for negative values).
fn offset_ring(ring: &[Coord], meters: f64) -> Option<Vec<Coord>> {
    let mut pts = dedup_consecutive(ring);
    if pts.len() >= 2 && pts.first() == pts.last() {
        pts.pop();
    }
    if pts.len() < 3 {
        return None;
    }

    let origin = vertex_average(&pts);
    let enu: Vec<(f64, f64)> = pts.iter().map(|p| to_enu(*p, origin)).collect();

    // Outward side depends on winding: CCW interiors lie left of travel.
    let mut signed = 0.0;
    for i in 0..enu.len() {
        let j = (i + 1) % enu.len();
        signed += enu[i].0 * enu[j].1 - enu[j].0 * enu[i].1;
    }
    let sign = if signed >= 0.0 { 1.0 } else { -1.0 };

    let n = enu.len();
    let mut out = Vec::with_capacity(n + 1);
    for i in 0..n {
        let prev = enu[(i + n - 1) % n];
        let cur = enu[i];
        let next = enu[(i + 1) % n];

        let n1 = edge_normal(prev, cur, sign)?;
        let n2 = edge_normal(cur, next, sign)?;
        let (mx, my, scale) = miter(n1, n2, meters);
        out.push(from_enu(cur.0 + mx * scale, cur.1 + my * scale, origin));
    }
    out.push(out[0]);
    Some(out)
}

fn dedup_consecutive(pts: &[Coord]) -> Vec<Coord> {
    let mut out: Vec<Coord> = Vec::with_capacity(pts.len());
    for p in pts {
        if out
            .last()
            .map_or(true, |q| (q[0] - p[0]).abs() > 1e-12 || (q[1] - p[1]).abs() > 1e-12)
        {
            out.push(*p);
        }
    }
    out
}

/// Unit normal of the edge `a -> b`, rotated to the `sign` side.
fn edge_normal(a: (f64, f64), b: (f64, f64), sign: f64) -> Option<(f64, f64)> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return None;
    }
    Some((sign * dy / len, -sign * dx / len))
}

/// Mitered joint direction and scale for two adjacent edge normals.
fn miter(n1: (f64, f64), n2: (f64, f64), meters: f64) -> (f64, f64, f64) {
    let mx = n1.0 + n2.0;
    let my = n1.1 + n2.1;
    let len = (mx * mx + my * my).sqrt();
    if len < 1e-9 {
        // 180-degree turn; fall back to the first normal.
        return (n1.0, n1.1, meters);
    }
    let dot = (n1.0 * n2.0 + n1.1 * n2.1).clamp(-1.0, 1.0);
    // Miter length grows as the joint sharpens; clamp to 4x to avoid spikes.
    let scale = (meters * (2.0 / (1.0 + dot)).sqrt()).min(meters.abs() * 4.0);
    (mx / len, my / len, scale)
}

fn segment_normals(enu: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
    let n = enu.len();
    let mut normals = Vec::with_capacity(n);
    for i in 0..n {
        let normal = if i == 0 {
            edge_normal(enu[0], enu[1], 1.0)?
        } else if i == n - 1 {
            edge_normal(enu[n - 2], enu[n - 1], 1.0)?
        } else {
            let n1 = edge_normal(enu[i - 1], enu[i], 1.0)?;
            let n2 = edge_normal(enu[i], enu[i + 1], 1.0)?;
            let (mx, my, _) = miter(n1, n2, 1.0);
            (mx, my)
        };
        normals.push(normal);
    }
    Some(normals)
}

fn offset_side(enu: &[(f64, f64)], normals: &[(f64, f64)], meters: f64) -> Vec<(f64, f64)> {
    enu.iter()
        .zip(normals)
        .map(|(&(x, y), &(nx, ny))| (x + nx * meters, y + ny * meters))
        .collect()
}
