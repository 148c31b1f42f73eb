//! Cosmetic path post-processing.
//!
//! Simplification and spline smoothing operate on display coordinates only;
//! smoothed output never feeds back into the graph, and smoothing never
//! crosses a floor boundary.

use crate::geom::Coord;

/// Default spline time resolution; the sampler emits one point per 100
/// resolution units along each same-floor subpath.
pub const SPLINE_RESOLUTION: usize = 10_000;

/// Douglas-Peucker simplification with the given tolerance in degrees.
/// The first and last points are always preserved.
pub fn simplify(path: &[Coord], epsilon_deg: f64) -> Vec<Coord> {
    if path.len() <= 2 || epsilon_deg <= 0.0 {
        return path.to_vec();
    }
    let mut keep = vec![false; path.len()];
    keep[0] = true;
    keep[path.len() - 1] = true;
    simplify_span(path, 0, path.len() - 1, epsilon_deg, &mut keep);
    path.iter()
        .zip(&keep)
        .filter(|(_, &k)| k)
        .map(|(p, _)| *p)
        .collect()
}

fn simplify_span(path: &[Coord], first: usize, last: usize, epsilon: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let mut max_dist = 0.0;
    let mut max_idx = first;
    for i in (first + 1)..last {
        let d = perpendicular_deg(path[i], path[first], path[last]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }
    if max_dist > epsilon {
        keep[max_idx] = true;
        simplify_span(path, first, max_idx, epsilon, keep);
        simplify_span(path, max_idx, last, epsilon, keep);
    }
}

/// Perpendicular distance from `p` to the line `[a, b]` in degree space.
fn perpendicular_deg(p: Coord, a: Coord, b: Coord) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-30 {
        let ex = p[0] - a[0];
        let ey = p[1] - a[1];
        return (ex * ex + ey * ey).sqrt();
    }
    let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len_sq).clamp(0.0, 1.0);
    let ex = p[0] - (a[0] + t * dx);
    let ey = p[1] - (a[1] + t * dy);
    (ex * ex + ey * ey).sqrt()
}

/// Smooth a path with per-floor Catmull-Rom splines.
///
/// The path is split on floor boundaries; each same-floor subpath of at
/// least four points is replaced by spline samples (endpoints preserved),
/// shorter subpaths pass through verbatim. Returns the smoothed coordinates
/// with a floors sequence of matching length.
pub fn smooth_with_floors(path: &[Coord], floors: &[String]) -> (Vec<Coord>, Vec<String>) {
    if path.len() != floors.len() || path.len() < 2 {
        return (path.to_vec(), floors.to_vec());
    }

    let mut out_path: Vec<Coord> = Vec::new();
    let mut out_floors: Vec<String> = Vec::new();

    let mut run_start = 0usize;
    for i in 1..=path.len() {
        let run_ended = i == path.len() || floors[i] != floors[run_start];
        if !run_ended {
            continue;
        }
        let run = &path[run_start..i];
        let floor = &floors[run_start];
        let smoothed = if run.len() >= 4 {
            catmull_rom(run, SPLINE_RESOLUTION)
        } else {
            run.to_vec()
        };
        for p in smoothed {
            // Drop the duplicate join point between consecutive runs.
            if out_path.last().map_or(true, |q: &Coord| *q != p) || out_floors.last() != Some(floor)
            {
                out_path.push(p);
                out_floors.push(floor.clone());
            }
        }
        run_start = i;
    }

    (out_path, out_floors)
}

/// Uniform Catmull-Rom sampling through every control point. Emits
/// `resolution / 100` samples spread across the subpath, always including
/// the original endpoints.
fn catmull_rom(points: &[Coord], resolution: usize) -> Vec<Coord> {
    let segments = points.len() - 1;
    let total_samples = (resolution / 100).max(segments + 1);
    let per_segment = (total_samples / segments).max(1);

    let point_at = |i: isize| -> Coord {
        let clamped = i.clamp(0, points.len() as isize - 1) as usize;
        points[clamped]
    };

    let mut out = Vec::with_capacity(segments * per_segment + 1);
    for seg in 0..segments {
        let p0 = point_at(seg as isize - 1);
        let p1 = point_at(seg as isize);
        let p2 = point_at(seg as isize + 1);
        let p3 = point_at(seg as isize + 2);
        for step in 0..per_segment {
            let t = step as f64 / per_segment as f64;
            out.push(catmull_rom_point(p0, p1, p2, p3, t));
        }
    }
    out.push(*points.last().unwrap());
    out
}

fn catmull_rom_point(p0: Coord, p1: Coord, p2: Coord, p3: Coord, t: f64) -> Coord {
    let t2 = t * t;
    let t3 = t2 * t;
    let component = |c0: f64, c1: f64, c2: f64, c3: f64| -> f64 {
        0.5 * ((2.0 * c1)
            + (-c0 + c2) * t
            + (2.0 * c0 - 5.0 * c1 + 4.0 * c2 - c3) * t2
            + (-c0 + 3.0 * c1 - 3.0 * c2 + c3) * t3)
    };
    [
        component(p0[0], p1[0], p2[0], p3[0]),
        component(p0[1], p1[1], p2[1], p3[1]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_drops_collinear_points() {
        let path = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let simplified = simplify(&path, 1e-6);
        assert_eq!(simplified, vec![[0.0, 0.0], [3.0, 0.0]]);
    }

    #[test]
    fn test_simplify_keeps_corners() {
        let path = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let simplified = simplify(&path, 1e-6);
        assert_eq!(simplified.len(), 3);
    }

    #[test]
    fn test_simplify_preserves_endpoints() {
        let path = vec![[0.0, 0.0], [0.5, 0.001], [1.0, 0.0]];
        let simplified = simplify(&path, 0.1);
        assert_eq!(simplified.first(), Some(&[0.0, 0.0]));
        assert_eq!(simplified.last(), Some(&[1.0, 0.0]));
    }

    fn floors(runs: &[(&str, usize)]) -> Vec<String> {
        runs.iter()
            .flat_map(|(floor, count)| std::iter::repeat(floor.to_string()).take(*count))
            .collect()
    }

    #[test]
    fn test_smooth_preserves_endpoints_and_lengths_match() {
        let path = vec![[0.0, 0.0], [1.0, 0.5], [2.0, -0.5], [3.0, 0.0], [4.0, 0.2]];
        let fls = floors(&[("floor0", 5)]);
        let (smoothed, out_floors) = smooth_with_floors(&path, &fls);
        assert_eq!(smoothed.len(), out_floors.len());
        assert!(smoothed.len() > path.len());
        assert_eq!(smoothed.first(), Some(&[0.0, 0.0]));
        assert_eq!(smoothed.last(), Some(&[4.0, 0.2]));
    }

    #[test]
    fn test_short_subpath_passes_verbatim() {
        let path = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let fls = floors(&[("floor0", 3)]);
        let (smoothed, _) = smooth_with_floors(&path, &fls);
        assert_eq!(smoothed, path);
    }

    #[test]
    fn test_never_smooths_across_floor_change() {
        // Two floors of 4+ points each: both smoothed independently, and
        // every output point keeps its run's floor.
        let path: Vec<Coord> = (0..8).map(|i| [i as f64, (i % 2) as f64 * 0.1]).collect();
        let fls = floors(&[("floor0", 4), ("floor1", 4)]);
        let (smoothed, out_floors) = smooth_with_floors(&path, &fls);
        assert_eq!(smoothed.len(), out_floors.len());
        // The floor sequence stays two contiguous blocks.
        let first_f1 = out_floors.iter().position(|f| f == "floor1").unwrap();
        assert!(out_floors[..first_f1].iter().all(|f| f == "floor0"));
        assert!(out_floors[first_f1..].iter().all(|f| f == "floor1"));
        // Original floor-change endpoints survive.
        assert!(smoothed.contains(&[3.0, 0.1]));
        assert!(smoothed.contains(&[4.0, 0.0]));
    }

    #[test]
    fn test_mismatched_lengths_pass_through() {
        let path = vec![[0.0, 0.0], [1.0, 0.0]];
        let fls = floors(&[("floor0", 1)]);
        let (smoothed, out_floors) = smooth_with_floors(&path, &fls);
        assert_eq!(smoothed, path);
        assert_eq!(out_floors.len(), 1);
    }
}
