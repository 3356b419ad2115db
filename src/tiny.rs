//! Removal of specks left over after tracing.

use log::debug;

use crate::config::TinyParams;
use crate::path::TracePath;

/// Keep the paths whose approximate bounds area reaches the threshold.
pub fn remove_tiny(paths: Vec<TracePath>, params: &TinyParams) -> Vec<TracePath> {
    let before = paths.len();
    let kept: Vec<TracePath> = paths
        .into_iter()
        .filter(|p| p.bounds_area() >= params.area_threshold)
        .collect();
    if kept.len() < before {
        debug!("remove-tiny: dropped {} of {before} paths", before - kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    fn bar(length: f64, y: f64) -> TracePath {
        TracePath::from_polyline(&[Point::new(0.0, y), Point::new(length, y)], false)
    }

    #[test]
    fn threshold_is_inclusive_and_order_stable() {
        let paths = vec![bar(5.1, 0.0), bar(4.9, 1.0), bar(5.0, 2.0), bar(20.0, 3.0)];
        let kept = remove_tiny(paths, &TinyParams::default());
        let lengths: Vec<f64> = kept.iter().map(TracePath::length).collect();
        assert_eq!(lengths, vec![5.1, 5.0, 20.0]);
    }

    #[test]
    fn empty_paths_are_dropped() {
        let kept = remove_tiny(vec![TracePath::new()], &TinyParams::default());
        assert!(kept.is_empty());
    }
}
