//! Spike detection and pairing on a two-sided correspondence.

use std::ops::RangeInclusive;

use kurbo::Point;

use crate::config::SpikeWeights;
use crate::geom::angle_diff;

use super::correspond::Correspondence;

/// Pairs used on either side of a spike to measure its turning angles.
const ANGLE_SPAN: usize = 3;

/// A run of pairs whose sides drift further apart than a stroke allows.
#[derive(Debug, Clone, PartialEq)]
pub struct Spike {
    /// Centre pair index; merged spikes may land on a half index.
    pub index: f64,
    pub range: RangeInclusive<usize>,
    /// Centerline points just before and after the run.
    pub start: Point,
    pub end: Point,
    /// Centerline point at the widest pair.
    pub midpoint: Point,
    /// Boundary length on both sides over the run.
    pub length: f64,
    /// Widest pair distance inside the run.
    pub diagonal: f64,
    /// Centerline direction entering and leaving the run.
    pub angle_before: f64,
    pub angle_after: f64,
}

impl Spike {
    /// Absolute turn of the centerline across the spike.
    pub fn turn(&self) -> f64 {
        angle_diff(self.angle_before, self.angle_after).abs()
    }

    fn inclination(&self) -> f64 {
        let d = self.end - self.start;
        d.y.atan2(d.x)
    }
}

/// Contiguous runs of pairs with deviation above `threshold`.
pub fn find_spikes(corr: &Correspondence, threshold: f64) -> Vec<Spike> {
    let mut spikes = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, fit) in corr.fits.iter().enumerate() {
        match (fit.deviation > threshold, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                spikes.push(describe(corr, s, i - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        spikes.push(describe(corr, s, corr.len() - 1));
    }
    spikes
}

fn describe(corr: &Correspondence, first: usize, last: usize) -> Spike {
    let mid = corr.centerline();
    let n = mid.len();
    let before = first.saturating_sub(1);
    let after = (last + 1).min(n - 1);

    let widest = (first..=last)
        .max_by(|&x, &y| corr.fits[x].deviation.total_cmp(&corr.fits[y].deviation))
        .unwrap_or(first);
    let side_len = |pick: fn(&super::correspond::LineFit) -> Point| -> f64 {
        (first..last)
            .map(|i| pick(&corr.fits[i]).distance(pick(&corr.fits[i + 1])))
            .sum()
    };
    let direction = |from: usize, to: usize| {
        let d = mid[to] - mid[from];
        d.y.atan2(d.x)
    };

    Spike {
        index: (first + last) as f64 / 2.0,
        range: first..=last,
        start: mid[before],
        end: mid[after],
        midpoint: mid[widest],
        length: side_len(|f| f.point_a) + side_len(|f| f.point_b),
        diagonal: corr.fits[widest].deviation * 2.0,
        angle_before: direction(before.saturating_sub(ANGLE_SPAN), before),
        angle_after: direction(after, (after + ANGLE_SPAN).min(n - 1)),
    }
}

/// Resolve spikes whose gap along the centerline is below `return_distance`.
///
/// When the good runs on either side of the close pair are about as long,
/// the two spikes merge and the centre lands halfway between them. Otherwise
/// the spike next to the longer run survives and the other is dropped.
pub fn merge_close(spikes: Vec<Spike>, corr: &Correspondence, return_distance: f64) -> Vec<Spike> {
    let arc = corr.arc_lengths();
    let Some(&total) = arc.last() else {
        return spikes;
    };
    let starts: Vec<usize> = spikes.iter().map(|s| *s.range.start()).collect();
    let mut merged: Vec<Spike> = Vec::with_capacity(spikes.len());
    for (k, spike) in spikes.into_iter().enumerate() {
        let Some(last) = merged.len().checked_sub(1) else {
            merged.push(spike);
            continue;
        };
        let prev = &merged[last];
        if arc[*spike.range.start()] - arc[*prev.range.end()] >= return_distance {
            merged.push(spike);
            continue;
        }
        let run_start = last.checked_sub(1).map_or(0.0, |j| arc[*merged[j].range.end()]);
        let before = arc[*prev.range.start()] - run_start;
        let after = starts.get(k + 1).map_or(total, |&s| arc[s]) - arc[*spike.range.end()];
        if (before - after).abs() <= return_distance {
            let joined = describe(corr, *prev.range.start(), *spike.range.end());
            let index = (prev.index + spike.index) / 2.0;
            merged[last] = Spike { index, ..joined };
        } else if after > before {
            merged[last] = spike;
        }
    }
    merged
}

/// Score of pairing spikes `p` and `q`; lower is better.
pub fn pair_score(p: &Spike, q: &Spike, corr: &Correspondence, weights: &SpikeWeights) -> f64 {
    let n = corr.len().max(1) as f64;
    let arc = corr.arc_lengths();
    let total = arc.last().copied().unwrap_or(0.0).max(1e-9);

    let midway = ((p.index + q.index) / 2.0) / n;
    let mut inclination = angle_diff(p.inclination(), q.inclination()).abs();
    if inclination > std::f64::consts::FRAC_PI_2 {
        inclination = std::f64::consts::PI - inclination;
    }
    let length = (p.length + q.length) / 2.0 / total;
    let angle = (p.turn() + q.turn()) / 2.0 / std::f64::consts::PI;
    let at = |s: &Spike| arc[(s.index.floor() as usize).min(arc.len() - 1)];
    let distance = (at(q) - at(p)).abs().max(1.0);

    weights.midway * (0.5 - midway).abs()
        + weights.inclination * inclination / std::f64::consts::FRAC_PI_2
        + weights.length * length
        + weights.angle * angle
        + weights.distance / distance
}

/// The best-scoring spike pair `(i, j)` with `i < j`.
pub fn best_pair(spikes: &[Spike], corr: &Correspondence, weights: &SpikeWeights) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), f64)> = None;
    for i in 0..spikes.len() {
        for j in (i + 1)..spikes.len() {
            let score = pair_score(&spikes[i], &spikes[j], corr, weights);
            if best.map_or(true, |(_, s)| score < s) {
                best = Some(((i, j), score));
            }
        }
    }
    best.map(|(pair, _)| pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::correspond::LineFit;

    /// A straight two-sided trace along y = 0 with the given half-widths.
    fn trace(deviations: &[f64]) -> Correspondence {
        let fits = deviations
            .iter()
            .enumerate()
            .map(|(i, &d)| LineFit {
                deviation: d,
                index_a: i,
                index_b: i,
                point_a: Point::new(i as f64, -d),
                point_b: Point::new(i as f64, d),
            })
            .collect();
        Correspondence { fits, cyclic: false }
    }

    #[test]
    fn spikes_are_contiguous_runs() {
        let corr = trace(&[1.0, 1.0, 6.0, 7.0, 1.0, 1.0, 1.0, 5.0]);
        let spikes = find_spikes(&corr, 4.0);
        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].range, 2..=3);
        assert_eq!(spikes[0].index, 2.5);
        assert_eq!(spikes[0].diagonal, 14.0);
        assert_eq!(spikes[0].midpoint, Point::new(3.0, 0.0));
        assert_eq!(spikes[1].range, 7..=7);
    }

    #[test]
    fn close_spike_beside_the_shorter_run_is_dropped() {
        let corr = trace(&[1.0, 6.0, 1.0, 6.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 6.0, 1.0]);
        let spikes = find_spikes(&corr, 4.0);
        assert_eq!(spikes.len(), 3);
        let kept = merge_close(spikes, &corr, 3.0);
        let ranges: Vec<_> = kept.iter().map(|s| s.range.clone()).collect();
        assert_eq!(ranges, vec![3..=3, 10..=10]);
        assert_eq!(kept[0].index, 3.0);
    }

    #[test]
    fn close_spikes_between_even_runs_merge() {
        let corr = trace(&[1.0, 1.0, 1.0, 1.0, 1.0, 6.0, 1.0, 6.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let spikes = find_spikes(&corr, 4.0);
        assert_eq!(spikes.len(), 2);
        let merged = merge_close(spikes, &corr, 3.0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].range, 5..=7);
        assert_eq!(merged[0].index, 6.0);
    }

    #[test]
    fn distant_spikes_stay_apart() {
        let corr = trace(&[1.0, 6.0, 1.0, 1.0, 1.0, 1.0, 1.0, 6.0, 1.0]);
        let merged = merge_close(find_spikes(&corr, 4.0), &corr, 3.0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn symmetric_pair_scores_best() {
        let mut d = vec![1.0; 41];
        for i in [2, 10, 30, 38] {
            d[i] = 6.0;
        }
        let corr = trace(&d);
        let spikes = find_spikes(&corr, 4.0);
        let weights = SpikeWeights {
            distance: 0.0,
            ..SpikeWeights::default()
        };
        assert_eq!(best_pair(&spikes, &corr, &weights), Some((0, 3)));
    }
}
