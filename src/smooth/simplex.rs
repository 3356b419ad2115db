//! Nelder-Mead minimization.
//!
//! Derivative-free search over `N` coordinates from `N + 1` starting
//! vertices. Stops once the values across the simplex have stayed within
//! `epsilon` of the best for [`STALL_LIMIT`] consecutive iterations, or
//! after `max_iterations`.

use crate::error::TraceError;
use crate::pipeline::PipelineRun;

/// Consecutive converged iterations before the search stops.
pub const STALL_LIMIT: usize = 8;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum<const N: usize> {
    pub point: [f64; N],
    pub value: f64,
    pub iterations: usize,
}

fn toward<const N: usize>(from: &[f64; N], to: &[f64; N], t: f64) -> [f64; N] {
    std::array::from_fn(|i| from[i] + t * (to[i] - from[i]))
}

/// Minimize `cost` starting from `vertices` (exactly `N + 1` of them).
pub fn minimize<const N: usize>(
    vertices: Vec<[f64; N]>,
    mut cost: impl FnMut(&[f64; N]) -> f64,
    max_iterations: usize,
    epsilon: f64,
    run: &PipelineRun,
) -> Result<Minimum<N>, TraceError> {
    if vertices.len() != N + 1 {
        return Err(TraceError::invariant(format!(
            "simplex over {N} coordinates needs {} vertices, got {}",
            N + 1,
            vertices.len()
        )));
    }
    let mut simplex: Vec<([f64; N], f64)> = vertices
        .into_iter()
        .map(|v| {
            let f = cost(&v);
            (v, f)
        })
        .collect();

    let mut iterations = 0;
    let mut stall = 0;
    loop {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        if iterations >= max_iterations || stall >= STALL_LIMIT {
            break;
        }
        run.checkpoint()?;
        iterations += 1;

        let centroid: [f64; N] =
            std::array::from_fn(|i| simplex[..N].iter().map(|(v, _)| v[i]).sum::<f64>() / N as f64);
        let (worst, f_worst) = simplex[N];
        let reflected = toward(&centroid, &worst, -REFLECT);
        let f_reflected = cost(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = toward(&centroid, &reflected, EXPAND);
            let f_expanded = cost(&expanded);
            simplex[N] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[N - 1].1 {
            simplex[N] = (reflected, f_reflected);
        } else {
            let (contracted, limit) = if f_reflected < f_worst {
                (toward(&centroid, &reflected, CONTRACT), f_reflected)
            } else {
                (toward(&centroid, &worst, CONTRACT), f_worst)
            };
            let f_contracted = cost(&contracted);
            if f_contracted < limit {
                simplex[N] = (contracted, f_contracted);
            } else {
                let best = simplex[0].0;
                for vertex in simplex.iter_mut().skip(1) {
                    let v = toward(&best, &vertex.0, SHRINK);
                    *vertex = (v, cost(&v));
                }
            }
        }

        let lowest = simplex.iter().map(|(_, f)| *f).fold(f64::INFINITY, f64::min);
        let highest = simplex.iter().map(|(_, f)| *f).fold(f64::NEG_INFINITY, f64::max);
        if highest - lowest < epsilon {
            stall += 1;
        } else {
            stall = 0;
        }
    }

    let (point, value) = simplex[0];
    Ok(Minimum {
        point,
        value,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    fn bowl(v: &[f64; 2]) -> f64 {
        (v[0] - 1.0).powi(2) + (v[1] + 2.0).powi(2)
    }

    #[test]
    fn finds_the_bottom_of_a_bowl() {
        let run = PipelineRun::detached(Stage::Smooth);
        let start = vec![[0.0, 0.0], [0.5, 0.0], [0.0, 0.5]];
        let min = minimize(start, bowl, 500, 1e-12, &run).unwrap();
        assert!((min.point[0] - 1.0).abs() < 1e-3);
        assert!((min.point[1] + 2.0).abs() < 1e-3);
        assert!(min.value < 1e-6);
    }

    #[test]
    fn stops_at_the_iteration_cap() {
        let run = PipelineRun::detached(Stage::Smooth);
        let start = vec![[10.0, 10.0], [11.0, 10.0], [10.0, 11.0]];
        let min = minimize(start, bowl, 3, 0.0, &run).unwrap();
        assert_eq!(min.iterations, 3);
    }

    #[test]
    fn flat_cost_stalls_out() {
        let run = PipelineRun::detached(Stage::Smooth);
        let start = vec![[0.0], [1.0]];
        let min = minimize(start, |_| 1.0, 1000, 1e-6, &run).unwrap();
        assert_eq!(min.iterations, STALL_LIMIT);
    }

    #[test]
    fn wrong_vertex_count_is_rejected() {
        let run = PipelineRun::detached(Stage::Smooth);
        let err = minimize(vec![[0.0, 0.0]], bowl, 10, 1e-6, &run).unwrap_err();
        assert!(matches!(err, TraceError::Invariant(_)));
    }

    #[test]
    fn cancellation_aborts_the_search() {
        let run = PipelineRun::detached(Stage::Smooth);
        run.cancel_token().cancel();
        let start = vec![[0.0, 0.0], [0.5, 0.0], [0.0, 0.5]];
        assert!(matches!(minimize(start, bowl, 10, 1e-6, &run), Err(TraceError::Cancelled)));
    }
}
