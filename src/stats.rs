//! Running transition statistics and post-run chain summaries.

use ndarray::prelude::*;
use std::collections::VecDeque;
use std::fmt;

/// Tracks acceptance and divergence over the kept part of a chain.
///
/// Besides the totals, the tracker keeps a sliding window of the most recent acceptance
/// indicators, which is what the progress bar reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n: u64,
    n_accepted: u64,
    n_divergent: u64,
    sum_acceptance_prob: f64,
    window_size: usize,
    accept_window: VecDeque<bool>,
}

impl ChainTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            n: 0,
            n_accepted: 0,
            n_divergent: 0,
            sum_acceptance_prob: 0.0,
            window_size,
            accept_window: VecDeque::with_capacity(window_size),
        }
    }

    pub fn step(&mut self, acceptance_prob: f64, accepted: bool, divergent: bool) {
        self.n += 1;
        self.n_accepted += accepted as u64;
        self.n_divergent += divergent as u64;
        self.sum_acceptance_prob += acceptance_prob;

        self.accept_window.push_back(accepted);
        if self.accept_window.len() > self.window_size {
            self.accept_window.pop_front();
        }
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn num_divergent(&self) -> u64 {
        self.n_divergent
    }

    /// Fraction of accepted proposals over the whole run.
    pub fn acceptance_rate(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        self.n_accepted as f64 / self.n as f64
    }

    /// Average Metropolis acceptance probability over the whole run.
    pub fn mean_acceptance_prob(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        self.sum_acceptance_prob / self.n as f64
    }

    /// Acceptance rate over the sliding window.
    pub fn windowed_acceptance(&self) -> f64 {
        if self.accept_window.is_empty() {
            return f64::NAN;
        }
        let accepted = self.accept_window.iter().filter(|&&a| a).count();
        accepted as f64 / self.accept_window.len() as f64
    }
}

/// Summary of the kept draws of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSummary {
    pub n_draws: usize,
    /// Per-parameter sample mean.
    pub mean: Array1<f64>,
    /// Per-parameter sample variance (`ddof = 1`).
    pub variance: Array1<f64>,
    pub acceptance_rate: f64,
    pub mean_acceptance_prob: f64,
    pub num_divergent: u64,
}

impl ChainSummary {
    /// Summarizes `draws` of shape `[n_draws, dim]`. Moments are NaN when there are too few
    /// draws to define them.
    pub fn new(draws: ArrayView2<f64>, tracker: &ChainTracker) -> Self {
        let (n_draws, dim) = draws.dim();
        let mean = draws
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(dim, f64::NAN));
        let variance = if n_draws > 1 {
            draws.var_axis(Axis(0), 1.0)
        } else {
            Array1::from_elem(dim, f64::NAN)
        };
        Self {
            n_draws,
            mean,
            variance,
            acceptance_rate: tracker.acceptance_rate(),
            mean_acceptance_prob: tracker.mean_acceptance_prob(),
            num_divergent: tracker.num_divergent(),
        }
    }
}

impl fmt::Display for ChainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "draws={} p(accept)≈{:.3} accepted={:.3} divergent={} mean={:.3} var={:.3}",
            self.n_draws,
            self.mean_acceptance_prob,
            self.acceptance_rate,
            self.num_divergent,
            self.mean,
            self.variance
        )
    }
}
