//! The sampler contract and a single-chain driver.
//!
//! Every sampler in this crate follows the same two-call protocol: [`Sampler::init`] turns a
//! position into the initial chain state, and [`Sampler::step`] consumes a state together with a
//! PRNG key and returns the next state and a diagnostics record. [`run_chain`] and
//! [`run_chain_progress`] drive that protocol for a fixed number of iterations.

use crate::error::Error;
use crate::random::PrngKey;
use crate::stats::{ChainSummary, ChainTracker};
use burn::prelude::*;
use burn::tensor::cast::ToElement;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;

/// Size of the sliding acceptance window shown while sampling.
const ACCEPT_WINDOW: usize = 100;

/// A chain state that exposes its current position.
pub trait ChainState<B: Backend> {
    fn position(&self) -> &Tensor<B, 1>;
}

/// Per-transition diagnostics shared by all kernels.
pub trait TransitionInfo<B: Backend> {
    fn acceptance_prob(&self) -> &Tensor<B, 1>;
    fn is_accepted(&self) -> &Tensor<B, 1, Bool>;
    /// Kernels without a notion of divergence report `None`.
    fn is_divergent(&self) -> Option<&Tensor<B, 1, Bool>> {
        None
    }
}

/// An MCMC transition kernel bound to its target and configuration.
pub trait Sampler<B: Backend> {
    type State: ChainState<B>;
    type Info: TransitionInfo<B>;

    /// Builds the initial chain state at `position`.
    fn init(&self, position: Tensor<B, 1>) -> Self::State;

    /// Performs one transition. The incoming state is consumed.
    fn step(&self, key: PrngKey, state: Self::State) -> (Self::State, Self::Info);
}

/// The outcome of [`run_chain`].
pub struct Chain<B: Backend, S> {
    /// Kept positions, shape `[n_collect, dim]`.
    pub draws: Tensor<B, 2>,
    pub summary: ChainSummary,
    /// The state after the last transition, so the chain can be continued.
    pub state: S,
}

/// Runs one chain for `n_discard` burn-in steps, then `n_collect` kept steps.
///
/// `key` is split once per transition, so the whole run is a deterministic function of `key`.
pub fn run_chain<B, S>(
    sampler: &S,
    key: PrngKey,
    position: Tensor<B, 1>,
    n_collect: usize,
    n_discard: usize,
) -> Result<Chain<B, S::State>, Error>
where
    B: Backend,
    S: Sampler<B>,
{
    drive(sampler, key, position, n_collect, n_discard, None)
}

/// [`run_chain`] with a progress bar reporting the recent acceptance rate.
pub fn run_chain_progress<B, S>(
    sampler: &S,
    key: PrngKey,
    position: Tensor<B, 1>,
    n_collect: usize,
    n_discard: usize,
) -> Result<Chain<B, S::State>, Error>
where
    B: Backend,
    S: Sampler<B>,
{
    let pb = ProgressBar::new(n_collect as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_prefix("MCMC");
    let chain = drive(sampler, key, position, n_collect, n_discard, Some(&pb))?;
    pb.finish_with_message("Done!");
    Ok(chain)
}

fn drive<B, S>(
    sampler: &S,
    key: PrngKey,
    position: Tensor<B, 1>,
    n_collect: usize,
    n_discard: usize,
    progress: Option<&ProgressBar>,
) -> Result<Chain<B, S::State>, Error>
where
    B: Backend,
    S: Sampler<B>,
{
    let dim = position.dims()[0];
    let device = position.device();
    let mut key = key;
    let mut state = sampler.init(position);

    for _ in 0..n_discard {
        let [next_key, step_key] = key.split();
        key = next_key;
        (state, _) = sampler.step(step_key, state);
    }

    let mut tracker = ChainTracker::new(ACCEPT_WINDOW);
    let mut draws = Vec::with_capacity(n_collect);
    for _ in 0..n_collect {
        let [next_key, step_key] = key.split();
        key = next_key;
        let (next_state, info) = sampler.step(step_key, state);
        state = next_state;

        tracker.step(
            info.acceptance_prob().clone().into_scalar().to_f64(),
            read_flag(info.is_accepted()),
            info.is_divergent().is_some_and(read_flag),
        );
        draws.push(state.position().clone());

        if let Some(pb) = progress {
            pb.inc(1);
            pb.set_message(format!(
                "p(accept)≈{:.2} divergent={}",
                tracker.windowed_acceptance(),
                tracker.num_divergent()
            ));
        }
    }

    let draws = if draws.is_empty() {
        Tensor::<B, 2>::empty([0, dim], &device)
    } else {
        Tensor::<B, 1>::stack::<2>(draws, 0)
    };
    let values = draws
        .to_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| Error::TensorData(format!("{e:?}")))?;
    let draws_array = Array2::from_shape_vec((n_collect, dim), values)?;
    let summary = ChainSummary::new(draws_array.view(), &tracker);

    log::info!("chain finished: {summary}");
    if summary.num_divergent > 0 {
        log::warn!(
            "{} of {} kept transitions were divergent",
            summary.num_divergent,
            summary.n_draws
        );
    }

    Ok(Chain {
        draws,
        summary,
        state,
    })
}

fn read_flag<B: Backend>(flag: &Tensor<B, 1, Bool>) -> bool {
    flag.clone().int().into_scalar().to_i64() != 0
}
