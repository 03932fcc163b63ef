//! Random-Walk Metropolis.
//!
//! Each transition proposes `q' = q + step_size · z` with `z ~ N(0, I)` and accepts it with
//! probability `min(1, π(q') / π(q))`. The Gaussian proposal is symmetric, so no proposal
//! correction enters the ratio.
//!
//! ```rust
//! use burn::backend::{Autodiff, NdArray};
//! use burn::prelude::*;
//! use mcmc_kernels::{rwm, IsotropicGaussian, PrngKey, Sampler};
//!
//! type B = Autodiff<NdArray<f64>>;
//!
//! let sampler = rwm::<B, _>(IsotropicGaussian::standard())
//!     .step_size(0.5)
//!     .build()
//!     .unwrap();
//! let state = sampler.init(Tensor::zeros([3], &Default::default()));
//! let (state, info) = sampler.step(PrngKey::new(0), state);
//! assert_eq!(info.proposed_position.dims(), [3]);
//! assert_eq!(state.position.dims(), [3]);
//! ```

use crate::core::{ChainState, Sampler, TransitionInfo};
use crate::distributions::LogDensity;
use crate::error::ConfigError;
use crate::random::PrngKey;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::marker::PhantomData;

/// RWM chain state.
#[derive(Debug, Clone)]
pub struct RWMState<B: Backend> {
    pub position: Tensor<B, 1>,
    pub logdensity: Tensor<B, 1>,
}

/// Diagnostics of one RWM transition.
#[derive(Debug, Clone)]
pub struct RWMInfo<B: Backend> {
    pub acceptance_prob: Tensor<B, 1>,
    pub is_accepted: Tensor<B, 1, Bool>,
    /// The proposal, reported whether or not it was accepted.
    pub proposed_position: Tensor<B, 1>,
}

impl<B: AutodiffBackend> RWMState<B> {
    fn lower(self) -> RWMState<B::InnerBackend> {
        RWMState {
            position: self.position.inner(),
            logdensity: self.logdensity.inner(),
        }
    }

    fn lift(state: RWMState<B::InnerBackend>) -> Self {
        Self {
            position: Tensor::from_inner(state.position),
            logdensity: Tensor::from_inner(state.logdensity),
        }
    }
}

impl<B: AutodiffBackend> RWMInfo<B> {
    fn lift(info: RWMInfo<B::InnerBackend>) -> Self {
        Self {
            acceptance_prob: Tensor::from_inner(info.acceptance_prob),
            is_accepted: Tensor::from_inner(info.is_accepted),
            proposed_position: Tensor::from_inner(info.proposed_position),
        }
    }
}

impl<B: Backend> ChainState<B> for RWMState<B> {
    fn position(&self) -> &Tensor<B, 1> {
        &self.position
    }
}

impl<B: Backend> TransitionInfo<B> for RWMInfo<B> {
    fn acceptance_prob(&self) -> &Tensor<B, 1> {
        &self.acceptance_prob
    }

    fn is_accepted(&self) -> &Tensor<B, 1, Bool> {
        &self.is_accepted
    }
}

/// The RWM transition. It never differentiates, so it runs on any backend.
#[derive(Debug, Clone)]
pub struct RWMKernel<T> {
    target: T,
    step_size: f64,
}

impl<T: LogDensity> RWMKernel<T> {
    pub fn new(target: T, step_size: f64) -> Self {
        Self { target, step_size }
    }

    pub fn init<K: Backend>(&self, position: Tensor<K, 1>) -> RWMState<K> {
        let position = position.detach();
        let logdensity = self.target.logdensity(position.clone()).detach();
        RWMState {
            position,
            logdensity,
        }
    }

    pub fn step<K: Backend>(&self, key: PrngKey, state: RWMState<K>) -> (RWMState<K>, RWMInfo<K>) {
        let [key_proposal, key_accept] = key.split();
        let RWMState {
            position,
            logdensity,
        } = state;
        let dims = position.dims();
        let device = position.device();

        let noise = key_proposal.normal::<K, 1>(dims, &device);
        let proposed_position = position.clone().add(noise.mul_scalar(self.step_size));
        let proposed_logdensity = self
            .target
            .logdensity(proposed_position.clone())
            .detach();

        let log_ratio = proposed_logdensity.clone().sub(logdensity.clone());
        let log_ratio = log_ratio
            .clone()
            .mask_fill(log_ratio.is_nan(), f64::NEG_INFINITY);
        let acceptance_prob = log_ratio.exp().clamp_max(1.0);

        let u = key_accept.uniform::<K, 1>([1], &device);
        let is_accepted = u.lower(acceptance_prob.clone());
        let accept_mask = is_accepted.clone().expand(dims);

        let new_state = RWMState {
            position: position.mask_where(accept_mask, proposed_position.clone()),
            logdensity: logdensity.mask_where(is_accepted.clone(), proposed_logdensity),
        };
        let info = RWMInfo {
            acceptance_prob,
            is_accepted,
            proposed_position,
        };
        (new_state, info)
    }
}

/// Persistent configuration for an [`RWMSampler`]. Every setter returns a new builder.
#[derive(Debug, Clone)]
pub struct RWMBuilder<B: AutodiffBackend, T> {
    target: T,
    step_size: Option<f64>,
    jit_step: bool,
    _backend: PhantomData<B>,
}

/// Starts configuring an RWM sampler for `target`.
pub fn rwm<B: AutodiffBackend, T: LogDensity>(target: T) -> RWMBuilder<B, T> {
    RWMBuilder {
        target,
        step_size: None,
        jit_step: true,
        _backend: PhantomData,
    }
}

impl<B, T> RWMBuilder<B, T>
where
    B: AutodiffBackend,
    T: LogDensity + Clone,
{
    pub fn step_size(&self, step_size: f64) -> Self {
        Self {
            step_size: Some(step_size),
            ..self.clone()
        }
    }

    /// Runs the whole step on the tape-free inner backend. On by default.
    pub fn jit_step(&self, jit_step: bool) -> Self {
        Self {
            jit_step,
            ..self.clone()
        }
    }

    pub fn build(&self) -> Result<RWMSampler<B, T>, ConfigError> {
        let step_size = self.step_size.ok_or(ConfigError::MissingStepSize)?;
        if !(step_size.is_finite() && step_size >= 0.0) {
            return Err(ConfigError::InvalidStepSize(step_size));
        }
        log::debug!(
            "building RWM sampler: step_size={}, jit_step={}",
            step_size,
            self.jit_step
        );
        Ok(RWMSampler {
            kernel: RWMKernel::new(self.target.clone(), step_size),
            jit_step: self.jit_step,
            _backend: PhantomData,
        })
    }
}

/// A configured RWM sampler.
#[derive(Debug, Clone)]
pub struct RWMSampler<B: AutodiffBackend, T> {
    kernel: RWMKernel<T>,
    jit_step: bool,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend, T: LogDensity> Sampler<B> for RWMSampler<B, T> {
    type State = RWMState<B>;
    type Info = RWMInfo<B>;

    fn init(&self, position: Tensor<B, 1>) -> RWMState<B> {
        if self.jit_step {
            RWMState::lift(self.kernel.init(position.inner()))
        } else {
            self.kernel.init(position)
        }
    }

    fn step(&self, key: PrngKey, state: RWMState<B>) -> (RWMState<B>, RWMInfo<B>) {
        if self.jit_step {
            let (state, info) = self.kernel.step(key, state.lower());
            (RWMState::lift(state), RWMInfo::lift(info))
        } else {
            self.kernel.step(key, state)
        }
    }
}
