//! Hamiltonian Monte Carlo.
//!
//! The HMC kernel proposes a new position by sampling a momentum from the metric, integrating
//! Hamiltonian dynamics with the leapfrog integrator for a fixed number of steps, and then
//! accepting or rejecting the endpoint with a Metropolis test on the change in total energy.
//! The accept/reject step is a branchless tensor select, so a rejected or divergent proposal
//! never interrupts the chain.
//!
//! Samplers are assembled with the persistent [`HMCBuilder`]:
//!
//! ```rust
//! use burn::backend::{Autodiff, NdArray};
//! use burn::prelude::*;
//! use mcmc_kernels::{hmc, IsotropicGaussian, PrngKey, Sampler, TransitionInfo};
//!
//! type B = Autodiff<NdArray<f64>>;
//! let device = Default::default();
//!
//! let sampler = hmc::<B, _>(IsotropicGaussian::standard())
//!     .step_size(0.1)
//!     .num_integration_steps(10)
//!     .inverse_mass_matrix(Tensor::ones([2], &device))
//!     .build()
//!     .unwrap();
//!
//! let mut state = sampler.init(Tensor::zeros([2], &device));
//! let mut key = PrngKey::new(42);
//! for _ in 0..10 {
//!     let [next_key, step_key] = key.split();
//!     key = next_key;
//!     let (next_state, info) = sampler.step(step_key, state);
//!     let p: f64 = info.acceptance_prob().clone().into_scalar();
//!     assert!((0.0..=1.0).contains(&p));
//!     state = next_state;
//! }
//! ```

use crate::core::{ChainState, Sampler, TransitionInfo};
use crate::distributions::LogDensity;
use crate::error::ConfigError;
use crate::integrator::{IntegratorState, VelocityVerlet};
use crate::metric::EuclideanMetric;
use crate::random::PrngKey;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Energy increase above which a transition is flagged as divergent.
pub const DEFAULT_DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// HMC chain state: the position with its cached log-density and gradient.
///
/// A state is consumed by [`Sampler::step`]; only the returned state may be used afterwards.
///
/// ```compile_fail
/// use burn::backend::{Autodiff, NdArray};
/// use burn::prelude::*;
/// use mcmc_kernels::{hmc, IsotropicGaussian, PrngKey, Sampler};
///
/// type B = Autodiff<NdArray<f64>>;
/// let device = Default::default();
/// let sampler = hmc::<B, _>(IsotropicGaussian::standard())
///     .step_size(0.1)
///     .num_integration_steps(10)
///     .inverse_mass_matrix(Tensor::ones([2], &device))
///     .build()
///     .unwrap();
/// let state = sampler.init(Tensor::zeros([2], &device));
/// let (_next, _info) = sampler.step(PrngKey::new(0), state);
/// let _again = sampler.step(PrngKey::new(1), state);
/// ```
#[derive(Debug, Clone)]
pub struct HMCState<B: Backend> {
    pub position: Tensor<B, 1>,
    pub logdensity: Tensor<B, 1>,
    pub logdensity_grad: Tensor<B, 1>,
}

/// Diagnostics of one HMC transition.
#[derive(Debug, Clone)]
pub struct HMCInfo<B: Backend> {
    /// The momentum drawn at the start of the transition.
    pub momentum: Tensor<B, 1>,
    pub acceptance_prob: Tensor<B, 1>,
    pub is_accepted: Tensor<B, 1, Bool>,
    pub is_divergent: Tensor<B, 1, Bool>,
    /// Total energy `H = -log π(q) + K(p)` at the end of the trajectory.
    pub energy: Tensor<B, 1>,
    pub num_integration_steps: usize,
}

impl<B: AutodiffBackend> HMCState<B> {
    fn lower(self) -> HMCState<B::InnerBackend> {
        HMCState {
            position: self.position.inner(),
            logdensity: self.logdensity.inner(),
            logdensity_grad: self.logdensity_grad.inner(),
        }
    }

    fn lift(state: HMCState<B::InnerBackend>) -> Self {
        Self {
            position: Tensor::from_inner(state.position),
            logdensity: Tensor::from_inner(state.logdensity),
            logdensity_grad: Tensor::from_inner(state.logdensity_grad),
        }
    }
}

impl<B: AutodiffBackend> HMCInfo<B> {
    fn lift(info: HMCInfo<B::InnerBackend>) -> Self {
        Self {
            momentum: Tensor::from_inner(info.momentum),
            acceptance_prob: Tensor::from_inner(info.acceptance_prob),
            is_accepted: Tensor::from_inner(info.is_accepted),
            is_divergent: Tensor::from_inner(info.is_divergent),
            energy: Tensor::from_inner(info.energy),
            num_integration_steps: info.num_integration_steps,
        }
    }
}

impl<B: Backend> ChainState<B> for HMCState<B> {
    fn position(&self) -> &Tensor<B, 1> {
        &self.position
    }
}

impl<B: Backend> TransitionInfo<B> for HMCInfo<B> {
    fn acceptance_prob(&self) -> &Tensor<B, 1> {
        &self.acceptance_prob
    }

    fn is_accepted(&self) -> &Tensor<B, 1, Bool> {
        &self.is_accepted
    }

    fn is_divergent(&self) -> Option<&Tensor<B, 1, Bool>> {
        Some(&self.is_divergent)
    }
}

/// One Metropolis-corrected HMC transition with a fixed trajectory length.
pub struct HMCKernel<K: Backend> {
    metric: EuclideanMetric<K>,
    integrator: VelocityVerlet<K>,
    step_size: f64,
    num_integration_steps: usize,
    divergence_threshold: f64,
}

impl<K: Backend> HMCKernel<K> {
    pub fn new(
        metric: EuclideanMetric<K>,
        integrator: VelocityVerlet<K>,
        step_size: f64,
        num_integration_steps: usize,
        divergence_threshold: f64,
    ) -> Self {
        Self {
            metric,
            integrator,
            step_size,
            num_integration_steps,
            divergence_threshold,
        }
    }

    pub fn dim(&self) -> usize {
        self.metric.dim()
    }

    /// # Panics
    ///
    /// Panics if `position` and the inverse mass matrix differ in length.
    pub fn init(&self, position: Tensor<K, 1>) -> HMCState<K> {
        assert_eq!(
            position.dims()[0],
            self.metric.dim(),
            "position and inverse_mass_matrix must have the same length"
        );
        let position = position.detach();
        let (logdensity, logdensity_grad) = self.integrator.logdensity_and_grad(position.clone());
        HMCState {
            position,
            logdensity,
            logdensity_grad,
        }
    }

    pub fn step(&self, key: PrngKey, state: HMCState<K>) -> (HMCState<K>, HMCInfo<K>) {
        let [key_momentum, key_accept] = key.split();
        let HMCState {
            position,
            logdensity,
            logdensity_grad,
        } = state;
        let dims = position.dims();
        let device = position.device();

        let momentum = self.metric.sample_momentum(key_momentum, &position);
        let initial_energy = self
            .metric
            .kinetic_energy(momentum.clone())
            .sub(logdensity.clone());

        let mut proposal = IntegratorState {
            position: position.clone(),
            momentum: momentum.clone(),
            logdensity: logdensity.clone(),
            logdensity_grad: logdensity_grad.clone(),
        };
        for _ in 0..self.num_integration_steps {
            proposal = self.integrator.step(proposal, self.step_size);
        }

        let proposal_energy = self
            .metric
            .kinetic_energy(proposal.momentum)
            .sub(proposal.logdensity.clone());
        let delta_energy = proposal_energy.clone().sub(initial_energy);
        // A NaN energy change must reject, never accept.
        let delta_energy = delta_energy
            .clone()
            .mask_fill(delta_energy.is_nan(), f64::INFINITY);
        let is_divergent = delta_energy
            .clone()
            .greater_elem(self.divergence_threshold);
        let acceptance_prob = delta_energy.neg().exp().clamp_max(1.0);

        let u = key_accept.uniform::<K, 1>([1], &device);
        let is_accepted = u.lower(acceptance_prob.clone());
        let accept_mask = is_accepted.clone().expand(dims);

        let new_state = HMCState {
            position: position.mask_where(accept_mask.clone(), proposal.position),
            logdensity: logdensity.mask_where(is_accepted.clone(), proposal.logdensity),
            logdensity_grad: logdensity_grad.mask_where(accept_mask, proposal.logdensity_grad),
        };
        let info = HMCInfo {
            momentum,
            acceptance_prob,
            is_accepted,
            is_divergent,
            energy: proposal_energy,
            num_integration_steps: self.num_integration_steps,
        };
        (new_state, info)
    }
}

impl<B: AutodiffBackend> HMCKernel<B> {
    fn lower(self) -> HMCKernel<B::InnerBackend> {
        HMCKernel {
            metric: self.metric.lower(),
            integrator: self.integrator.lower(),
            step_size: self.step_size,
            num_integration_steps: self.num_integration_steps,
            divergence_threshold: self.divergence_threshold,
        }
    }
}

/// Options for evaluating the log-density and its gradient in a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueAndGrad {
    /// Run the kernel on the tape-free inner backend; only gradients go through autodiff.
    pub jit: bool,
}

/// Persistent configuration for an [`HMCSampler`]. Every setter returns a new builder.
#[derive(Debug, Clone)]
pub struct HMCBuilder<B: AutodiffBackend, T> {
    target: T,
    step_size: Option<f64>,
    num_integration_steps: Option<usize>,
    inverse_mass_matrix: Option<Tensor<B, 1>>,
    divergence_threshold: f64,
    value_and_grad: Option<ValueAndGrad>,
}

/// Starts configuring an HMC sampler for `target`.
pub fn hmc<B: AutodiffBackend, T: LogDensity>(target: T) -> HMCBuilder<B, T> {
    HMCBuilder {
        target,
        step_size: None,
        num_integration_steps: None,
        inverse_mass_matrix: None,
        divergence_threshold: DEFAULT_DIVERGENCE_THRESHOLD,
        value_and_grad: None,
    }
}

impl<B, T> HMCBuilder<B, T>
where
    B: AutodiffBackend,
    T: LogDensity + Clone + 'static,
{
    pub fn step_size(&self, step_size: f64) -> Self {
        Self {
            step_size: Some(step_size),
            ..self.clone()
        }
    }

    pub fn num_integration_steps(&self, num_integration_steps: usize) -> Self {
        Self {
            num_integration_steps: Some(num_integration_steps),
            ..self.clone()
        }
    }

    /// Diagonal of `M⁻¹`. Its length fixes the dimension of the sampler.
    pub fn inverse_mass_matrix(&self, inverse_mass_matrix: Tensor<B, 1>) -> Self {
        Self {
            inverse_mass_matrix: Some(inverse_mass_matrix),
            ..self.clone()
        }
    }

    pub fn divergence_threshold(&self, divergence_threshold: f64) -> Self {
        Self {
            divergence_threshold,
            ..self.clone()
        }
    }

    /// Evaluates the log-density and its gradient with one forward/backward pass.
    pub fn value_and_grad(&self, options: ValueAndGrad) -> Self {
        Self {
            value_and_grad: Some(options),
            ..self.clone()
        }
    }

    pub fn build(&self) -> Result<HMCSampler<B>, ConfigError> {
        let step_size = self.step_size.ok_or(ConfigError::MissingStepSize)?;
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(ConfigError::InvalidStepSize(step_size));
        }
        let num_integration_steps = self
            .num_integration_steps
            .ok_or(ConfigError::MissingNumIntegrationSteps)?;
        if num_integration_steps == 0 {
            return Err(ConfigError::InvalidNumIntegrationSteps);
        }
        let inverse_mass_matrix = self
            .inverse_mass_matrix
            .clone()
            .ok_or(ConfigError::MissingInverseMassMatrix)?;
        check_inverse_mass_matrix(&inverse_mass_matrix)?;
        if self.divergence_threshold.is_nan() {
            return Err(ConfigError::InvalidDivergenceThreshold(
                self.divergence_threshold,
            ));
        }

        let metric = EuclideanMetric::new(inverse_mass_matrix);
        let target = self.target.clone();
        let integrator = VelocityVerlet::new(
            move |position: Tensor<B, 1>| target.logdensity(position),
            metric.kinetic_energy_grad_fn(),
            self.value_and_grad.is_some(),
        );
        log::debug!(
            "building HMC sampler: dim={}, step_size={}, num_integration_steps={}, divergence_threshold={}, value_and_grad={:?}",
            metric.dim(),
            step_size,
            num_integration_steps,
            self.divergence_threshold,
            self.value_and_grad
        );

        let kernel = HMCKernel::new(
            metric,
            integrator,
            step_size,
            num_integration_steps,
            self.divergence_threshold,
        );
        let execution = match self.value_and_grad {
            Some(ValueAndGrad { jit: true }) => Execution::Lowered(kernel.lower()),
            _ => Execution::Eager(kernel),
        };
        Ok(HMCSampler { execution })
    }
}

fn check_inverse_mass_matrix<B: Backend>(
    inverse_mass_matrix: &Tensor<B, 1>,
) -> Result<(), ConfigError> {
    let values = inverse_mass_matrix
        .to_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| ConfigError::InvalidInverseMassMatrix(format!("{e:?}")))?;
    if values.is_empty() {
        return Err(ConfigError::InvalidInverseMassMatrix(
            "must not be empty".to_string(),
        ));
    }
    match values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        Some(v) => Err(ConfigError::InvalidInverseMassMatrix(format!(
            "entry {v} is not positive and finite"
        ))),
        None => Ok(()),
    }
}

enum Execution<B: AutodiffBackend> {
    Eager(HMCKernel<B>),
    Lowered(HMCKernel<B::InnerBackend>),
}

/// A configured HMC sampler.
pub struct HMCSampler<B: AutodiffBackend> {
    execution: Execution<B>,
}

impl<B: AutodiffBackend> HMCSampler<B> {
    /// Length of the positions this sampler accepts.
    pub fn dim(&self) -> usize {
        match &self.execution {
            Execution::Eager(kernel) => kernel.dim(),
            Execution::Lowered(kernel) => kernel.dim(),
        }
    }

    /// [`Sampler::init`], returning an error instead of panicking on a length mismatch.
    pub fn try_init(&self, position: Tensor<B, 1>) -> Result<HMCState<B>, ConfigError> {
        let expected = self.dim();
        let found = position.dims()[0];
        if found != expected {
            return Err(ConfigError::DimensionMismatch { expected, found });
        }
        Ok(self.init(position))
    }
}

impl<B: AutodiffBackend> Sampler<B> for HMCSampler<B> {
    type State = HMCState<B>;
    type Info = HMCInfo<B>;

    fn init(&self, position: Tensor<B, 1>) -> HMCState<B> {
        match &self.execution {
            Execution::Eager(kernel) => kernel.init(position),
            Execution::Lowered(kernel) => HMCState::lift(kernel.init(position.inner())),
        }
    }

    fn step(&self, key: PrngKey, state: HMCState<B>) -> (HMCState<B>, HMCInfo<B>) {
        match &self.execution {
            Execution::Eager(kernel) => kernel.step(key, state),
            Execution::Lowered(kernel) => {
                let (state, info) = kernel.step(key, state.lower());
                (HMCState::lift(state), HMCInfo::lift(info))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{IsotropicGaussian, Rosenbrock2D};
    use approx::assert_abs_diff_eq;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::cast::ToElement;
    use std::cell::Cell;
    use std::rc::Rc;

    type BackendType = Autodiff<NdArray<f64>>;

    fn values<K: Backend>(t: Tensor<K, 1>) -> Vec<f64> {
        t.into_data().convert::<f64>().to_vec::<f64>().unwrap()
    }

    fn scalar<K: Backend>(t: &Tensor<K, 1>) -> f64 {
        t.clone().into_scalar().to_f64()
    }

    fn flag<K: Backend>(t: &Tensor<K, 1, Bool>) -> bool {
        t.clone().int().into_scalar().to_i64() != 0
    }

    fn ones(dim: usize) -> Tensor<BackendType, 1> {
        Tensor::ones([dim], &Default::default())
    }

    fn standard_normal(dim: usize) -> HMCBuilder<BackendType, IsotropicGaussian> {
        hmc(IsotropicGaussian::standard()).inverse_mass_matrix(ones(dim))
    }

    #[test]
    fn setters_return_new_builders() {
        let base = standard_normal(1);
        let a = base.step_size(0.1);
        let b = base.step_size(0.2);
        assert_eq!(base.step_size, None);
        assert_eq!(a.step_size, Some(0.1));
        assert_eq!(b.step_size, Some(0.2));

        let c = a.num_integration_steps(5).divergence_threshold(10.0);
        assert_eq!(a.num_integration_steps, None);
        assert_eq!(a.divergence_threshold, DEFAULT_DIVERGENCE_THRESHOLD);
        assert_eq!(c.num_integration_steps, Some(5));
        assert_eq!(c.divergence_threshold, 10.0);

        let d = c.value_and_grad(ValueAndGrad { jit: true });
        assert_eq!(c.value_and_grad, None);
        assert_eq!(d.value_and_grad, Some(ValueAndGrad { jit: true }));
    }

    #[test]
    fn build_requires_parameters() {
        let target = IsotropicGaussian::standard();
        assert_eq!(
            hmc::<BackendType, _>(target).build().err(),
            Some(ConfigError::MissingStepSize)
        );
        assert_eq!(
            hmc::<BackendType, _>(target).step_size(0.1).build().err(),
            Some(ConfigError::MissingNumIntegrationSteps)
        );
        assert_eq!(
            hmc::<BackendType, _>(target)
                .step_size(0.1)
                .num_integration_steps(3)
                .build()
                .err(),
            Some(ConfigError::MissingInverseMassMatrix)
        );
        assert!(standard_normal(2)
            .step_size(0.1)
            .num_integration_steps(3)
            .build()
            .is_ok());
    }

    #[test]
    fn build_rejects_invalid_parameters() {
        let builder = standard_normal(2).step_size(0.1).num_integration_steps(3);
        assert_eq!(
            builder.step_size(0.0).build().err(),
            Some(ConfigError::InvalidStepSize(0.0))
        );
        assert_eq!(
            builder.num_integration_steps(0).build().err(),
            Some(ConfigError::InvalidNumIntegrationSteps)
        );
        assert!(matches!(
            builder.divergence_threshold(f64::NAN).build().err(),
            Some(ConfigError::InvalidDivergenceThreshold(_))
        ));
        let bad_imm = Tensor::<BackendType, 1>::from_floats([1.0, -1.0], &Default::default());
        assert!(matches!(
            builder.inverse_mass_matrix(bad_imm).build().err(),
            Some(ConfigError::InvalidInverseMassMatrix(_))
        ));
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn init_rejects_dimension_mismatch() {
        let sampler = standard_normal(3)
            .step_size(0.1)
            .num_integration_steps(3)
            .build()
            .unwrap();
        sampler.init(Tensor::zeros([2], &Default::default()));
    }

    #[test]
    fn try_init_reports_dimension_mismatch() {
        let sampler = standard_normal(3)
            .step_size(0.1)
            .num_integration_steps(3)
            .build()
            .unwrap();
        assert_eq!(sampler.dim(), 3);
        assert_eq!(
            sampler
                .try_init(Tensor::zeros([2], &Default::default()))
                .err(),
            Some(ConfigError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        );
        let state = sampler
            .try_init(Tensor::zeros([3], &Default::default()))
            .unwrap();
        assert_eq!(state.position.dims(), [3]);
    }

    #[test]
    fn init_caches_logdensity_and_grad() {
        let sampler = standard_normal(2)
            .step_size(0.1)
            .num_integration_steps(3)
            .build()
            .unwrap();
        let state = sampler.init(Tensor::from_floats([1.0, -2.0], &Default::default()));
        assert_abs_diff_eq!(scalar(&state.logdensity), -2.5, epsilon = 1e-12);
        assert_eq!(values(state.logdensity_grad), vec![-1.0, 2.0]);
    }

    #[test]
    fn step_outputs_are_fresh_over_many_steps() {
        let sampler = standard_normal(3)
            .step_size(0.2)
            .num_integration_steps(5)
            .build()
            .unwrap();
        let mut state = sampler.init(Tensor::zeros([3], &Default::default()));
        let mut key = PrngKey::new(1);
        for _ in 0..60 {
            let [next_key, step_key] = key.split();
            key = next_key;
            let (next_state, info) = sampler.step(step_key, state);
            for t in [
                &next_state.position,
                &next_state.logdensity,
                &next_state.logdensity_grad,
                &info.momentum,
                &info.acceptance_prob,
                &info.energy,
            ] {
                assert!(!t.is_require_grad());
            }
            assert_eq!(next_state.position.dims(), [3]);
            assert_eq!(info.num_integration_steps, 5);
            state = next_state;
        }
        assert!(values(state.position).iter().all(|x| x.is_finite()));
    }

    #[test]
    fn large_steps_diverge_and_reject() {
        let sampler = hmc::<BackendType, _>(IsotropicGaussian::new(0.1))
            .step_size(1.0)
            .num_integration_steps(100)
            .inverse_mass_matrix(ones(1))
            .divergence_threshold(1000.0)
            .build()
            .unwrap();
        let state = sampler.init(Tensor::from_floats([1.0], &Default::default()));
        let (state, info) = sampler.step(PrngKey::new(0), state);
        assert!(flag(&info.is_divergent));
        assert!(!flag(&info.is_accepted));
        assert_eq!(scalar(&info.acceptance_prob), 0.0);
        assert_eq!(scalar(&state.position), 1.0);
        assert_abs_diff_eq!(scalar(&state.logdensity), -50.0, epsilon = 1e-12);
    }

    #[derive(Clone, Copy)]
    struct HalfLine;

    // log π and its gradient are NaN on the negative half-line.
    impl LogDensity for HalfLine {
        fn logdensity<K: Backend>(&self, position: Tensor<K, 1>) -> Tensor<K, 1> {
            position.clone().sqrt().sum().sub(position.sum())
        }
    }

    #[test]
    fn nan_energy_rejects() {
        let builder = hmc::<BackendType, _>(HalfLine)
            .step_size(0.5)
            .num_integration_steps(5)
            .inverse_mass_matrix(ones(1));
        for sampler in [
            builder.build().unwrap(),
            builder.value_and_grad(ValueAndGrad { jit: true }).build().unwrap(),
        ] {
            let mut state = sampler.init(Tensor::from_floats([0.5], &Default::default()));
            let mut key = PrngKey::new(17);
            let mut num_nan = 0;
            for _ in 0..100 {
                let [next_key, step_key] = key.split();
                key = next_key;
                let (next_state, info) = sampler.step(step_key, state);
                if scalar(&info.energy).is_nan() {
                    num_nan += 1;
                    assert_eq!(scalar(&info.acceptance_prob), 0.0);
                    assert!(!flag(&info.is_accepted));
                    assert!(flag(&info.is_divergent));
                }
                let q = scalar(&next_state.position);
                assert!(q.is_finite() && q >= 0.0, "position = {q}");
                assert!(scalar(&next_state.logdensity).is_finite());
                state = next_state;
            }
            assert!(num_nan > 0);
        }
    }

    #[test]
    fn small_steps_never_diverge() {
        let sampler = standard_normal(1)
            .step_size(0.01)
            .num_integration_steps(20)
            .build()
            .unwrap();
        let mut state = sampler.init(Tensor::zeros([1], &Default::default()));
        let mut key = PrngKey::new(9);
        for _ in 0..30 {
            let [next_key, step_key] = key.split();
            key = next_key;
            let (next_state, info) = sampler.step(step_key, state);
            assert!(!flag(&info.is_divergent));
            let p = scalar(&info.acceptance_prob);
            assert!((0.0..=1.0).contains(&p));
            state = next_state;
        }
    }

    #[test]
    fn execution_modes_agree() {
        let target = Rosenbrock2D { a: 1.0, b: 10.0 };
        let builder = hmc::<BackendType, _>(target)
            .step_size(0.02)
            .num_integration_steps(8)
            .inverse_mass_matrix(ones(2));
        let samplers = [
            builder.build().unwrap(),
            builder.value_and_grad(ValueAndGrad { jit: false }).build().unwrap(),
            builder.value_and_grad(ValueAndGrad { jit: true }).build().unwrap(),
        ];

        let runs: Vec<Vec<Vec<f64>>> = samplers
            .iter()
            .map(|sampler| {
                let mut state = sampler.init(Tensor::from_floats([0.5, 0.5], &Default::default()));
                let mut key = PrngKey::new(3);
                let mut trace = Vec::new();
                for _ in 0..5 {
                    let [next_key, step_key] = key.split();
                    key = next_key;
                    let (next_state, info) = sampler.step(step_key, state);
                    let mut row = values(next_state.position.clone());
                    row.push(scalar(&next_state.logdensity));
                    row.push(scalar(&info.acceptance_prob));
                    row.push(scalar(&info.energy));
                    trace.push(row);
                    state = next_state;
                }
                trace
            })
            .collect();

        for other in &runs[1..] {
            for (a, b) in runs[0].iter().flatten().zip(other.iter().flatten()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[derive(Clone)]
    struct Counting {
        calls: Rc<Cell<usize>>,
    }

    impl LogDensity for Counting {
        fn logdensity<K: Backend>(&self, position: Tensor<K, 1>) -> Tensor<K, 1> {
            self.calls.set(self.calls.get() + 1);
            IsotropicGaussian::standard().logdensity(position)
        }
    }

    #[test]
    fn fused_mode_evaluates_once_per_leapfrog_step() {
        for (fused, expected) in [(false, 2 + 2 * 5), (true, 1 + 5)] {
            let calls = Rc::new(Cell::new(0));
            let builder = hmc::<BackendType, _>(Counting {
                calls: calls.clone(),
            })
            .step_size(0.1)
            .num_integration_steps(5)
            .inverse_mass_matrix(ones(2));
            let builder = if fused {
                builder.value_and_grad(ValueAndGrad::default())
            } else {
                builder
            };
            let sampler = builder.build().unwrap();
            assert_eq!(calls.get(), 0);

            let state = sampler.init(Tensor::zeros([2], &Default::default()));
            let _ = sampler.step(PrngKey::new(0), state);
            assert_eq!(calls.get(), expected, "fused = {fused}");
        }
    }
}
