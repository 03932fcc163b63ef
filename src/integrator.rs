//! Velocity Verlet (leapfrog) integrator for Hamiltonian dynamics.
//!
//! One call to [`VelocityVerlet::step`] performs a momentum half-step, a position full-step and
//! a second momentum half-step. The gradient closures it needs are built once in
//! [`VelocityVerlet::new`]; `step` only reuses them.

use crate::autodiff::{self, SharedTensorFn, TensorFn, ValueAndGradFn};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::rc::Rc;

/// Phase-space point plus the cached log-density and its gradient at `position`.
#[derive(Debug, Clone)]
pub struct IntegratorState<K: Backend> {
    pub position: Tensor<K, 1>,
    pub momentum: Tensor<K, 1>,
    pub logdensity: Tensor<K, 1>,
    pub logdensity_grad: Tensor<K, 1>,
}

pub struct VelocityVerlet<K: Backend> {
    logdensity_fn: TensorFn<K>,
    logdensity_grad_fn: TensorFn<K>,
    value_and_grad_fn: Option<ValueAndGradFn<K>>,
    kinetic_energy_grad_fn: SharedTensorFn<K>,
}

impl<B: AutodiffBackend> VelocityVerlet<B> {
    /// Builds the integrator and its log-density gradient closures. `∇K` is usually the
    /// metric's cached closure, see [`EuclideanMetric::kinetic_energy_grad_fn`].
    ///
    /// With `fused`, the log-density and its gradient come from one forward/backward pass;
    /// otherwise they are two separate evaluations.
    ///
    /// [`EuclideanMetric::kinetic_energy_grad_fn`]: crate::metric::EuclideanMetric::kinetic_energy_grad_fn
    pub fn new<L>(
        logdensity_fn: L,
        kinetic_energy_grad_fn: SharedTensorFn<B>,
        fused: bool,
    ) -> Self
    where
        L: Fn(Tensor<B, 1>) -> Tensor<B, 1> + Clone + 'static,
    {
        let value_and_grad_fn: Option<ValueAndGradFn<B>> = if fused {
            Some(Box::new(autodiff::value_and_grad(logdensity_fn.clone())))
        } else {
            None
        };
        Self {
            logdensity_grad_fn: Box::new(autodiff::grad(logdensity_fn.clone())),
            logdensity_fn: Box::new(move |x: Tensor<B, 1>| logdensity_fn(x.detach())),
            value_and_grad_fn,
            kinetic_energy_grad_fn,
        }
    }

    /// The same integrator on the tape-free inner backend. Closures are wrapped, not rebuilt.
    pub fn lower(self) -> VelocityVerlet<B::InnerBackend> {
        let value_and_grad_fn = self
            .value_and_grad_fn
            .map(|f| -> ValueAndGradFn<B::InnerBackend> {
                Box::new(autodiff::lower_pair::<B, _>(f))
            });
        let kinetic_energy_grad = self.kinetic_energy_grad_fn;
        VelocityVerlet {
            logdensity_fn: Box::new(autodiff::lower::<B, _>(self.logdensity_fn)),
            logdensity_grad_fn: Box::new(autodiff::lower::<B, _>(self.logdensity_grad_fn)),
            value_and_grad_fn,
            kinetic_energy_grad_fn: Rc::new(autodiff::lower::<B, _>(move |p: Tensor<B, 1>| {
                kinetic_energy_grad(p)
            })),
        }
    }
}

impl<K: Backend> VelocityVerlet<K> {
    pub fn is_fused(&self) -> bool {
        self.value_and_grad_fn.is_some()
    }

    /// `(log π(q), ∇log π(q))`, fused when configured.
    pub fn logdensity_and_grad(&self, position: Tensor<K, 1>) -> (Tensor<K, 1>, Tensor<K, 1>) {
        match &self.value_and_grad_fn {
            Some(value_and_grad) => value_and_grad(position),
            None => {
                let logdensity = (self.logdensity_fn)(position.clone());
                let logdensity_grad = (self.logdensity_grad_fn)(position);
                (logdensity, logdensity_grad)
            }
        }
    }

    /// Advances `state` by one leapfrog step of size `step_size`.
    pub fn step(&self, state: IntegratorState<K>, step_size: f64) -> IntegratorState<K> {
        let IntegratorState {
            position,
            momentum,
            logdensity: _,
            logdensity_grad,
        } = state;
        let half_step = 0.5 * step_size;

        let momentum = momentum.add(logdensity_grad.mul_scalar(half_step));
        let velocity = (self.kinetic_energy_grad_fn)(momentum.clone());
        let position = position.add(velocity.mul_scalar(step_size));
        let (logdensity, logdensity_grad) = self.logdensity_and_grad(position.clone());
        let momentum = momentum.add(logdensity_grad.clone().mul_scalar(half_step));

        IntegratorState {
            position,
            momentum,
            logdensity,
            logdensity_grad,
        }
    }
}
