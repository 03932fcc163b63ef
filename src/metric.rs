//! Gaussian–Euclidean metric with a diagonal mass matrix.
//!
//! The metric fixes what "momentum" means: momenta are drawn from `N(0, M)` and the kinetic
//! energy is `K(p) = ½ pᵀ M⁻¹ p`. Only the diagonal of `M⁻¹` is stored.

use crate::autodiff::{self, SharedTensorFn};
use crate::random::PrngKey;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::rc::Rc;

/// `K(p) = ½ Σᵢ pᵢ² M⁻¹ᵢ`.
pub fn gaussian_kinetic_energy<K: Backend>(
    inverse_mass_matrix: Tensor<K, 1>,
    momentum: Tensor<K, 1>,
) -> Tensor<K, 1> {
    momentum
        .powi_scalar(2)
        .mul(inverse_mass_matrix)
        .sum()
        .mul_scalar(0.5)
}

pub struct EuclideanMetric<K: Backend> {
    inverse_mass_matrix: Tensor<K, 1>,
    mass_matrix_sqrt: Tensor<K, 1>,
    kinetic_energy_grad: SharedTensorFn<K>,
}

impl<B: AutodiffBackend> EuclideanMetric<B> {
    /// Takes ownership of the diagonal `M⁻¹` and differentiates the kinetic energy once.
    pub fn new(inverse_mass_matrix: Tensor<B, 1>) -> Self {
        let inverse_mass_matrix = inverse_mass_matrix.detach();
        let mass_matrix_sqrt = inverse_mass_matrix.clone().recip().sqrt();
        let imm = inverse_mass_matrix.clone();
        let kinetic_energy_grad: SharedTensorFn<B> =
            Rc::new(autodiff::grad(move |p: Tensor<B, 1>| {
                gaussian_kinetic_energy(imm.clone(), p)
            }));
        Self {
            inverse_mass_matrix,
            mass_matrix_sqrt,
            kinetic_energy_grad,
        }
    }

    /// Moves the metric onto the tape-free inner backend, keeping the cached gradient.
    pub fn lower(self) -> EuclideanMetric<B::InnerBackend> {
        let grad = self.kinetic_energy_grad;
        EuclideanMetric {
            inverse_mass_matrix: self.inverse_mass_matrix.inner(),
            mass_matrix_sqrt: self.mass_matrix_sqrt.inner(),
            kinetic_energy_grad: Rc::new(autodiff::lower::<B, _>(move |p: Tensor<B, 1>| {
                grad(p)
            })),
        }
    }
}

impl<K: Backend> EuclideanMetric<K> {
    pub fn dim(&self) -> usize {
        self.inverse_mass_matrix.dims()[0]
    }

    pub fn inverse_mass_matrix(&self) -> &Tensor<K, 1> {
        &self.inverse_mass_matrix
    }

    pub fn kinetic_energy(&self, momentum: Tensor<K, 1>) -> Tensor<K, 1> {
        gaussian_kinetic_energy(self.inverse_mass_matrix.clone(), momentum)
    }

    pub fn kinetic_energy_grad(&self, momentum: Tensor<K, 1>) -> Tensor<K, 1> {
        (self.kinetic_energy_grad)(momentum)
    }

    /// The cached `∇K` closure, for integrators driven by this metric.
    pub fn kinetic_energy_grad_fn(&self) -> SharedTensorFn<K> {
        Rc::clone(&self.kinetic_energy_grad)
    }

    /// Draws `p ~ N(0, M)` shaped like `position`.
    pub fn sample_momentum(&self, key: PrngKey, position: &Tensor<K, 1>) -> Tensor<K, 1> {
        let z = key.normal::<K, 1>(position.dims(), &position.device());
        z.mul(self.mass_matrix_sqrt.clone())
    }
}
