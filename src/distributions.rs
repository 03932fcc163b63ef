/*!
Target densities for the samplers.

A target implements [`LogDensity`], which maps a position tensor of shape `[d]` to its
unnormalized log-density as a tensor of shape `[1]`. The method is generic over the backend so
the same target can be evaluated on an autodiff backend (for gradients) and on its tape-free
inner backend.

# Examples

```rust
use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use mcmc_kernels::distributions::{IsotropicGaussian, LogDensity};

type B = Autodiff<NdArray<f64>>;

let target = IsotropicGaussian::new(2.0);
let x = Tensor::<B, 1>::from_floats([2.0, 0.0], &Default::default());
let logp: f64 = target.logdensity(x).into_scalar();
assert!((logp + 0.5).abs() < 1e-12);
```
*/

use burn::prelude::*;

/// An unnormalized log-density over `R^d`.
pub trait LogDensity {
    /// Returns `log π(position)` up to an additive constant, as a tensor of shape `[1]`.
    fn logdensity<B: Backend>(&self, position: Tensor<B, 1>) -> Tensor<B, 1>;
}

/// A zero-mean Gaussian with covariance `std² · I`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotropicGaussian {
    pub std: f64,
}

impl IsotropicGaussian {
    pub fn new(std: f64) -> Self {
        Self { std }
    }

    /// The standard normal `N(0, I)`.
    pub fn standard() -> Self {
        Self::new(1.0)
    }
}

impl LogDensity for IsotropicGaussian {
    fn logdensity<B: Backend>(&self, position: Tensor<B, 1>) -> Tensor<B, 1> {
        position
            .powi_scalar(2)
            .sum()
            .mul_scalar(-0.5 / (self.std * self.std))
    }
}

/// The 2D Rosenbrock "banana": `log π(x, y) = -[(a - x)² + b (y - x²)²]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rosenbrock2D {
    pub a: f64,
    pub b: f64,
}

impl LogDensity for Rosenbrock2D {
    fn logdensity<B: Backend>(&self, position: Tensor<B, 1>) -> Tensor<B, 1> {
        let x = position.clone().slice([0..1]);
        let y = position.slice([1..2]);
        let term_1 = x.clone().neg().add_scalar(self.a).powi_scalar(2);
        let term_2 = y.sub(x.powi_scalar(2)).powi_scalar(2).mul_scalar(self.b);
        term_1.add(term_2).neg()
    }
}
