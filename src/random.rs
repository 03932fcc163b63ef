//! Splittable pseudorandom keys.
//!
//! A [`PrngKey`] is a plain value: drawing from it never mutates it, and the same key always
//! produces the same numbers. Independent streams are obtained by [`PrngKey::split`], so a
//! transition kernel can derive one key for its proposal and another for its accept/reject test
//! without any shared RNG state.
//!
//! ```rust
//! use mcmc_kernels::random::PrngKey;
//!
//! let key = PrngKey::new(42);
//! let [momentum_key, accept_key] = key.split();
//! assert_ne!(momentum_key, accept_key);
//! assert_eq!(key.split::<2>(), [momentum_key, accept_key]);
//! ```

use burn::prelude::*;
use burn::tensor::ElementConversion;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

// Draws and splits read from disjoint ChaCha streams of the same seed.
const DRAW_STREAM: u64 = 0;
const SPLIT_STREAM: u64 = 1;

/// A counter-based PRNG key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrngKey(u64);

impl PrngKey {
    /// Creates a root key from a seed.
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Derives `N` statistically independent child keys.
    pub fn split<const N: usize>(self) -> [PrngKey; N] {
        let mut rng = self.rng(SPLIT_STREAM);
        std::array::from_fn(|_| PrngKey(rng.next_u64()))
    }

    /// Draws a tensor of standard normal variates with the given shape.
    pub fn normal<B: Backend, const D: usize>(
        self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        let mut rng = self.rng(DRAW_STREAM);
        let n = shape.iter().product::<usize>();
        let values: Vec<B::FloatElem> = (0..n)
            .map(|_| B::FloatElem::from_elem(rng.sample::<f64, _>(StandardNormal)))
            .collect();
        Tensor::<B, D>::from_data(TensorData::new(values, shape), device)
    }

    /// Draws a tensor of uniform variates on `[0, 1)` with the given shape.
    pub fn uniform<B: Backend, const D: usize>(
        self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        let mut rng = self.rng(DRAW_STREAM);
        let n = shape.iter().product::<usize>();
        let values: Vec<B::FloatElem> = (0..n)
            .map(|_| B::FloatElem::from_elem(rng.gen::<f64>()))
            .collect();
        Tensor::<B, D>::from_data(TensorData::new(values, shape), device)
    }

    fn rng(self, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.0);
        rng.set_stream(stream);
        rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type BackendType = NdArray<f64>;

    fn values(t: Tensor<BackendType, 1>) -> Vec<f64> {
        t.into_data().to_vec::<f64>().unwrap()
    }

    #[test]
    fn same_key_same_draws() {
        let device = Default::default();
        let key = PrngKey::new(7);
        let a = values(key.normal::<BackendType, 1>([16], &device));
        let b = values(key.normal::<BackendType, 1>([16], &device));
        assert_eq!(a, b);
    }

    #[test]
    fn split_children_are_distinct() {
        let key = PrngKey::new(7);
        let children = key.split::<4>();
        for (i, a) in children.iter().enumerate() {
            assert_ne!(*a, key);
            for b in children.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        // Splitting is a pure function of the key.
        assert_eq!(key.split::<4>(), children);
    }

    #[test]
    fn uniform_in_unit_interval() {
        let device = Default::default();
        let u = values(PrngKey::new(3).uniform::<BackendType, 1>([1000], &device));
        assert!(u.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn normal_moments() {
        let device = Default::default();
        let z = values(PrngKey::new(11).normal::<BackendType, 1>([20_000], &device));
        let n = z.len() as f64;
        let mean = z.iter().sum::<f64>() / n;
        let var = z.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert!(mean.abs() < 0.05, "mean = {mean}");
        assert!((var - 1.0).abs() < 0.05, "var = {var}");
    }
}
