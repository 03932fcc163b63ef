//! Function transforms over burn's autodiff backend.
//!
//! [`grad`] and [`value_and_grad`] turn a log-density (or kinetic energy) `f: R^d -> R` into
//! closures that evaluate its gradient. The returned closures are meant to be built once and
//! stored by the metric or integrator that owns them, then reused at every step.
//!
//! [`lower`] and [`lower_pair`] move a function onto `B::InnerBackend`, the tape-free backend
//! underneath the autodiff decorator. Kernels run entirely on the inner backend in the jit
//! modes; only the gradient evaluation is lifted back to `B` for differentiation.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::rc::Rc;

/// A boxed `R^d -> R^k` tensor function.
pub type TensorFn<K> = Box<dyn Fn(Tensor<K, 1>) -> Tensor<K, 1>>;

/// A [`TensorFn`] owned by more than one component.
pub type SharedTensorFn<K> = Rc<dyn Fn(Tensor<K, 1>) -> Tensor<K, 1>>;

/// A boxed function returning a value together with its gradient.
pub type ValueAndGradFn<K> = Box<dyn Fn(Tensor<K, 1>) -> (Tensor<K, 1>, Tensor<K, 1>)>;

/// Returns a closure computing `∇f`.
pub fn grad<B, F>(f: F) -> impl Fn(Tensor<B, 1>) -> Tensor<B, 1>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    move |x| eval_with_grad(&f, x).1
}

/// Returns a closure computing `(f(x), ∇f(x))` from a single forward and backward pass.
pub fn value_and_grad<B, F>(f: F) -> impl Fn(Tensor<B, 1>) -> (Tensor<B, 1>, Tensor<B, 1>)
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    move |x| eval_with_grad(&f, x)
}

/// Runs `f` on the inner backend: inputs are lifted into `B`, outputs are lowered back.
pub fn lower<B, F>(f: F) -> impl Fn(Tensor<B::InnerBackend, 1>) -> Tensor<B::InnerBackend, 1>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    move |x| f(Tensor::from_inner(x)).inner()
}

/// [`lower`] for value-and-gradient functions.
pub fn lower_pair<B, F>(
    f: F,
) -> impl Fn(Tensor<B::InnerBackend, 1>) -> (Tensor<B::InnerBackend, 1>, Tensor<B::InnerBackend, 1>)
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> (Tensor<B, 1>, Tensor<B, 1>),
{
    move |x| {
        let (value, grad) = f(Tensor::from_inner(x));
        (value.inner(), grad.inner())
    }
}

fn eval_with_grad<B, F>(f: &F, x: Tensor<B, 1>) -> (Tensor<B, 1>, Tensor<B, 1>)
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    let x = x.detach().require_grad();
    let value = f(x.clone());
    let grads = value.backward();
    // `f` may ignore its input entirely (e.g. a flat density); its gradient is then zero.
    let grad = match x.grad(&grads) {
        Some(g) => Tensor::from_inner(g),
        None => x.zeros_like().detach(),
    };
    (value.detach(), grad)
}
