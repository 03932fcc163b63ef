//! HMC and Random-Walk Metropolis transition kernels on burn tensors.
//!
//! A target is any type implementing [`LogDensity`]. [`hmc`] and [`rwm`] return persistent
//! builders whose `build()` yields a [`Sampler`] with the `init`/`step` protocol. Chain states
//! are moved into `step`, and the random stream is threaded explicitly through [`PrngKey`].

pub mod autodiff;
pub mod core;
pub mod distributions;
pub mod error;
pub mod hmc;
pub mod integrator;
pub mod metric;
pub mod random;
pub mod rwm;
pub mod stats;

pub use crate::core::{run_chain, run_chain_progress, Chain, ChainState, Sampler, TransitionInfo};
pub use distributions::{IsotropicGaussian, LogDensity, Rosenbrock2D};
pub use error::{ConfigError, Error};
pub use hmc::{hmc, HMCBuilder, HMCInfo, HMCSampler, HMCState, ValueAndGrad};
pub use random::PrngKey;
pub use rwm::{rwm, RWMBuilder, RWMInfo, RWMSampler, RWMState};
pub use stats::{ChainSummary, ChainTracker};
