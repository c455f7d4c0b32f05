//! briny_layers: activation and loss layer kernels for neural-network training.
//!
//! Every layer pairs a forward kernel with a backward kernel over caller-owned
//! buffers. The numerically sensitive parts (max-shifted softmax, log-sum-exp,
//! fused cross-entropy gradients) live in one CPU reference implementation;
//! optional GPU kernels are chosen per element type and active backend and
//! fall back to the CPU reference whenever they cannot run.
//!
//! # Layers
//!
//! - Activations: sigmoid, tanh, ReLU, softmax, log-softmax and the
//!   power-affine map `a·xᵖ + b`.
//! - Losses: quadratic, softmax cross-entropy, log-softmax cross-entropy and
//!   unnormalized (logit) cross-entropy.
//!
//! # Modules
//!
//! - [`activation`]: Activation layers and their metadata table.
//! - [`loss`]: Loss layers holding a borrow of the last forward output.
//! - [`tensors`]: Buffer type, shape decomposition and element types.
//! - [`backend`]: Global compute backend selection.
//! - [`ops`]: CPU and GPU kernels and their dispatch.
//! - [`error`]: Contract errors returned by layer calls.
//! - [`approx`]: Tolerances for comparing kernel results.
//!
//! # Example
//!
//! ```rust
//! use briny_layers::activation::{Activation, BackwardInputs};
//! use briny_layers::loss::{BackwardOptions, LossLayer};
//! use briny_layers::tensor;
//!
//! let mut y = tensor!([[1.0f64, 2.0, 3.0]]);
//! Activation::Softmax.forward_in_place(&mut y)?;
//!
//! let mut loss = LossLayer::softmax_cross_entropy();
//! loss.forward(&y)?;
//!
//! let mut grad = tensor!([[0.0, 0.0, 1.0]]);
//! assert!(loss.loss(&grad)? > 0.0);
//! loss.backward(&mut grad, BackwardOptions::default())?;
//! Activation::Softmax.backward_in_place(BackwardInputs::from_y(&y), &mut grad)?;
//! # Ok::<(), briny_layers::error::LayerError>(())
//! ```

pub mod activation;
pub mod approx;
pub mod backend;
pub mod error;
pub mod loss;
pub mod ops;
pub mod tensors;

mod layout;
