//! Additive feature attribution strategies
//!
//! - [`tree_shap`]: exact, deterministic, reads the tree structure
//! - [`kernel_shap`]: sampling-based, works on any batch predictor
//! - [`background`]: weighted reference sample for `kernel_shap`

pub mod background;
pub mod kernel_shap;
pub mod tree_shap;

pub use background::{summarize, Background};
pub use kernel_shap::{KernelExplainer, KernelExplanation};
