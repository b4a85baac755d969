#![warn(missing_docs)]
//!# burn-tinynets - Compact Burn Classification Models
//!
//! ## Notable Components
//!
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//!     * [`layers::blocks::norm_act_conv`] - pre-activation ``BatchNorm2d + Relu + Conv2d`` block.
//! * [`models`] - complete model families.
//!   * [`models::resnet9`] - `ResNet9`.
//!   * [`models::densenet`] - `DenseNet`.

pub mod layers;
pub mod models;
