//! # Miscellaneous Blocks
pub mod conv_norm;
pub mod norm_act_conv;
