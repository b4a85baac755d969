//! # Model Families
pub mod densenet;
pub mod resnet9;
