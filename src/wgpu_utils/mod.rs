//! wgpu helpers for compute-only use
//!
//! Typed buffer wrappers and binding shorthands used by the device backend.

pub mod binding_types;
pub mod buffers;

pub use binding_types::*;
pub use buffers::{ArrayBuffer, UniformBuffer};
