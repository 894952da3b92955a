//! `resident-format` contains the device-independent half of resident arrays.
//!
//! Currently this crate provides:
//! - Declared element types, sampling options and typed host arrays (see [`DataType`],
//!   [`ArrayData`]).
//! - 1-D/2-D shape layout (see [`Shape`]).
//! - Device capability profiles, including negotiation from a `wgpu` adapter
//!   (see [`DeviceCapabilities`]).
//! - The format resolver: a pure lookup from `(type, components, writable, capabilities)`
//!   to the physical representation a device can actually store and render
//!   (see [`resolve`]).
//! - Upload/clear encoding and readback decoding between the declared type and the
//!   internal type, including binary16 (see [`codec`]).
//!
//! Nothing in this crate touches a device, so every rule can be unit tested headless.

mod caps;
mod error;
mod resolve;
mod shape;
mod types;

pub mod codec;

pub use caps::{DeviceCapabilities, DeviceFeatures, ReadbackQuirks, DISABLE_FLOAT_LINEAR_ENV};
pub use codec::{PixelLayout, ReadbackPlan};
pub use error::FormatError;
pub use resolve::{
    resolve, Fallback, FallbackField, FormatProfile, FormatRequest, Resolution, StorageFormat,
};
pub use shape::{Dimensions, Shape};
pub use types::{ArrayData, ClearValue, DataType, Filter, Wrap};

/// Re-exported so callers can build half-float host arrays without a direct `half` dependency.
pub use half::f16;
