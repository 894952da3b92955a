//! GPU-resident arrays and the compute programs that write them.
//!
//! A [`ResidentArray`] keeps one named array on the device as a ring of buffer slots, so a kernel
//! can read the current state while writing the next. Arrays and [`ComputeProgram`]s share a
//! [`GpuContext`], which wraps a [`hal::GpuDevice`] plus the error callback and logging policy.
//! Device-side failures (allocation, incomplete render targets, missing uniforms) go to that
//! callback and leave objects in a best-effort state; invalid parameters and invalid access are
//! returned as [`ResidentError`].
//!
//! Writes happen through a [`Scheduler`]; [`BasicScheduler`] is a single-device implementation.
//! [`SoftDevice`] is a deterministic in-memory device for tests and headless use.

mod array;
mod binding;
mod context;
mod error;
pub mod hal;
pub mod kernels;
mod params;
mod program;
mod scheduler;

pub use array::{BufferSlot, ResidentArray};
pub use binding::BoundFramebuffer;
pub use context::{DeviceRef, GpuContext};
pub use error::{DeviceResourceError, ResidentError, Result};
pub use hal::SoftDevice;
pub use params::ResidentArrayDescriptor;
pub use program::{ComputeProgram, UniformDataType, UniformInit, UniformInput};
pub use scheduler::{BasicScheduler, Scheduler};

pub use resident_format;
