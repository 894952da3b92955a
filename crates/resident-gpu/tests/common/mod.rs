//! Shared helpers for `resident-gpu` integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use resident_gpu::hal::GpuDevice;
use resident_gpu::resident_format::DeviceCapabilities;
use resident_gpu::{DeviceResourceError, GpuContext, SoftDevice};

/// A software device plus a context whose error callback records every report.
pub struct Harness {
    pub device: Rc<RefCell<SoftDevice>>,
    pub ctx: GpuContext,
    pub errors: Rc<RefCell<Vec<DeviceResourceError>>>,
}

impl Harness {
    pub fn take_errors(&self) -> Vec<DeviceResourceError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }

    pub fn live_textures(&self) -> usize {
        self.device.borrow().live_textures()
    }
}

pub fn harness(caps: DeviceCapabilities) -> Harness {
    harness_with(SoftDevice::new(caps))
}

pub fn harness_with(device: SoftDevice) -> Harness {
    init_tracing();
    let device = Rc::new(RefCell::new(device));
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let shared: Rc<RefCell<dyn GpuDevice>> = device.clone();
    let ctx = GpuContext::from_shared(shared)
        .with_verbose(true)
        .with_error_callback(move |err| sink.borrow_mut().push(err.clone()));
    Harness {
        device,
        ctx,
        errors,
    }
}

/// Routes `tracing` output to the test harness; `RUST_LOG=debug` shows lifecycle logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
