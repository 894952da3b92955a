use std::cell::{RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use resident_format::DeviceCapabilities;

use crate::binding::BoundFramebuffer;
use crate::error::{DeviceResourceError, ResidentError, Result};
use crate::hal::{FramebufferId, GpuDevice};

/// Mutable access to the shared device.
pub type DeviceRef<'a> = RefMut<'a, dyn GpuDevice + 'static>;

type ErrorCallback = Rc<dyn Fn(&DeviceResourceError)>;

/// Shared handle to the device plus the policies every array and program on it follows.
///
/// Cloning is cheap; all clones refer to the same device. The context never creates or tears down
/// the device itself.
#[derive(Clone)]
pub struct GpuContext {
    device: Rc<RefCell<dyn GpuDevice>>,
    capabilities: DeviceCapabilities,
    verbose: bool,
    on_error: ErrorCallback,
}

impl GpuContext {
    pub fn new<D: GpuDevice + 'static>(device: D) -> Self {
        Self::from_shared(Rc::new(RefCell::new(device)))
    }

    /// Wraps a device that the caller keeps its own handle to (e.g. to register kernels on a
    /// [`crate::SoftDevice`]).
    pub fn from_shared(device: Rc<RefCell<dyn GpuDevice>>) -> Self {
        let capabilities = device.borrow().capabilities();
        Self {
            device,
            capabilities,
            verbose: false,
            on_error: Rc::new(|err| tracing::error!("{err}")),
        }
    }

    /// Enables lifecycle logging (construction, resize, clear, dispose, format fallbacks).
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_error_callback(mut self, callback: impl Fn(&DeviceResourceError) + 'static) -> Self {
        self.on_error = Rc::new(callback);
        self
    }

    /// Overrides the capability profile used for format resolution and readback planning.
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Borrows the device for the duration of one operation.
    ///
    /// Fails if the device is already borrowed (a re-entrant call from inside a device operation).
    pub fn device(&self) -> Result<DeviceRef<'_>> {
        self.device
            .try_borrow_mut()
            .map_err(|_| ResidentError::Precondition("device is already in use".into()))
    }

    /// Delivers a device-side failure to the error callback.
    pub fn report(&self, err: DeviceResourceError) {
        (self.on_error)(&err);
    }

    /// Binds `framebuffer` until the returned guard is dropped.
    pub fn bind_framebuffer(&self, framebuffer: FramebufferId) -> Result<BoundFramebuffer<'_>> {
        BoundFramebuffer::new(self.device()?, framebuffer)
            .map_err(|err| ResidentError::Precondition(format!("cannot bind render target: {err}")))
    }

    pub fn same_device(&self, other: &GpuContext) -> bool {
        Rc::ptr_eq(&self.device, &other.device)
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("capabilities", &self.capabilities)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}
