use core::ops::{Deref, DerefMut};

use crate::context::DeviceRef;
use crate::hal::{BackendError, FramebufferId, GpuDevice};

/// Scoped render-target binding.
///
/// Binds a framebuffer on creation and restores whatever was bound before when dropped, so no
/// operation leaks framebuffer state to the next one. Derefs to the device for the work done while
/// bound.
pub struct BoundFramebuffer<'a> {
    device: DeviceRef<'a>,
    previous: Option<FramebufferId>,
}

impl<'a> BoundFramebuffer<'a> {
    pub fn new(mut device: DeviceRef<'a>, framebuffer: FramebufferId) -> Result<Self, BackendError> {
        let previous = device.bound_framebuffer();
        device.bind_framebuffer(Some(framebuffer))?;
        Ok(Self { device, previous })
    }
}

impl Deref for BoundFramebuffer<'_> {
    type Target = dyn GpuDevice + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.device
    }
}

impl DerefMut for BoundFramebuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.device
    }
}

impl Drop for BoundFramebuffer<'_> {
    fn drop(&mut self) {
        // The previous target may have been destroyed while we were bound.
        if self.device.bind_framebuffer(self.previous).is_err() {
            let _ = self.device.bind_framebuffer(None);
        }
    }
}
