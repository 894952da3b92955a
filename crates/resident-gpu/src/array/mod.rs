//! GPU-resident arrays.
//!
//! A [`ResidentArray`] is a named, typed, multi-channel array stored on the device as a ring of
//! `buffer_count` slots. Kernels read the current (or last) state of some arrays and write the next
//! state of another: the writer advances its ring *before* drawing, so no step ever reads and
//! writes the same slot.

mod slot;
mod transfer;

use resident_format::{
    resolve, ClearValue, DataType, Filter, FormatProfile, FormatRequest, Shape, Wrap,
};

pub use slot::BufferSlot;

use crate::context::GpuContext;
use crate::error::{ResidentError, Result};
use crate::hal::{FramebufferId, TextureId};
use crate::params::ResidentArrayDescriptor;
use crate::scheduler::Scheduler;
use slot::SlotLayout;

pub struct ResidentArray {
    name: String,
    ty: DataType,
    component_count: u8,
    shape: Shape,
    filter: Filter,
    wrap_s: Wrap,
    wrap_t: Wrap,
    writable: bool,
    buffer_count: u32,
    clear_value: ClearValue,
    buffer_index: u32,
    profile: FormatProfile,
    slots: Vec<BufferSlot>,
    /// `None` once disposed.
    context: Option<GpuContext>,
}

impl ResidentArray {
    /// Validates `desc`, resolves its physical format and allocates every slot.
    ///
    /// Configuration errors are returned before anything is allocated. Device failures during
    /// allocation go to the context's error callback and leave the affected slot empty.
    pub fn new(ctx: &GpuContext, desc: ResidentArrayDescriptor) -> Result<Self> {
        let validated = desc.validate()?;
        let resolution = resolve(
            FormatRequest {
                ty: desc.ty,
                component_count: desc.component_count,
                writable: desc.writable,
                filter: validated.filter,
                wrap_s: desc.wrap_s,
                wrap_t: desc.wrap_t,
            },
            ctx.capabilities(),
        )
        .map_err(|e| ResidentError::Configuration(format!("array `{}`: {e}", desc.name)))?;
        let profile = resolution.profile;

        if ctx.verbose() {
            for fallback in &resolution.fallbacks {
                tracing::debug!(array = %desc.name, "{fallback}");
            }
        }

        let payload = desc
            .initial_data
            .as_ref()
            .map(|data| resident_format::codec::encode_upload(data, &profile, &validated.shape))
            .transpose()?;

        let slots = slot::allocate(
            ctx,
            &SlotLayout {
                name: &desc.name,
                profile: &profile,
                shape: &validated.shape,
                writable: desc.writable,
                count: desc.buffer_count,
            },
            payload.as_deref(),
        )?;

        if ctx.verbose() {
            tracing::debug!(
                array = %desc.name,
                ty = %desc.ty,
                storage = %profile.storage,
                width = validated.shape.width(),
                height = validated.shape.height(),
                buffers = desc.buffer_count,
                "initialized resident array"
            );
        }

        Ok(Self {
            name: desc.name,
            ty: desc.ty,
            component_count: desc.component_count,
            shape: validated.shape,
            filter: validated.filter,
            wrap_s: desc.wrap_s,
            wrap_t: desc.wrap_t,
            writable: desc.writable,
            buffer_count: desc.buffer_count,
            clear_value: desc.clear_value,
            buffer_index: 0,
            profile,
            slots,
            context: Some(ctx.clone()),
        })
    }

    pub(crate) fn live(&self) -> Result<&GpuContext> {
        self.context.as_ref().ok_or_else(|| {
            ResidentError::Precondition(format!("array `{}` has been disposed", self.name))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.ty
    }

    pub fn component_count(&self) -> u8 {
        self.component_count
    }

    pub fn profile(&self) -> &FormatProfile {
        &self.profile
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn width(&self) -> u32 {
        self.shape.width()
    }

    pub fn height(&self) -> u32 {
        self.shape.height()
    }

    pub fn is_1d(&self) -> bool {
        self.shape.is_1d()
    }

    /// Logical length of a 1-D array.
    pub fn length(&self) -> Result<u32> {
        self.shape.length().ok_or_else(|| {
            ResidentError::Precondition(format!(
                "cannot access length on 2D array `{}`",
                self.name
            ))
        })
    }

    /// Requested filter (the device may sample with `profile().filter` instead).
    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn wrap(&self) -> (Wrap, Wrap) {
        (self.wrap_s, self.wrap_t)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub fn buffer_index(&self) -> u32 {
        self.buffer_index
    }

    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    pub fn is_disposed(&self) -> bool {
        self.context.is_none()
    }

    pub fn clear_value(&self) -> &ClearValue {
        &self.clear_value
    }

    pub fn set_clear_value(&mut self, clear_value: impl Into<ClearValue>) -> Result<()> {
        let clear_value = clear_value.into();
        clear_value
            .validate(self.ty, self.component_count)
            .map_err(|e| ResidentError::Configuration(format!("array `{}`: {e}", self.name)))?;
        self.clear_value = clear_value;
        Ok(())
    }

    /// Parameters that rebuild an array of the same format and shape (without contents).
    pub fn descriptor(&self) -> ResidentArrayDescriptor {
        ResidentArrayDescriptor {
            name: self.name.clone(),
            ty: self.ty,
            component_count: self.component_count,
            dimensions: self.shape.dimensions(),
            filter: Some(self.filter),
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
            writable: self.writable,
            buffer_count: self.buffer_count,
            clear_value: self.clear_value.clone(),
            initial_data: None,
        }
    }

    pub fn current_state(&self) -> Result<TextureId> {
        self.state_at(self.buffer_index)
    }

    /// The state before the current one. Needs at least two buffers.
    pub fn last_state(&self) -> Result<TextureId> {
        if self.buffer_count == 1 {
            return Err(ResidentError::Precondition(format!(
                "cannot access last state on array `{}` with only one buffer",
                self.name
            )));
        }
        self.state_at((self.buffer_index + self.buffer_count - 1) % self.buffer_count)
    }

    pub fn state_at(&self, index: u32) -> Result<TextureId> {
        self.live()?;
        if index >= self.buffer_count {
            return Err(ResidentError::Precondition(format!(
                "invalid buffer index {index} for array `{}` with {} buffer(s)",
                self.name, self.buffer_count
            )));
        }
        self.slots[index as usize].texture().ok_or_else(|| {
            ResidentError::Precondition(format!(
                "buffer {index} of array `{}` has no storage",
                self.name
            ))
        })
    }

    /// Rotates the ring: the next slot becomes the current state.
    pub fn advance(&mut self) -> Result<()> {
        self.live()?;
        self.buffer_index = (self.buffer_index + 1) % self.buffer_count;
        Ok(())
    }

    /// Returns the render target a step should draw into, advancing the ring first if asked.
    ///
    /// Fails without advancing on read-only arrays and when the target slot has no render target.
    pub fn prepare_for_write(&mut self, advance: bool) -> Result<FramebufferId> {
        self.live()?;
        if !self.writable {
            return Err(ResidentError::Precondition(format!(
                "array `{}` is not writable",
                self.name
            )));
        }
        let target = if advance {
            (self.buffer_index + 1) % self.buffer_count
        } else {
            self.buffer_index
        };
        let framebuffer = self.slots[target as usize].framebuffer().ok_or_else(|| {
            ResidentError::Precondition(format!(
                "buffer {target} of array `{}` has no render target",
                self.name
            ))
        })?;
        self.buffer_index = target;
        Ok(framebuffer)
    }

    /// Builds a copy of this array (same format, shape and contents) through `scheduler`.
    ///
    /// The copy is named `name`, or `"<name>-copy"` when `None`.
    pub fn duplicate(
        &self,
        scheduler: &mut dyn Scheduler,
        name: Option<&str>,
    ) -> Result<ResidentArray> {
        self.live()?;
        scheduler.clone_array(self, name)
    }

    /// Releases every slot and detaches the array from its device.
    pub fn dispose(&mut self) -> Result<()> {
        let ctx = self.live()?.clone();
        if ctx.verbose() {
            tracing::debug!(array = %self.name, "disposing resident array");
        }
        slot::release(&mut *ctx.device()?, &mut self.slots);
        self.context = None;
        Ok(())
    }
}

impl Drop for ResidentArray {
    fn drop(&mut self) {
        let Some(ctx) = self.context.take() else {
            return;
        };
        tracing::warn!(array = %self.name, "resident array dropped without dispose(), releasing its buffers");
        let Ok(mut device) = ctx.device() else {
            return;
        };
        slot::release(&mut *device, &mut self.slots);
    }
}

impl core::fmt::Debug for ResidentArray {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResidentArray")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("component_count", &self.component_count)
            .field("shape", &self.shape)
            .field("storage", &self.profile.storage)
            .field("buffer_index", &self.buffer_index)
            .field("buffer_count", &self.buffer_count)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use resident_format::DeviceCapabilities;

    use super::*;
    use crate::hal::SoftDevice;

    fn ctx() -> GpuContext {
        GpuContext::new(SoftDevice::new(DeviceCapabilities::gles3()))
    }

    #[test]
    fn advance_wraps_and_last_state_trails() {
        let ctx = ctx();
        let mut array = ResidentArray::new(
            &ctx,
            ResidentArrayDescriptor::new("ring", DataType::Float, 1, 4u32)
                .writable(true)
                .with_buffer_count(3),
        )
        .unwrap();
        let before = array.current_state().unwrap();
        array.advance().unwrap();
        assert_eq!(array.last_state().unwrap(), before);
        assert_ne!(array.current_state().unwrap(), before);
        array.advance().unwrap();
        array.advance().unwrap();
        assert_eq!(array.buffer_index(), 0);
        assert_eq!(array.current_state().unwrap(), before);
        array.dispose().unwrap();
    }

    #[test]
    fn state_at_checks_bounds() {
        let ctx = ctx();
        let mut array = ResidentArray::new(
            &ctx,
            ResidentArrayDescriptor::new("single", DataType::Int, 2, (2u32, 2u32)),
        )
        .unwrap();
        assert!(array.state_at(0).is_ok());
        assert!(matches!(array.state_at(1), Err(ResidentError::Precondition(_))));
        assert!(matches!(array.last_state(), Err(ResidentError::Precondition(_))));
        assert!(matches!(array.length(), Err(ResidentError::Precondition(_))));
        array.dispose().unwrap();
    }

    #[test]
    fn read_only_arrays_have_no_render_target() {
        let ctx = ctx();
        let mut array = ResidentArray::new(
            &ctx,
            ResidentArrayDescriptor::new("ro", DataType::Float, 1, 4u32).with_buffer_count(2),
        )
        .unwrap();
        assert!(matches!(
            array.prepare_for_write(true),
            Err(ResidentError::Precondition(_))
        ));
        // A failed write preparation does not rotate the ring.
        assert_eq!(array.buffer_index(), 0);
        array.dispose().unwrap();
    }

    #[test]
    fn disposed_arrays_reject_use() {
        let ctx = ctx();
        let mut array = ResidentArray::new(
            &ctx,
            ResidentArrayDescriptor::new("gone", DataType::UnsignedByte, 4, 8u32),
        )
        .unwrap();
        array.dispose().unwrap();
        assert!(array.is_disposed());
        assert!(matches!(array.current_state(), Err(ResidentError::Precondition(_))));
        assert!(matches!(array.advance(), Err(ResidentError::Precondition(_))));
        assert!(matches!(array.dispose(), Err(ResidentError::Precondition(_))));
    }

    #[test]
    fn clear_value_setter_validates() {
        let ctx = ctx();
        let mut array = ResidentArray::new(
            &ctx,
            ResidentArrayDescriptor::new("cv", DataType::UnsignedShort, 2, 4u32),
        )
        .unwrap();
        array.set_clear_value(vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            array.set_clear_value(-1.0),
            Err(ResidentError::Configuration(_))
        ));
        assert_eq!(array.clear_value(), &ClearValue::Vector(vec![1.0, 2.0]));
        array.dispose().unwrap();
    }
}
