//! Host transfers and whole-array rewrites: set, clear, read, resize, copy.

use resident_format::codec::{decode_readback, encode_clear, encode_upload};
use resident_format::{ArrayData, Dimensions, ReadbackPlan, Shape};

use super::slot::{self, SlotLayout};
use super::ResidentArray;
use crate::error::{DeviceResourceError, ResidentError, Result};
use crate::hal::FramebufferStatus;
use crate::kernels::{OutputFamily, FILL_VALUE_UNIFORM};
use crate::program::UniformInput;
use crate::scheduler::Scheduler;

impl ResidentArray {
    fn target_range(&self, all: bool) -> core::ops::Range<u32> {
        if all {
            0..self.buffer_count
        } else {
            self.buffer_index..self.buffer_index + 1
        }
    }

    /// Uploads the same bytes into the current slot, or every slot when `all` is set.
    fn upload(&self, bytes: &[u8], all: bool) -> Result<()> {
        let ctx = self.live()?;
        let mut errors = Vec::new();
        {
            let mut device = ctx.device()?;
            for index in self.target_range(all) {
                let Some(texture) = self.slots[index as usize].texture() else {
                    continue;
                };
                if let Err(source) = device.upload_texture(texture, Some(bytes)) {
                    errors.push(DeviceResourceError::Upload {
                        name: self.name.clone(),
                        source,
                    });
                }
            }
        }
        for err in errors {
            ctx.report(err);
        }
        Ok(())
    }

    /// Replaces the contents of the current slot (or every slot) with host data.
    ///
    /// `data` must be in the declared type and hold exactly `logical length x components` values.
    pub fn set_from_host(&mut self, data: &ArrayData, all: bool) -> Result<()> {
        self.live()?;
        let bytes = encode_upload(data, &self.profile, &self.shape)
            .map_err(|e| ResidentError::Configuration(format!("array `{}`: {e}", self.name)))?;
        self.upload(&bytes, all)
    }

    /// Rebuilds every slot at a new size, optionally seeding them with `data`.
    ///
    /// Dimensions and seed data are validated before the old slots are released; on error the
    /// array is untouched. The ring position is kept.
    pub fn resize(&mut self, dimensions: impl Into<Dimensions>, data: Option<&ArrayData>) -> Result<()> {
        let ctx = self.live()?.clone();
        let dimensions = dimensions.into();
        let config = |e: resident_format::FormatError| {
            ResidentError::Configuration(format!("array `{}`: {e}", self.name))
        };
        let shape = Shape::from_dimensions(dimensions).map_err(config)?;
        let payload = data
            .map(|data| encode_upload(data, &self.profile, &shape))
            .transpose()
            .map_err(config)?;

        if ctx.verbose() {
            tracing::debug!(array = %self.name, ?dimensions, "resizing resident array");
        }

        slot::release(&mut *ctx.device()?, &mut self.slots);
        self.shape = shape;
        self.slots = slot::allocate(
            &ctx,
            &SlotLayout {
                name: &self.name,
                profile: &self.profile,
                shape: &self.shape,
                writable: self.writable,
                count: self.buffer_count,
            },
            payload.as_deref(),
        )?;
        Ok(())
    }

    /// Fills the current slot (or every slot) with the clear value.
    ///
    /// Writable arrays are cleared by running the constant-fill kernel through
    /// [`Scheduler::step`], which advances the ring once per targeted slot. Read-only arrays have
    /// no render target, so the clear pattern is uploaded directly and the ring does not move.
    pub fn clear(&mut self, scheduler: &mut dyn Scheduler, all: bool) -> Result<()> {
        let ctx = self.live()?.clone();
        if ctx.verbose() {
            tracing::debug!(array = %self.name, all, "clearing resident array");
        }

        if !self.writable {
            let bytes = encode_clear(&self.clear_value, &self.profile, &self.shape)?;
            return self.upload(&bytes, all);
        }

        if !scheduler.context().same_device(&ctx) {
            return Err(ResidentError::Precondition(format!(
                "array `{}` cannot be cleared by a scheduler on another device",
                self.name
            )));
        }
        let family = OutputFamily::for_storage(&self.profile.storage);
        let program = scheduler.fill_program(family)?;
        program.borrow_mut().set_uniform(
            FILL_VALUE_UNIFORM,
            UniformInput::Vector(self.clear_value.expand().to_vec()),
            family.uniform_type(),
        )?;
        let program = program.borrow();
        for _ in self.target_range(all) {
            scheduler.step(&program, &[], self)?;
        }
        Ok(())
    }

    /// Reads the current state back into a host array of the declared type.
    ///
    /// Binds this array's own render target for the duration of the read, so whatever was bound
    /// before is irrelevant and restored afterwards.
    pub fn read_to_host(&self) -> Result<ArrayData> {
        let ctx = self.live()?;
        if !self.writable {
            return Err(ResidentError::Precondition(format!(
                "array `{}` is not writable and has no render target to read from",
                self.name
            )));
        }
        let framebuffer = self.slots[self.buffer_index as usize]
            .framebuffer()
            .ok_or_else(|| {
                ResidentError::Precondition(format!(
                    "buffer {} of array `{}` has no render target",
                    self.buffer_index, self.name
                ))
            })?;

        let plan = ReadbackPlan::negotiate(&self.profile.storage, ctx.capabilities());
        let raw = {
            let mut bound = ctx.bind_framebuffer(framebuffer)?;
            let status = bound.framebuffer_status(framebuffer);
            if status != FramebufferStatus::Complete {
                return Err(ResidentError::Precondition(format!(
                    "unable to read array `{}` from render target with status: {status}",
                    self.name
                )));
            }
            bound
                .read_pixels(self.width(), self.height(), plan.layout, plan.element)
                .map_err(|source| DeviceResourceError::Readback {
                    name: self.name.clone(),
                    source,
                })?
        };
        Ok(decode_readback(&raw, &plan, &self.profile, &self.shape)?)
    }

    /// Copies every slot of `source` into this array and adopts its ring position.
    ///
    /// Both arrays must share format, shape and buffer count.
    pub fn copy_state_from(&mut self, source: &ResidentArray) -> Result<()> {
        let ctx = self.live()?;
        if !source.live()?.same_device(ctx) {
            return Err(ResidentError::Precondition(format!(
                "array `{}` lives on another device than `{}`",
                source.name, self.name
            )));
        }
        if self.profile != source.profile
            || self.shape != source.shape
            || self.buffer_count != source.buffer_count
        {
            return Err(ResidentError::Precondition(format!(
                "array `{}` is incompatible with `{}`",
                source.name, self.name
            )));
        }

        let mut errors = Vec::new();
        {
            let mut device = ctx.device()?;
            for (src, dst) in source.slots.iter().zip(&self.slots) {
                let (Some(src), Some(dst)) = (src.texture(), dst.texture()) else {
                    continue;
                };
                if let Err(err) = device.copy_texture(src, dst) {
                    errors.push(DeviceResourceError::Upload {
                        name: self.name.clone(),
                        source: err,
                    });
                }
            }
        }
        for err in errors {
            ctx.report(err);
        }
        self.buffer_index = source.buffer_index;
        Ok(())
    }
}
