use resident_format::{FormatProfile, Shape};

use crate::context::GpuContext;
use crate::error::{DeviceResourceError, Result};
use crate::hal::{FramebufferId, FramebufferStatus, GpuDevice, TextureDesc, TextureId};

/// One historical state of a resident array.
///
/// A slot exclusively owns its storage and, for writable arrays, the render target attached to
/// it. `Empty` marks a slot whose allocation failed and was reported through the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    Owned {
        texture: TextureId,
        framebuffer: Option<FramebufferId>,
    },
    Empty,
}

impl BufferSlot {
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            BufferSlot::Owned { texture, .. } => Some(*texture),
            BufferSlot::Empty => None,
        }
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        match self {
            BufferSlot::Owned { framebuffer, .. } => *framebuffer,
            BufferSlot::Empty => None,
        }
    }
}

pub(crate) struct SlotLayout<'a> {
    pub name: &'a str,
    pub profile: &'a FormatProfile,
    pub shape: &'a Shape,
    pub writable: bool,
    pub count: u32,
}

/// Allocates `layout.count` slots, each seeded with `payload` or zero-filled.
///
/// Failures never abort: the affected slot is left empty (or without a render target) and the
/// error is delivered to the context's callback once the device is released.
pub(crate) fn allocate(
    ctx: &GpuContext,
    layout: &SlotLayout<'_>,
    payload: Option<&[u8]>,
) -> Result<Vec<BufferSlot>> {
    let desc = TextureDesc {
        label: layout.name.to_string(),
        width: layout.shape.width(),
        height: layout.shape.height(),
        format: layout.profile.storage,
        filter: layout.profile.filter,
        wrap_s: layout.profile.wrap_s,
        wrap_t: layout.profile.wrap_t,
    };

    let mut errors = Vec::new();
    let mut slots = Vec::with_capacity(layout.count as usize);
    {
        let mut device = ctx.device()?;
        for _ in 0..layout.count {
            slots.push(allocate_one(&mut *device, &desc, layout, payload, &mut errors));
        }
    }
    for err in errors {
        ctx.report(err);
    }
    Ok(slots)
}

fn allocate_one(
    device: &mut dyn GpuDevice,
    desc: &TextureDesc,
    layout: &SlotLayout<'_>,
    payload: Option<&[u8]>,
    errors: &mut Vec<DeviceResourceError>,
) -> BufferSlot {
    let name = || layout.name.to_string();

    let texture = match device.create_texture(desc) {
        Ok(texture) => texture,
        Err(source) => {
            errors.push(DeviceResourceError::StorageAllocation {
                name: name(),
                source,
            });
            return BufferSlot::Empty;
        }
    };
    if let Err(source) = device.upload_texture(texture, payload) {
        errors.push(DeviceResourceError::Upload {
            name: name(),
            source,
        });
    }
    if !layout.writable {
        return BufferSlot::Owned {
            texture,
            framebuffer: None,
        };
    }

    let framebuffer = match device.create_framebuffer(texture) {
        Ok(framebuffer) => framebuffer,
        Err(source) => {
            errors.push(DeviceResourceError::RenderTargetAllocation {
                name: name(),
                source,
            });
            return BufferSlot::Owned {
                texture,
                framebuffer: None,
            };
        }
    };
    let status = device.framebuffer_status(framebuffer);
    if status != FramebufferStatus::Complete {
        errors.push(DeviceResourceError::IncompleteRenderTarget {
            name: name(),
            status: status.to_string(),
        });
    }
    BufferSlot::Owned {
        texture,
        framebuffer: Some(framebuffer),
    }
}

pub(crate) fn release(device: &mut dyn GpuDevice, slots: &mut Vec<BufferSlot>) {
    for slot in slots.drain(..) {
        if let BufferSlot::Owned {
            texture,
            framebuffer,
        } = slot
        {
            if let Some(framebuffer) = framebuffer {
                device.destroy_framebuffer(framebuffer);
            }
            device.destroy_texture(texture);
        }
    }
}
