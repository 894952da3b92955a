//! Conversion between host arrays and device texel bytes.
//!
//! Host data is always in the declared type, channel-major and tightly packed. Device bytes are in
//! the profile's internal type with `storage.channels` channels per texel, native endian. Half
//! floats are encoded with `half` (round-to-nearest-even, which is exact for every value binary16
//! can represent).

use half::f16;

use crate::{
    ArrayData, ClearValue, DataType, DeviceCapabilities, FormatError, FormatProfile,
    ReadbackQuirks, Shape, StorageFormat,
};

/// Writes `value` into `dst` as one element of `ty`.
///
/// Integer targets round and saturate; callers validate ranges beforehand.
pub fn write_scalar(value: f64, ty: DataType, dst: &mut [u8]) {
    match ty {
        DataType::Float => dst[..4].copy_from_slice(&(value as f32).to_ne_bytes()),
        DataType::HalfFloat => dst[..2].copy_from_slice(&f16::from_f64(value).to_ne_bytes()),
        DataType::UnsignedByte => dst[0] = value.round() as u8,
        DataType::Byte => dst[0] = (value.round() as i8) as u8,
        DataType::UnsignedShort => dst[..2].copy_from_slice(&(value.round() as u16).to_ne_bytes()),
        DataType::Short => dst[..2].copy_from_slice(&(value.round() as i16).to_ne_bytes()),
        DataType::UnsignedInt => dst[..4].copy_from_slice(&(value.round() as u32).to_ne_bytes()),
        DataType::Int => dst[..4].copy_from_slice(&(value.round() as i32).to_ne_bytes()),
    }
}

/// Reads one element of `ty` from the start of `src`.
pub fn read_scalar(src: &[u8], ty: DataType) -> f64 {
    let n = ty.bytes_per_element();
    let src = &src[..n];
    match ty {
        DataType::Float => bytemuck::pod_read_unaligned::<f32>(src) as f64,
        DataType::HalfFloat => bytemuck::pod_read_unaligned::<f16>(src).to_f64(),
        DataType::UnsignedByte => src[0] as f64,
        DataType::Byte => src[0] as i8 as f64,
        DataType::UnsignedShort => bytemuck::pod_read_unaligned::<u16>(src) as f64,
        DataType::Short => bytemuck::pod_read_unaligned::<i16>(src) as f64,
        DataType::UnsignedInt => bytemuck::pod_read_unaligned::<u32>(src) as f64,
        DataType::Int => bytemuck::pod_read_unaligned::<i32>(src) as f64,
    }
}

/// Size in bytes of a full texture in `storage` format.
pub fn texture_size(storage: &StorageFormat, shape: &Shape) -> Result<usize, FormatError> {
    (shape.width() as usize)
        .checked_mul(shape.height() as usize)
        .and_then(|texels| texels.checked_mul(storage.bytes_per_texel()))
        .ok_or(FormatError::TooLarge {
            width: shape.width(),
            height: shape.height(),
        })
}

/// Encodes a host array for upload into every texel of a slot.
pub fn encode_upload(
    data: &ArrayData,
    profile: &FormatProfile,
    shape: &Shape,
) -> Result<Vec<u8>, FormatError> {
    validate_host_array(data, profile, shape)?;

    let storage = profile.storage;
    let components = profile.component_count as usize;
    if storage.ty == profile.declared
        && storage.channels as usize == components
        && shape.logical_len() == shape.texel_count()
    {
        return Ok(data.as_bytes().to_vec());
    }

    let element = storage.ty.bytes_per_element();
    let texel = storage.bytes_per_texel();
    let mut out = vec![0u8; texture_size(&storage, shape)?];
    for i in 0..shape.logical_len() {
        for c in 0..components {
            let offset = i * texel + c * element;
            write_scalar(data.value(i * components + c), storage.ty, &mut out[offset..]);
        }
    }
    Ok(out)
}

/// Checks a host array against the declared type and `(components, logical length)`.
pub fn validate_host_array(
    data: &ArrayData,
    profile: &FormatProfile,
    shape: &Shape,
) -> Result<(), FormatError> {
    check_host_array(data, profile.declared, profile.component_count, shape)
}

/// Checks a host array holds `component_count` values of `ty` per logical element of `shape`.
pub fn check_host_array(
    data: &ArrayData,
    ty: DataType,
    component_count: u8,
    shape: &Shape,
) -> Result<(), FormatError> {
    if data.data_type() != ty {
        return Err(FormatError::TypeMismatch {
            expected: ty,
            found: data.data_type(),
        });
    }
    let expected = shape
        .logical_len()
        .checked_mul(component_count as usize)
        .ok_or(FormatError::TooLarge {
            width: shape.width(),
            height: shape.height(),
        })?;
    if data.len() != expected {
        return Err(FormatError::LengthMismatch {
            expected,
            found: data.len(),
        });
    }
    Ok(())
}

/// Internal-type byte pattern for a clear value.
///
/// Channel `k` of every logical texel receives `clear.expand()[k]`; padding texels of 1-D arrays
/// stay zero.
pub fn encode_clear(
    clear: &ClearValue,
    profile: &FormatProfile,
    shape: &Shape,
) -> Result<Vec<u8>, FormatError> {
    let storage = profile.storage;
    let element = storage.ty.bytes_per_element();
    let texel = storage.bytes_per_texel();

    let mut pattern = vec![0u8; texel];
    for (k, value) in clear.expand().into_iter().take(storage.channels as usize).enumerate() {
        write_scalar(value, storage.ty, &mut pattern[k * element..]);
    }

    let mut out = vec![0u8; texture_size(&storage, shape)?];
    for dst in out.chunks_exact_mut(texel).take(shape.logical_len()) {
        dst.copy_from_slice(&pattern);
    }
    Ok(out)
}

/// Pixel layout requested from the device on readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// The storage format's own channel count.
    Native,
    /// Four channels, non-integer.
    Rgba,
    /// Four channels, integer.
    RgbaInteger,
}

/// The `(layout, element)` pair a readback uses, and the resulting channels per texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadbackPlan {
    pub layout: PixelLayout,
    pub element: DataType,
    pub channels: u8,
}

impl ReadbackPlan {
    pub fn native(storage: &StorageFormat) -> Self {
        Self {
            layout: PixelLayout::Native,
            element: storage.ty,
            channels: storage.channels,
        }
    }

    /// Picks a readback pair the device will accept for `storage`.
    pub fn negotiate(storage: &StorageFormat, caps: &DeviceCapabilities) -> Self {
        let rgba = |layout, element| Self {
            layout,
            element,
            channels: 4,
        };
        let quirk = |q| caps.readback.contains(q);
        match storage.ty {
            DataType::Float if quirk(ReadbackQuirks::FLOAT_REQUIRES_RGBA) => {
                rgba(PixelLayout::Rgba, DataType::Float)
            }
            DataType::HalfFloat if quirk(ReadbackQuirks::HALF_FLOAT_AS_FLOAT) => {
                rgba(PixelLayout::Rgba, DataType::Float)
            }
            DataType::UnsignedByte if !storage.integer => {
                rgba(PixelLayout::Rgba, DataType::UnsignedByte)
            }
            ty if ty.is_unsigned_integer() && quirk(ReadbackQuirks::UNSIGNED_AS_RGBA_U32) => {
                rgba(PixelLayout::RgbaInteger, DataType::UnsignedInt)
            }
            ty if ty.is_signed_integer() => rgba(PixelLayout::RgbaInteger, DataType::Int),
            _ => Self::native(storage),
        }
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.element.bytes_per_element() * self.channels as usize
    }
}

/// Decodes raw readback bytes into a host array of the declared type.
///
/// Channels beyond `component_count` are dropped and 1-D padding texels are truncated.
pub fn decode_readback(
    raw: &[u8],
    plan: &ReadbackPlan,
    profile: &FormatProfile,
    shape: &Shape,
) -> Result<ArrayData, FormatError> {
    let expected = shape
        .texel_count()
        .checked_mul(plan.bytes_per_texel())
        .ok_or(FormatError::TooLarge {
            width: shape.width(),
            height: shape.height(),
        })?;
    if raw.len() < expected {
        return Err(FormatError::LengthMismatch {
            expected,
            found: raw.len(),
        });
    }

    let components = profile.component_count as usize;
    let element = plan.element.bytes_per_element();
    let texel = plan.bytes_per_texel();
    let mut values = Vec::with_capacity(shape.logical_len() * components);
    for i in 0..shape.logical_len() {
        for c in 0..components {
            let offset = i * texel + c * element;
            values.push(read_scalar(&raw[offset..], plan.element));
        }
    }
    Ok(ArrayData::from_f64_saturating(profile.declared, &values))
}
