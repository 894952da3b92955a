//! Format resolution: what a device can actually store for a declared array format.
//!
//! [`resolve`] is a pure lookup from `(declared type, component count, writable, capabilities)` to a
//! [`FormatProfile`]. Unsupported filter/wrap/channel combinations never fail; they fall back and
//! the change is recorded as a [`Fallback`] so callers can log it.

use core::fmt;

use crate::{DataType, DeviceCapabilities, DeviceFeatures, Filter, FormatError, Wrap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatRequest {
    pub ty: DataType,
    pub component_count: u8,
    pub writable: bool,
    pub filter: Filter,
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
}

/// Physical texel format of a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageFormat {
    pub ty: DataType,
    pub channels: u8,
    /// `false` only for 8-bit unsigned storage on devices without integer textures, which is
    /// held in a plain (non-integer) byte format.
    pub integer: bool,
}

impl StorageFormat {
    pub fn label(&self) -> String {
        let prefix = match self.channels {
            1 => "R",
            2 => "RG",
            3 => "RGB",
            _ => "RGBA",
        };
        let suffix = match self.ty {
            DataType::Float => "32F",
            DataType::HalfFloat => "16F",
            DataType::UnsignedByte if self.integer => "8UI",
            DataType::UnsignedByte => "8",
            DataType::Byte => "8I",
            DataType::UnsignedShort => "16UI",
            DataType::Short => "16I",
            DataType::UnsignedInt => "32UI",
            DataType::Int => "32I",
        };
        format!("{prefix}{suffix}")
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.ty.bytes_per_element() * self.channels as usize
    }

    /// Equivalent `wgpu` format. 3-channel formats have none.
    pub fn to_wgpu(&self) -> Option<wgpu::TextureFormat> {
        use wgpu::TextureFormat as F;

        let [r, rg, rgba] = match self.ty {
            DataType::Float => [F::R32Float, F::Rg32Float, F::Rgba32Float],
            DataType::HalfFloat => [F::R16Float, F::Rg16Float, F::Rgba16Float],
            DataType::UnsignedByte if self.integer => [F::R8Uint, F::Rg8Uint, F::Rgba8Uint],
            DataType::UnsignedByte => [F::R8Unorm, F::Rg8Unorm, F::Rgba8Unorm],
            DataType::Byte => [F::R8Sint, F::Rg8Sint, F::Rgba8Sint],
            DataType::UnsignedShort => [F::R16Uint, F::Rg16Uint, F::Rgba16Uint],
            DataType::Short => [F::R16Sint, F::Rg16Sint, F::Rgba16Sint],
            DataType::UnsignedInt => [F::R32Uint, F::Rg32Uint, F::Rgba32Uint],
            DataType::Int => [F::R32Sint, F::Rg32Sint, F::Rgba32Sint],
        };
        match self.channels {
            1 => Some(r),
            2 => Some(rg),
            4 => Some(rgba),
            _ => None,
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Resolved physical representation shared by every slot of one array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatProfile {
    pub declared: DataType,
    pub component_count: u8,
    pub storage: StorageFormat,
    pub filter: Filter,
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
}

impl FormatProfile {
    pub fn internal(&self) -> DataType {
        self.storage.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackField {
    InternalType,
    Channels,
    Filter,
    WrapS,
    WrapT,
}

impl fmt::Display for FallbackField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FallbackField::InternalType => "internal type",
            FallbackField::Channels => "channels",
            FallbackField::Filter => "filter",
            FallbackField::WrapS => "wrapS",
            FallbackField::WrapT => "wrapT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub field: FallbackField,
    pub requested: String,
    pub resolved: String,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is not supported, falling back to {}",
            self.field, self.requested, self.resolved
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub profile: FormatProfile,
    pub fallbacks: Vec<Fallback>,
}

pub fn resolve(request: FormatRequest, caps: &DeviceCapabilities) -> Result<Resolution, FormatError> {
    if !(1..=4).contains(&request.component_count) {
        return Err(FormatError::InvalidComponentCount(u32::from(
            request.component_count,
        )));
    }
    if request.filter == Filter::Linear && !request.ty.is_float() {
        return Err(FormatError::InterpolatedInteger(request.ty));
    }

    let mut fallbacks = Vec::new();
    let mut note = |field: FallbackField, requested: String, resolved: String| {
        if requested != resolved {
            fallbacks.push(Fallback {
                field,
                requested,
                resolved,
            });
        }
    };

    let (internal, integer) = internal_type(request.ty, request.writable, caps)?;
    note(
        FallbackField::InternalType,
        request.ty.to_string(),
        internal.to_string(),
    );

    let channels = physical_channels(request.component_count, request.writable, caps);
    note(
        FallbackField::Channels,
        request.component_count.to_string(),
        channels.to_string(),
    );

    let filter = match request.filter {
        Filter::Linear if linear_supported(internal, caps) => Filter::Linear,
        _ => Filter::Nearest,
    };
    note(
        FallbackField::Filter,
        request.filter.to_string(),
        filter.to_string(),
    );

    let wrap_s = resolve_wrap(request.wrap_s, caps);
    note(
        FallbackField::WrapS,
        request.wrap_s.to_string(),
        wrap_s.to_string(),
    );
    let wrap_t = resolve_wrap(request.wrap_t, caps);
    note(
        FallbackField::WrapT,
        request.wrap_t.to_string(),
        wrap_t.to_string(),
    );

    Ok(Resolution {
        profile: FormatProfile {
            declared: request.ty,
            component_count: request.component_count,
            storage: StorageFormat {
                ty: internal,
                channels,
                integer,
            },
            filter,
            wrap_s,
            wrap_t,
        },
        fallbacks,
    })
}

fn internal_type(
    ty: DataType,
    writable: bool,
    caps: &DeviceCapabilities,
) -> Result<(DataType, bool), FormatError> {
    if ty.is_integer() {
        if caps.supports(DeviceFeatures::INTEGER_TEXTURES) {
            return Ok((ty, true));
        }
        // Plain byte storage is universally available.
        if ty == DataType::UnsignedByte {
            return Ok((ty, false));
        }
    }
    // binary16 holds every 8-bit integer exactly; binary32 holds 16/32-bit integers up to 2^24.
    let preferred = match ty {
        DataType::HalfFloat | DataType::Byte => DataType::HalfFloat,
        _ => DataType::Float,
    };
    let alternate = match preferred {
        DataType::HalfFloat => DataType::Float,
        _ => DataType::HalfFloat,
    };
    [preferred, alternate]
        .into_iter()
        .find(|&candidate| float_storable(candidate, writable, caps))
        .map(|internal| (internal, false))
        .ok_or(FormatError::Unsupported { ty, writable })
}

fn float_storable(ty: DataType, writable: bool, caps: &DeviceCapabilities) -> bool {
    let (storage, render) = match ty {
        DataType::Float => (DeviceFeatures::FLOAT_TEXTURES, DeviceFeatures::RENDER_TO_FLOAT),
        DataType::HalfFloat => (
            DeviceFeatures::HALF_FLOAT_TEXTURES,
            DeviceFeatures::RENDER_TO_HALF_FLOAT,
        ),
        _ => return false,
    };
    caps.supports(storage) && (!writable || caps.supports(render))
}

fn physical_channels(component_count: u8, writable: bool, caps: &DeviceCapabilities) -> u8 {
    match component_count {
        3 => {
            let rgb = caps.supports(DeviceFeatures::RGB_STORAGE)
                && (!writable || caps.supports(DeviceFeatures::RENDER_TO_RGB));
            if rgb {
                3
            } else {
                4
            }
        }
        1 | 2 if caps.supports(DeviceFeatures::SINGLE_CHANNEL_FORMATS) => component_count,
        _ => 4,
    }
}

fn linear_supported(internal: DataType, caps: &DeviceCapabilities) -> bool {
    match internal {
        DataType::Float => caps.supports(DeviceFeatures::FLOAT_LINEAR),
        DataType::HalfFloat => caps.supports(DeviceFeatures::HALF_FLOAT_LINEAR),
        _ => false,
    }
}

fn resolve_wrap(wrap: Wrap, caps: &DeviceCapabilities) -> Wrap {
    match wrap {
        Wrap::ClampToEdge => Wrap::ClampToEdge,
        _ if caps.supports(DeviceFeatures::NPOT_WRAP) => wrap,
        _ => Wrap::ClampToEdge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(ty: DataType, component_count: u8, writable: bool) -> FormatRequest {
        FormatRequest {
            ty,
            component_count,
            writable,
            filter: Filter::Nearest,
            wrap_s: Wrap::ClampToEdge,
            wrap_t: Wrap::ClampToEdge,
        }
    }

    #[test]
    fn modern_profile_stores_everything_natively() {
        let caps = DeviceCapabilities::gles3();
        for ty in DataType::ALL {
            for count in [1, 2, 4] {
                let resolution = resolve(request(ty, count, true), &caps).unwrap();
                assert_eq!(resolution.profile.internal(), ty);
                assert_eq!(resolution.profile.storage.channels, count);
                assert_eq!(resolution.profile.storage.integer, ty.is_integer());
                assert!(resolution.fallbacks.is_empty(), "{ty} x{count}");
            }
        }
    }

    #[test]
    fn writable_rgb_is_promoted_without_rgb_render_targets() {
        let caps = DeviceCapabilities::gles3();
        let writable = resolve(request(DataType::Float, 3, true), &caps).unwrap();
        assert_eq!(writable.profile.storage.channels, 4);
        assert_eq!(writable.fallbacks[0].field, FallbackField::Channels);

        let read_only = resolve(request(DataType::Float, 3, false), &caps).unwrap();
        assert_eq!(read_only.profile.storage.channels, 3);
        assert_eq!(read_only.profile.storage.to_wgpu(), None);
    }

    #[test]
    fn legacy_profile_promotes_integers_to_floats() {
        let caps = DeviceCapabilities::gles2();
        let expect = [
            (DataType::UnsignedByte, DataType::UnsignedByte),
            (DataType::Byte, DataType::HalfFloat),
            (DataType::UnsignedShort, DataType::HalfFloat),
            (DataType::Short, DataType::HalfFloat),
            (DataType::UnsignedInt, DataType::HalfFloat),
            (DataType::Int, DataType::HalfFloat),
            // No float render targets; half floats are renderable.
            (DataType::Float, DataType::HalfFloat),
            (DataType::HalfFloat, DataType::HalfFloat),
        ];
        for (declared, internal) in expect {
            let profile = resolve(request(declared, 1, true), &caps).unwrap().profile;
            assert_eq!(profile.internal(), internal, "{declared}");
            assert_eq!(profile.storage.channels, 4);
            assert!(!profile.storage.integer);
        }

        let read_only = resolve(request(DataType::Int, 1, false), &caps).unwrap().profile;
        assert_eq!(read_only.internal(), DataType::Float);
    }

    #[test]
    fn no_float_support_is_an_error() {
        let caps = DeviceCapabilities::new(
            DeviceFeatures::SINGLE_CHANNEL_FORMATS,
            crate::ReadbackQuirks::empty(),
        );
        assert_eq!(
            resolve(request(DataType::Float, 1, false), &caps),
            Err(FormatError::Unsupported {
                ty: DataType::Float,
                writable: false
            })
        );
        // Plain bytes still work.
        assert!(resolve(request(DataType::UnsignedByte, 1, true), &caps).is_ok());
    }

    #[test]
    fn linear_filter_falls_back_when_not_filterable() {
        let caps = DeviceCapabilities::gles3().without_linear_filtering();
        let mut req = request(DataType::Float, 1, false);
        req.filter = Filter::Linear;
        let resolution = resolve(req, &caps).unwrap();
        assert_eq!(resolution.profile.filter, Filter::Nearest);
        assert_eq!(
            resolution.fallbacks,
            vec![Fallback {
                field: FallbackField::Filter,
                requested: "LINEAR".into(),
                resolved: "NEAREST".into(),
            }]
        );

        let resolution = resolve(req, &DeviceCapabilities::gles3()).unwrap();
        assert_eq!(resolution.profile.filter, Filter::Linear);
    }

    #[test]
    fn linear_filter_on_integer_type_is_rejected() {
        let mut req = request(DataType::Short, 1, false);
        req.filter = Filter::Linear;
        assert_eq!(
            resolve(req, &DeviceCapabilities::gles3()),
            Err(FormatError::InterpolatedInteger(DataType::Short))
        );
    }

    #[test]
    fn repeat_wrap_needs_npot_support() {
        let mut req = request(DataType::Float, 4, false);
        req.wrap_s = Wrap::Repeat;
        req.wrap_t = Wrap::MirroredRepeat;
        let legacy = resolve(req, &DeviceCapabilities::gles2()).unwrap().profile;
        assert_eq!((legacy.wrap_s, legacy.wrap_t), (Wrap::ClampToEdge, Wrap::ClampToEdge));
        let modern = resolve(req, &DeviceCapabilities::gles3()).unwrap().profile;
        assert_eq!((modern.wrap_s, modern.wrap_t), (Wrap::Repeat, Wrap::MirroredRepeat));
    }

    #[test]
    fn component_count_is_bounded() {
        let caps = DeviceCapabilities::gles3();
        assert_eq!(
            resolve(request(DataType::Float, 5, false), &caps),
            Err(FormatError::InvalidComponentCount(5))
        );
        assert!(resolve(request(DataType::Float, 0, false), &caps).is_err());
    }

    #[test]
    fn storage_labels_and_wgpu_formats() {
        let format = StorageFormat {
            ty: DataType::HalfFloat,
            channels: 4,
            integer: false,
        };
        assert_eq!(format.label(), "RGBA16F");
        assert_eq!(format.bytes_per_texel(), 8);
        assert_eq!(format.to_wgpu(), Some(wgpu::TextureFormat::Rgba16Float));

        let bytes = StorageFormat {
            ty: DataType::UnsignedByte,
            channels: 2,
            integer: false,
        };
        assert_eq!(bytes.label(), "RG8");
        assert_eq!(bytes.to_wgpu(), Some(wgpu::TextureFormat::Rg8Unorm));
    }
}
