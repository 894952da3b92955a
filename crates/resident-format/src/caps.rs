//! Device capability profiles.
//!
//! A [`DeviceCapabilities`] value is everything the format resolver and readback planner need to
//! know about a device. Profiles can come from a preset (tests, headless use) or be negotiated from
//! a `wgpu` adapter.
//!
//! CI note: linear filtering of float textures is the most common driver-dependent path, so it can
//! be forced off with `RESIDENT_DISABLE_FLOAT_LINEAR=1`.

use bitflags::bitflags;

/// Env var that removes both linear-filtering features from a negotiated profile.
///
/// Useful for deterministic fallback testing (forces the `Linear -> Nearest` resolution path).
pub const DISABLE_FLOAT_LINEAR_ENV: &str = "RESIDENT_DISABLE_FLOAT_LINEAR";

bitflags! {
    /// Storage, filtering and rendering features of a device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u32 {
        /// Native signed/unsigned integer texture formats.
        const INTEGER_TEXTURES = 1 << 0;
        const FLOAT_TEXTURES = 1 << 1;
        const HALF_FLOAT_TEXTURES = 1 << 2;
        const FLOAT_LINEAR = 1 << 3;
        const HALF_FLOAT_LINEAR = 1 << 4;
        const RENDER_TO_FLOAT = 1 << 5;
        const RENDER_TO_HALF_FLOAT = 1 << 6;
        /// R and RG storage formats.
        const SINGLE_CHANNEL_FORMATS = 1 << 7;
        /// 3-channel storage formats.
        const RGB_STORAGE = 1 << 8;
        const RENDER_TO_RGB = 1 << 9;
        /// REPEAT / MIRRORED_REPEAT on non-power-of-two textures.
        const NPOT_WRAP = 1 << 10;
    }
}

bitflags! {
    /// Restrictions on which (layout, element) pairs `readPixels` accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReadbackQuirks: u32 {
        /// Float render targets can only be read back as RGBA/f32.
        const FLOAT_REQUIRES_RGBA = 1 << 0;
        /// Half-float render targets can only be read back as RGBA/f32.
        const HALF_FLOAT_AS_FLOAT = 1 << 1;
        /// Unsigned integer render targets can only be read back as RGBA_INTEGER/u32.
        const UNSIGNED_AS_RGBA_U32 = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    pub features: DeviceFeatures,
    pub readback: ReadbackQuirks,
}

impl DeviceCapabilities {
    pub const fn new(features: DeviceFeatures, readback: ReadbackQuirks) -> Self {
        Self { features, readback }
    }

    /// Modern GLES3-class profile with the strict readback rules most browsers enforce.
    pub fn gles3() -> Self {
        Self {
            features: DeviceFeatures::all().difference(DeviceFeatures::RENDER_TO_RGB),
            readback: ReadbackQuirks::all(),
        }
    }

    /// Legacy GLES2-class profile: no integer or single-channel formats, no float rendering, and
    /// float linear filtering missing.
    pub fn gles2() -> Self {
        Self {
            features: DeviceFeatures::FLOAT_TEXTURES
                | DeviceFeatures::HALF_FLOAT_TEXTURES
                | DeviceFeatures::HALF_FLOAT_LINEAR
                | DeviceFeatures::RENDER_TO_HALF_FLOAT
                | DeviceFeatures::RGB_STORAGE
                | DeviceFeatures::RENDER_TO_RGB,
            readback: ReadbackQuirks::FLOAT_REQUIRES_RGBA | ReadbackQuirks::HALF_FLOAT_AS_FLOAT,
        }
    }

    /// Negotiates a profile from a `wgpu` adapter's features and downlevel flags.
    ///
    /// `wgpu` has no 3-channel formats and reads back any copyable format natively, so the
    /// result never carries RGB storage or readback quirks.
    pub fn from_wgpu(features: wgpu::Features, downlevel: wgpu::DownlevelFlags) -> Self {
        Self::from_wgpu_with_overrides(
            features,
            downlevel,
            env_var_truthy(DISABLE_FLOAT_LINEAR_ENV),
        )
    }

    fn from_wgpu_with_overrides(
        features: wgpu::Features,
        downlevel: wgpu::DownlevelFlags,
        disable_float_linear: bool,
    ) -> Self {
        let mut negotiated = DeviceFeatures::INTEGER_TEXTURES
            | DeviceFeatures::FLOAT_TEXTURES
            | DeviceFeatures::HALF_FLOAT_TEXTURES
            | DeviceFeatures::HALF_FLOAT_LINEAR
            | DeviceFeatures::RENDER_TO_FLOAT
            | DeviceFeatures::RENDER_TO_HALF_FLOAT
            | DeviceFeatures::SINGLE_CHANNEL_FORMATS;

        // 32-bit float filtering is an optional feature in WebGPU.
        if features.contains(wgpu::Features::FLOAT32_FILTERABLE) {
            negotiated |= DeviceFeatures::FLOAT_LINEAR;
        }
        if downlevel.contains(wgpu::DownlevelFlags::NON_POWER_OF_TWO_MIPMAPPED_TEXTURES) {
            negotiated |= DeviceFeatures::NPOT_WRAP;
        }

        let caps = Self::new(negotiated, ReadbackQuirks::empty());
        if disable_float_linear {
            caps.without_linear_filtering()
        } else {
            caps
        }
    }

    /// Applies `RESIDENT_DISABLE_FLOAT_LINEAR` to an arbitrary profile.
    pub fn with_env_overrides(self) -> Self {
        if env_var_truthy(DISABLE_FLOAT_LINEAR_ENV) {
            self.without_linear_filtering()
        } else {
            self
        }
    }

    pub fn without_linear_filtering(mut self) -> Self {
        self.features
            .remove(DeviceFeatures::FLOAT_LINEAR | DeviceFeatures::HALF_FLOAT_LINEAR);
        self
    }

    pub fn supports(&self, features: DeviceFeatures) -> bool {
        self.features.contains(features)
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::gles3()
    }
}

fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}
