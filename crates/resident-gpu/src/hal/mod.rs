//! Device abstraction.
//!
//! Resident arrays and compute programs only talk to the device through [`GpuDevice`], a small
//! GL-shaped surface: textures, framebuffers (render targets), linked programs with uniforms, and a
//! full-viewport draw. For tests and headless use we provide a deterministic software device.

mod soft;

use core::fmt;

use resident_format::{DataType, DeviceCapabilities, Filter, PixelLayout, StorageFormat, Wrap};
use thiserror::Error;

pub use soft::{Fragment, SoftDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Uniform slot within the program it was looked up from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: StorageFormat,
    pub filter: Filter,
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// The attached format cannot be rendered to on this device.
    IncompleteAttachment,
    Missing,
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::IncompleteAttachment => write!(f, "incomplete attachment"),
            Self::Missing => write!(f, "missing framebuffer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid resource")]
    InvalidResource,
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("link failed: {0}")]
    LinkFailed(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// The eight concrete uniform kinds: float or int, one to four components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float1,
    Float2,
    Float3,
    Float4,
    Int1,
    Int2,
    Int3,
    Int4,
}

impl UniformKind {
    pub fn new(is_float: bool, components: usize) -> Option<Self> {
        Some(match (is_float, components) {
            (true, 1) => Self::Float1,
            (true, 2) => Self::Float2,
            (true, 3) => Self::Float3,
            (true, 4) => Self::Float4,
            (false, 1) => Self::Int1,
            (false, 2) => Self::Int2,
            (false, 3) => Self::Int3,
            (false, 4) => Self::Int4,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float1 | Self::Float2 | Self::Float3 | Self::Float4)
    }

    pub fn components(self) -> usize {
        match self {
            Self::Float1 | Self::Int1 => 1,
            Self::Float2 | Self::Int2 => 2,
            Self::Float3 | Self::Int3 => 3,
            Self::Float4 | Self::Int4 => 4,
        }
    }

    /// GLSL spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Float1 => "float",
            Self::Float2 => "vec2",
            Self::Float3 => "vec3",
            Self::Float4 => "vec4",
            Self::Int1 => "int",
            Self::Int2 => "ivec2",
            Self::Int3 => "ivec3",
            Self::Int4 => "ivec4",
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A uniform value in its exact upload form. Single values use the scalar variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float1(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Int1(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float1(_) => UniformKind::Float1,
            Self::Float2(_) => UniformKind::Float2,
            Self::Float3(_) => UniformKind::Float3,
            Self::Float4(_) => UniformKind::Float4,
            Self::Int1(_) => UniformKind::Int1,
            Self::Int2(_) => UniformKind::Int2,
            Self::Int3(_) => UniformKind::Int3,
            Self::Int4(_) => UniformKind::Int4,
        }
    }

    /// Components widened to `f64`, zero padded to four.
    pub fn to_vec4(&self) -> [f64; 4] {
        fn pad<T: Copy + Into<f64>>(values: &[T]) -> [f64; 4] {
            let mut out = [0.0; 4];
            for (dst, src) in out.iter_mut().zip(values) {
                *dst = (*src).into();
            }
            out
        }
        match self {
            Self::Float1(v) => pad(&[*v]),
            Self::Float2(v) => pad(v),
            Self::Float3(v) => pad(v),
            Self::Float4(v) => pad(v),
            Self::Int1(v) => pad(&[*v]),
            Self::Int2(v) => pad(v),
            Self::Int3(v) => pad(v),
            Self::Int4(v) => pad(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub location: UniformLocation,
    pub kind: UniformKind,
}

/// GL-shaped device surface used by resident arrays and compute programs.
///
/// Like GL, the device carries implicit state: the bound framebuffer, the program in use, and the
/// textures bound to sampler units. Callers scope framebuffer changes with
/// [`crate::BoundFramebuffer`].
pub trait GpuDevice {
    fn capabilities(&self) -> DeviceCapabilities;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError>;
    /// Replaces the full contents of a texture; `None` zero-fills it.
    fn upload_texture(&mut self, id: TextureId, data: Option<&[u8]>) -> Result<(), BackendError>;
    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> Result<(), BackendError>;
    fn destroy_texture(&mut self, id: TextureId);

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, BackendError>;
    fn framebuffer_status(&self, id: FramebufferId) -> FramebufferStatus;
    fn destroy_framebuffer(&mut self, id: FramebufferId);
    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) -> Result<(), BackendError>;
    fn bound_framebuffer(&self) -> Option<FramebufferId>;
    /// Reads `width x height` texels from the bound framebuffer, tightly packed.
    fn read_pixels(
        &mut self,
        width: u32,
        height: u32,
        layout: PixelLayout,
        element: DataType,
    ) -> Result<Vec<u8>, BackendError>;

    fn link_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramId, BackendError>;
    fn use_program(&mut self, id: Option<ProgramId>) -> Result<(), BackendError>;
    /// Looks up an active uniform; `None` if the program does not use it.
    fn uniform_slot(&self, program: ProgramId, name: &str) -> Option<UniformSlot>;
    /// Sets a uniform on the program in use.
    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), BackendError>;
    fn destroy_program(&mut self, id: ProgramId);

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> Result<(), BackendError>;
    /// Runs the program in use over every texel of the bound framebuffer.
    fn draw(&mut self, width: u32, height: u32) -> Result<(), BackendError>;
}
