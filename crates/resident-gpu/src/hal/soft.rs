use std::rc::Rc;

use hashbrown::HashMap;
use resident_format::codec::{read_scalar, write_scalar};
use resident_format::{DataType, DeviceCapabilities, DeviceFeatures, PixelLayout, ReadbackQuirks, Wrap};

use super::{
    BackendError, FramebufferId, FramebufferStatus, GpuDevice, ProgramId, TextureDesc, TextureId,
    UniformKind, UniformLocation, UniformSlot, UniformValue,
};
use crate::kernels::{fill_kernel_source, OutputFamily, FILL_VALUE_UNIFORM};

type KernelFn = dyn Fn(&Fragment<'_>) -> [f64; 4];

struct SoftKernel {
    uniforms: Vec<(String, UniformKind)>,
    run: Box<KernelFn>,
}

struct SoftTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

impl SoftTexture {
    fn texel(&self, x: u32, y: u32) -> [f64; 4] {
        let format = self.desc.format;
        let element = format.ty.bytes_per_element();
        let offset = (y as usize * self.desc.width as usize + x as usize) * format.bytes_per_texel();
        let mut out = [0.0, 0.0, 0.0, 1.0];
        for (c, dst) in out.iter_mut().take(format.channels as usize).enumerate() {
            *dst = read_scalar(&self.data[offset + c * element..], format.ty);
        }
        out
    }
}

struct SoftProgram {
    kernel: Rc<SoftKernel>,
    values: Vec<Option<UniformValue>>,
}

/// Invocation context handed to software kernels: one output texel.
pub struct Fragment<'a> {
    pub x: u32,
    pub y: u32,
    program: &'a SoftProgram,
    device: &'a SoftDevice,
}

impl Fragment<'_> {
    /// Current value of a declared uniform, zero padded; unset uniforms read as zero.
    pub fn uniform(&self, name: &str) -> [f64; 4] {
        self.program
            .kernel
            .uniforms
            .iter()
            .position(|(n, _)| n == name)
            .and_then(|i| self.program.values[i])
            .map(|v| v.to_vec4())
            .unwrap_or([0.0; 4])
    }

    /// Texel of the texture bound to `unit`, with the texture's wrap modes applied.
    ///
    /// Missing channels read as `(0, 0, 0, 1)`; an empty unit reads as `(0, 0, 0, 1)`.
    pub fn texel(&self, unit: u32, x: i64, y: i64) -> [f64; 4] {
        let Some(texture) = self
            .device
            .units
            .get(&unit)
            .and_then(|id| self.device.textures.get(id))
        else {
            return [0.0, 0.0, 0.0, 1.0];
        };
        let x = wrap_coord(x, texture.desc.width, texture.desc.wrap_s);
        let y = wrap_coord(y, texture.desc.height, texture.desc.wrap_t);
        texture.texel(x, y)
    }

    /// Texel of `unit` at this fragment's own position.
    pub fn input(&self, unit: u32) -> [f64; 4] {
        self.texel(unit, i64::from(self.x), i64::from(self.y))
    }
}

fn wrap_coord(coord: i64, size: u32, wrap: Wrap) -> u32 {
    let size = i64::from(size);
    let wrapped = match wrap {
        Wrap::ClampToEdge => coord.clamp(0, size - 1),
        Wrap::Repeat => coord.rem_euclid(size),
        Wrap::MirroredRepeat => {
            let period = coord.rem_euclid(2 * size);
            if period < size {
                period
            } else {
                2 * size - 1 - period
            }
        }
    };
    wrapped as u32
}

/// Deterministic in-memory device.
///
/// Texel bytes are stored exactly as uploaded (native endian, `desc.format` layout). Plain
/// (non-integer) byte storage holds the numeric value directly rather than a normalized one.
/// Kernels are Rust closures registered against their fragment source; the constant-fill kernels
/// are registered up front.
pub struct SoftDevice {
    caps: DeviceCapabilities,
    next_id: u32,
    texture_limit: Option<usize>,
    kernels: HashMap<String, Rc<SoftKernel>>,
    textures: HashMap<TextureId, SoftTexture>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    programs: HashMap<ProgramId, SoftProgram>,
    units: HashMap<u32, TextureId>,
    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
}

impl SoftDevice {
    pub fn new(caps: DeviceCapabilities) -> Self {
        let mut device = Self {
            caps,
            next_id: 1,
            texture_limit: None,
            kernels: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            units: HashMap::new(),
            bound_framebuffer: None,
            current_program: None,
        };
        for family in OutputFamily::ALL {
            let uniform = match family {
                OutputFamily::Float => UniformKind::Float4,
                OutputFamily::Int | OutputFamily::Uint => UniformKind::Int4,
            };
            device.register_kernel(
                fill_kernel_source(family),
                &[(FILL_VALUE_UNIFORM, uniform)],
                move |frag| {
                    let value = frag.uniform(FILL_VALUE_UNIFORM);
                    match family {
                        OutputFamily::Uint => value.map(|v| f64::from(v as i32 as u32)),
                        _ => value,
                    }
                },
            );
        }
        device
    }

    /// Makes `fragment` linkable. `run` is evaluated once per output texel on draw.
    pub fn register_kernel(
        &mut self,
        fragment: impl Into<String>,
        uniforms: &[(&str, UniformKind)],
        run: impl Fn(&Fragment<'_>) -> [f64; 4] + 'static,
    ) {
        let kernel = SoftKernel {
            uniforms: uniforms
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
            run: Box::new(run),
        };
        self.kernels.insert(fragment.into(), Rc::new(kernel));
    }

    /// Makes texture allocation fail with `OutOfMemory` once `limit` textures are live.
    pub fn set_texture_limit(&mut self, limit: Option<usize>) {
        self.texture_limit = limit;
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn has_texture(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    pub fn texture_bytes(&self, id: TextureId) -> Option<&[u8]> {
        self.textures.get(&id).map(|t| t.data.as_slice())
    }

    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let program = self.programs.get(&program)?;
        let index = program.kernel.uniforms.iter().position(|(n, _)| n == name)?;
        program.values[index]
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn storable(&self, desc: &TextureDesc) -> Result<(), BackendError> {
        let format = desc.format;
        let required = match format.ty {
            DataType::Float => DeviceFeatures::FLOAT_TEXTURES,
            DataType::HalfFloat => DeviceFeatures::HALF_FLOAT_TEXTURES,
            DataType::UnsignedByte if !format.integer => DeviceFeatures::empty(),
            _ if format.integer => DeviceFeatures::INTEGER_TEXTURES,
            ty => {
                return Err(BackendError::Unsupported(format!(
                    "{ty} storage must be an integer format"
                )))
            }
        };
        let layout = match format.channels {
            1 | 2 => DeviceFeatures::SINGLE_CHANNEL_FORMATS,
            3 => DeviceFeatures::RGB_STORAGE,
            4 => DeviceFeatures::empty(),
            n => return Err(BackendError::Unsupported(format!("{n} channels"))),
        };
        if self.caps.supports(required | layout) {
            Ok(())
        } else {
            Err(BackendError::Unsupported(format!(
                "{} textures",
                format.label()
            )))
        }
    }

    fn renderable(&self, desc: &TextureDesc) -> bool {
        let format = desc.format;
        let mut required = match format.ty {
            DataType::Float => DeviceFeatures::RENDER_TO_FLOAT,
            DataType::HalfFloat => DeviceFeatures::RENDER_TO_HALF_FLOAT,
            _ => DeviceFeatures::empty(),
        };
        if format.channels == 3 {
            required |= DeviceFeatures::RENDER_TO_RGB;
        }
        self.caps.supports(required)
    }

    fn bound_texture(&self) -> Result<&SoftTexture, BackendError> {
        let framebuffer = self
            .bound_framebuffer
            .ok_or_else(|| BackendError::InvalidOperation("no framebuffer bound".into()))?;
        if self.framebuffer_status(framebuffer) != FramebufferStatus::Complete {
            return Err(BackendError::InvalidOperation(
                "bound framebuffer is incomplete".into(),
            ));
        }
        self.framebuffers
            .get(&framebuffer)
            .and_then(|id| self.textures.get(id))
            .ok_or(BackendError::InvalidResource)
    }

    fn readback_allowed(&self, desc: &TextureDesc, layout: PixelLayout, element: DataType) -> bool {
        let format = desc.format;
        let quirks = self.caps.readback;
        match layout {
            PixelLayout::Native => {
                let forbidden = match format.ty {
                    DataType::Float => quirks.contains(ReadbackQuirks::FLOAT_REQUIRES_RGBA),
                    DataType::HalfFloat => quirks.contains(ReadbackQuirks::HALF_FLOAT_AS_FLOAT),
                    DataType::UnsignedByte if !format.integer => format.channels != 4,
                    ty if ty.is_unsigned_integer() => {
                        quirks.contains(ReadbackQuirks::UNSIGNED_AS_RGBA_U32)
                    }
                    _ => true,
                };
                element == format.ty && !forbidden
            }
            PixelLayout::Rgba => match format.ty {
                DataType::Float | DataType::HalfFloat => element == DataType::Float,
                DataType::UnsignedByte if !format.integer => element == DataType::UnsignedByte,
                _ => false,
            },
            PixelLayout::RgbaInteger if format.integer => {
                (format.ty.is_unsigned_integer() && element == DataType::UnsignedInt)
                    || (format.ty.is_signed_integer() && element == DataType::Int)
            }
            PixelLayout::RgbaInteger => false,
        }
    }
}

impl GpuDevice for SoftDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidOperation(format!(
                "texture `{}` has zero extent",
                desc.label
            )));
        }
        self.storable(desc)?;
        if self
            .texture_limit
            .is_some_and(|limit| self.textures.len() >= limit)
        {
            return Err(BackendError::OutOfMemory);
        }
        let size = (desc.width as usize)
            .checked_mul(desc.height as usize)
            .and_then(|texels| texels.checked_mul(desc.format.bytes_per_texel()))
            .ok_or(BackendError::OutOfMemory)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| BackendError::OutOfMemory)?;
        data.resize(size, 0);
        let id = TextureId(self.alloc_id());
        self.textures.insert(
            id,
            SoftTexture {
                desc: desc.clone(),
                data,
            },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, id: TextureId, data: Option<&[u8]>) -> Result<(), BackendError> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or(BackendError::InvalidResource)?;
        match data {
            Some(bytes) if bytes.len() != texture.data.len() => {
                Err(BackendError::InvalidOperation(format!(
                    "upload of {} bytes into a {} byte texture",
                    bytes.len(),
                    texture.data.len()
                )))
            }
            Some(bytes) => {
                texture.data.copy_from_slice(bytes);
                Ok(())
            }
            None => {
                texture.data.fill(0);
                Ok(())
            }
        }
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> Result<(), BackendError> {
        let source = self.textures.get(&src).ok_or(BackendError::InvalidResource)?;
        let (desc, data) = (source.desc.clone(), source.data.clone());
        let target = self
            .textures
            .get_mut(&dst)
            .ok_or(BackendError::InvalidResource)?;
        if (target.desc.width, target.desc.height, target.desc.format)
            != (desc.width, desc.height, desc.format)
        {
            return Err(BackendError::InvalidOperation(
                "copy between mismatched textures".into(),
            ));
        }
        target.data = data;
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
        self.units.retain(|_, bound| *bound != id);
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, BackendError> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::InvalidResource);
        }
        let id = FramebufferId(self.alloc_id());
        self.framebuffers.insert(id, texture);
        Ok(id)
    }

    fn framebuffer_status(&self, id: FramebufferId) -> FramebufferStatus {
        match self
            .framebuffers
            .get(&id)
            .and_then(|texture| self.textures.get(texture))
        {
            None => FramebufferStatus::Missing,
            Some(texture) if self.renderable(&texture.desc) => FramebufferStatus::Complete,
            Some(_) => FramebufferStatus::IncompleteAttachment,
        }
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.remove(&id);
        if self.bound_framebuffer == Some(id) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) -> Result<(), BackendError> {
        if let Some(id) = id {
            if !self.framebuffers.contains_key(&id) {
                return Err(BackendError::InvalidResource);
            }
        }
        self.bound_framebuffer = id;
        Ok(())
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    fn read_pixels(
        &mut self,
        width: u32,
        height: u32,
        layout: PixelLayout,
        element: DataType,
    ) -> Result<Vec<u8>, BackendError> {
        let texture = self.bound_texture()?;
        let desc = &texture.desc;
        if width > desc.width || height > desc.height {
            return Err(BackendError::InvalidOperation(format!(
                "read of {width}x{height} from a {}x{} target",
                desc.width, desc.height
            )));
        }
        if !self.readback_allowed(desc, layout, element) {
            return Err(BackendError::InvalidOperation(format!(
                "{} target cannot be read as {layout:?}/{element}",
                desc.format.label()
            )));
        }

        let channels = match layout {
            PixelLayout::Native => desc.format.channels as usize,
            PixelLayout::Rgba | PixelLayout::RgbaInteger => 4,
        };
        let size = element.bytes_per_element();
        let mut out = vec![0u8; width as usize * height as usize * channels * size];
        let mut offset = 0;
        for y in 0..height {
            for x in 0..width {
                let texel = texture.texel(x, y);
                for value in texel.iter().take(channels) {
                    write_scalar(*value, element, &mut out[offset..]);
                    offset += size;
                }
            }
        }
        Ok(out)
    }

    fn link_program(&mut self, _vertex: &str, fragment: &str) -> Result<ProgramId, BackendError> {
        let kernel = self.kernels.get(fragment).cloned().ok_or_else(|| {
            BackendError::LinkFailed("no software kernel registered for fragment source".into())
        })?;
        let id = ProgramId(self.alloc_id());
        let values = vec![None; kernel.uniforms.len()];
        self.programs.insert(id, SoftProgram { kernel, values });
        Ok(id)
    }

    fn use_program(&mut self, id: Option<ProgramId>) -> Result<(), BackendError> {
        if let Some(id) = id {
            if !self.programs.contains_key(&id) {
                return Err(BackendError::InvalidResource);
            }
        }
        self.current_program = id;
        Ok(())
    }

    fn uniform_slot(&self, program: ProgramId, name: &str) -> Option<UniformSlot> {
        let program = self.programs.get(&program)?;
        let (index, (_, kind)) = program
            .kernel
            .uniforms
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n == name)?;
        Some(UniformSlot {
            location: UniformLocation(index as u32),
            kind: *kind,
        })
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), BackendError> {
        let id = self
            .current_program
            .ok_or_else(|| BackendError::InvalidOperation("no program in use".into()))?;
        let program = self
            .programs
            .get_mut(&id)
            .ok_or(BackendError::InvalidResource)?;
        let index = location.0 as usize;
        match program.kernel.uniforms.get(index) {
            Some((_, kind)) if *kind == value.kind() => {
                program.values[index] = Some(*value);
                Ok(())
            }
            Some((name, kind)) => Err(BackendError::InvalidOperation(format!(
                "uniform `{name}` is {kind}, got {}",
                value.kind()
            ))),
            None => Err(BackendError::InvalidOperation(format!(
                "no uniform at location {index}"
            ))),
        }
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
        if self.current_program == Some(id) {
            self.current_program = None;
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> Result<(), BackendError> {
        match texture {
            Some(id) if !self.textures.contains_key(&id) => Err(BackendError::InvalidResource),
            Some(id) => {
                self.units.insert(unit, id);
                Ok(())
            }
            None => {
                self.units.remove(&unit);
                Ok(())
            }
        }
    }

    fn draw(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        let program_id = self
            .current_program
            .ok_or_else(|| BackendError::InvalidOperation("no program in use".into()))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or(BackendError::InvalidResource)?;
        let target = self.bound_texture()?;
        let format = target.desc.format;
        let width = width.min(target.desc.width);
        let height = height.min(target.desc.height);

        // Evaluate everything before writing so a kernel may sample its own target.
        let mut outputs = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let fragment = Fragment {
                    x,
                    y,
                    program,
                    device: self,
                };
                outputs.push((x, y, (program.kernel.run)(&fragment)));
            }
        }

        let framebuffer = self
            .bound_framebuffer
            .ok_or(BackendError::InvalidResource)?;
        let texture_id = *self
            .framebuffers
            .get(&framebuffer)
            .ok_or(BackendError::InvalidResource)?;
        let texture = self
            .textures
            .get_mut(&texture_id)
            .ok_or(BackendError::InvalidResource)?;
        let row = texture.desc.width as usize;
        let element = format.ty.bytes_per_element();
        let texel = format.bytes_per_texel();
        for (x, y, value) in outputs {
            let offset = (y as usize * row + x as usize) * texel;
            for (c, v) in value.iter().take(format.channels as usize).enumerate() {
                write_scalar(*v, format.ty, &mut texture.data[offset + c * element..]);
            }
        }
        Ok(())
    }
}
