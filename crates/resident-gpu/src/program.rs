//! Compute kernel programs.
//!
//! A [`ComputeProgram`] owns one linked kernel and caches the uniform slots it has bound. The kind
//! of a uniform (float/int, 1 to 4 components) is fixed by its first successful bind; later binds
//! that would change it are rejected.

use hashbrown::HashMap;

use crate::context::GpuContext;
use crate::error::{DeviceResourceError, ResidentError, Result};
use crate::hal::{ProgramId, UniformKind, UniformLocation, UniformValue};

/// Element family a uniform value is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformDataType {
    Float,
    Int,
}

/// A uniform value as supplied by the caller: one number or a sequence of one to four.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformInput {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<f64> for UniformInput {
    fn from(value: f64) -> Self {
        UniformInput::Scalar(value)
    }
}

impl From<i32> for UniformInput {
    fn from(value: i32) -> Self {
        UniformInput::Scalar(value.into())
    }
}

impl From<Vec<f64>> for UniformInput {
    fn from(values: Vec<f64>) -> Self {
        UniformInput::Vector(values)
    }
}

impl From<&[f64]> for UniformInput {
    fn from(values: &[f64]) -> Self {
        UniformInput::Vector(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for UniformInput {
    fn from(values: [f64; N]) -> Self {
        UniformInput::Vector(values.to_vec())
    }
}

impl UniformInput {
    fn values(&self) -> &[f64] {
        match self {
            UniformInput::Scalar(value) => core::slice::from_ref(value),
            UniformInput::Vector(values) => values.as_slice(),
        }
    }

    /// Resolves the concrete uniform kind and builds the exact upload value.
    pub fn to_uniform(&self, data_type: UniformDataType) -> Result<UniformValue> {
        let values = self.values();
        let kind = UniformKind::new(data_type == UniformDataType::Float, values.len())
            .ok_or_else(|| {
                ResidentError::Configuration(format!(
                    "invalid uniform value {values:?}, expected 1 to 4 components"
                ))
            })?;

        match data_type {
            UniformDataType::Float => {
                let v: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                Ok(match kind {
                    UniformKind::Float1 => UniformValue::Float1(v[0]),
                    UniformKind::Float2 => UniformValue::Float2([v[0], v[1]]),
                    UniformKind::Float3 => UniformValue::Float3([v[0], v[1], v[2]]),
                    _ => UniformValue::Float4([v[0], v[1], v[2], v[3]]),
                })
            }
            UniformDataType::Int => {
                let v = values
                    .iter()
                    .map(|&v| int_uniform(v))
                    .collect::<Result<Vec<i32>>>()?;
                Ok(match kind {
                    UniformKind::Int1 => UniformValue::Int1(v[0]),
                    UniformKind::Int2 => UniformValue::Int2([v[0], v[1]]),
                    UniformKind::Int3 => UniformValue::Int3([v[0], v[1], v[2]]),
                    _ => UniformValue::Int4([v[0], v[1], v[2], v[3]]),
                })
            }
        }
    }
}

// Int uniforms carry both signed values and unsigned bit patterns (for `uvec` casts), so the
// accepted range spans i32::MIN..=u32::MAX and values above i32::MAX wrap.
fn int_uniform(value: f64) -> Result<i32> {
    if value.fract() != 0.0 || value < i32::MIN as f64 || value > u32::MAX as f64 {
        return Err(ResidentError::Configuration(format!(
            "invalid int uniform value {value}"
        )));
    }
    Ok(value as i64 as i32)
}

/// Uniform to set on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformInit {
    pub name: String,
    pub value: UniformInput,
    pub data_type: UniformDataType,
}

impl UniformInit {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<UniformInput>,
        data_type: UniformDataType,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundUniform {
    location: UniformLocation,
    kind: UniformKind,
}

enum BindOutcome {
    Bound,
    Skipped(DeviceResourceError),
}

pub struct ComputeProgram {
    context: GpuContext,
    handle: Option<ProgramId>,
    uniforms: HashMap<String, BoundUniform>,
}

impl ComputeProgram {
    /// Links `vertex` + `fragment` and applies the initial uniforms.
    ///
    /// A link failure is reported through the context's error callback and yields an unlinked
    /// program ([`is_linked`](Self::is_linked) is false); every later `set_uniform` on it fails.
    pub fn new(
        ctx: &GpuContext,
        vertex: &str,
        fragment: &str,
        uniforms: &[UniformInit],
    ) -> Result<Self> {
        let linked = ctx.device()?.link_program(vertex, fragment);
        let handle = match linked {
            Ok(handle) => Some(handle),
            Err(err) => {
                ctx.report(DeviceResourceError::LinkFailed(err));
                None
            }
        };

        let mut program = Self {
            context: ctx.clone(),
            handle,
            uniforms: HashMap::new(),
        };
        if program.is_linked() {
            for init in uniforms {
                program.set_uniform(&init.name, init.value.clone(), init.data_type)?;
            }
        }
        Ok(program)
    }

    pub fn is_linked(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Kind a uniform was first bound with, if it has been bound.
    pub fn uniform_kind(&self, name: &str) -> Option<UniformKind> {
        self.uniforms.get(name).map(|u| u.kind)
    }

    /// Binds `value` to the uniform `name`.
    ///
    /// The first bind of a name looks up its slot; if the kernel has no such uniform, or declares
    /// it with another kind, the error goes to the callback and the bind is skipped. Once bound, a
    /// name keeps its kind: a different kind is an [`ResidentError::Immutability`] error and the
    /// previous value stays active.
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformInput>,
        data_type: UniformDataType,
    ) -> Result<()> {
        let handle = self.handle.ok_or_else(|| {
            ResidentError::Precondition(format!(
                "cannot set uniform `{name}` on a program that failed to link"
            ))
        })?;
        let value = value.into().to_uniform(data_type)?;
        let kind = value.kind();

        if let Some(bound) = self.uniforms.get(name) {
            if bound.kind != kind {
                return Err(ResidentError::Immutability {
                    name: name.to_string(),
                    from: bound.kind,
                    to: kind,
                });
            }
        }

        let outcome = {
            let mut device = self.context.device()?;
            device.use_program(Some(handle)).map_err(|err| {
                ResidentError::Precondition(format!("program cannot be used: {err}"))
            })?;
            let bound = match self.uniforms.get(name) {
                Some(bound) => Ok(*bound),
                None => match device.uniform_slot(handle, name) {
                    None => Err(DeviceResourceError::UniformNotFound {
                        name: name.to_string(),
                    }),
                    Some(slot) if slot.kind != kind => Err(DeviceResourceError::UniformKindMismatch {
                        name: name.to_string(),
                        declared: slot.kind,
                        requested: kind,
                    }),
                    Some(slot) => {
                        let bound = BoundUniform {
                            location: slot.location,
                            kind,
                        };
                        self.uniforms.insert(name.to_string(), bound);
                        Ok(bound)
                    }
                },
            };
            match bound {
                Ok(bound) => match device.set_uniform(bound.location, &value) {
                    Ok(()) => BindOutcome::Bound,
                    Err(source) => BindOutcome::Skipped(DeviceResourceError::UniformUpload {
                        name: name.to_string(),
                        source,
                    }),
                },
                Err(err) => BindOutcome::Skipped(err),
            }
        };

        if let BindOutcome::Skipped(err) = outcome {
            self.context.report(err);
        }
        Ok(())
    }

    /// Releases the linked kernel. The program is unlinked afterwards.
    pub fn dispose(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            self.context.device()?.destroy_program(handle);
        }
        self.uniforms.clear();
        Ok(())
    }
}

impl Drop for ComputeProgram {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Ok(mut device) = self.context.device() {
                device.destroy_program(handle);
            }
        }
    }
}

impl core::fmt::Debug for ComputeProgram {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputeProgram")
            .field("handle", &self.handle)
            .field("uniforms", &self.uniforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use resident_format::DeviceCapabilities;

    use super::*;
    use crate::hal::{GpuDevice, SoftDevice};

    const KERNEL: &str = "test kernel";

    fn setup() -> (Rc<RefCell<SoftDevice>>, GpuContext, Rc<RefCell<Vec<DeviceResourceError>>>) {
        let mut soft = SoftDevice::new(DeviceCapabilities::gles3());
        soft.register_kernel(
            KERNEL,
            &[("u_scale", UniformKind::Float1), ("u_offset", UniformKind::Int2)],
            |_| [0.0; 4],
        );
        let device = Rc::new(RefCell::new(soft));
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let shared: Rc<RefCell<dyn GpuDevice>> = device.clone();
        let ctx = GpuContext::from_shared(shared)
            .with_error_callback(move |err| sink.borrow_mut().push(err.clone()));
        (device, ctx, errors)
    }

    #[test]
    fn kinds_resolve_from_shape_and_data_type() {
        assert_eq!(
            UniformInput::Scalar(3.5).to_uniform(UniformDataType::Float).unwrap(),
            UniformValue::Float1(3.5)
        );
        assert_eq!(
            UniformInput::from([1.0, 2.0, 3.0]).to_uniform(UniformDataType::Int).unwrap(),
            UniformValue::Int3([1, 2, 3])
        );
        assert_eq!(
            UniformInput::from(u32::MAX as f64).to_uniform(UniformDataType::Int).unwrap(),
            UniformValue::Int1(-1)
        );
        assert!(UniformInput::Vector(vec![]).to_uniform(UniformDataType::Float).is_err());
        assert!(UniformInput::Vector(vec![0.0; 5]).to_uniform(UniformDataType::Float).is_err());
        assert!(UniformInput::Scalar(0.5).to_uniform(UniformDataType::Int).is_err());
    }

    #[test]
    fn uniform_kind_is_fixed_by_first_bind() {
        let (device, ctx, errors) = setup();
        let mut program = ComputeProgram::new(&ctx, "vs", KERNEL, &[]).unwrap();
        program.set_uniform("u_scale", 3.5, UniformDataType::Float).unwrap();

        let err = program
            .set_uniform("u_scale", [1.0, 2.0], UniformDataType::Float)
            .unwrap_err();
        assert!(matches!(err, ResidentError::Immutability { .. }), "{err}");

        let handle = program.handle().unwrap();
        assert_eq!(
            device.borrow().uniform_value(handle, "u_scale"),
            Some(UniformValue::Float1(3.5))
        );
        assert!(errors.borrow().is_empty());
    }

    #[test]
    fn missing_or_mismatched_uniforms_are_reported_and_skipped() {
        let (_device, ctx, errors) = setup();
        let mut program = ComputeProgram::new(&ctx, "vs", KERNEL, &[]).unwrap();

        program.set_uniform("u_missing", 1.0, UniformDataType::Float).unwrap();
        program.set_uniform("u_offset", 1.0, UniformDataType::Float).unwrap();
        assert_eq!(program.uniform_kind("u_missing"), None);
        assert_eq!(program.uniform_kind("u_offset"), None);

        let errors = errors.borrow();
        assert!(matches!(errors[0], DeviceResourceError::UniformNotFound { .. }));
        assert!(matches!(errors[1], DeviceResourceError::UniformKindMismatch { .. }));
    }

    #[test]
    fn initial_uniforms_are_applied() {
        let (device, ctx, _errors) = setup();
        let program = ComputeProgram::new(
            &ctx,
            "vs",
            KERNEL,
            &[UniformInit::new("u_offset", [4.0, -4.0], UniformDataType::Int)],
        )
        .unwrap();
        assert_eq!(
            device.borrow().uniform_value(program.handle().unwrap(), "u_offset"),
            Some(UniformValue::Int2([4, -4]))
        );
    }

    #[test]
    fn link_failure_is_reported_not_raised() {
        let (device, ctx, errors) = setup();
        let mut program = ComputeProgram::new(&ctx, "vs", "unknown", &[]).unwrap();
        assert!(!program.is_linked());
        assert!(matches!(errors.borrow()[0], DeviceResourceError::LinkFailed(_)));
        assert!(matches!(
            program.set_uniform("u_scale", 1.0, UniformDataType::Float),
            Err(ResidentError::Precondition(_))
        ));
        assert_eq!(device.borrow().live_programs(), 0);
    }

    #[test]
    fn dispose_releases_the_kernel() {
        let (device, ctx, _errors) = setup();
        let mut program = ComputeProgram::new(&ctx, "vs", KERNEL, &[]).unwrap();
        assert_eq!(device.borrow().live_programs(), 1);
        program.dispose().unwrap();
        assert!(!program.is_linked());
        assert_eq!(device.borrow().live_programs(), 0);
    }
}
