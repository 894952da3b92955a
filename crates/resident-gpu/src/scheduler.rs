//! The step runner arrays are written through.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::array::ResidentArray;
use crate::context::GpuContext;
use crate::error::{DeviceResourceError, ResidentError, Result};
use crate::hal::TextureId;
use crate::kernels::{fill_kernel_source, OutputFamily, FULLSCREEN_VERTEX};
use crate::program::ComputeProgram;

/// Owner of the render loop that resident arrays delegate kernel work to.
pub trait Scheduler {
    fn context(&self) -> &GpuContext;

    /// The constant-fill kernel for `family`, writing its `u_value` uniform to every texel.
    fn fill_program(&mut self, family: OutputFamily) -> Result<Rc<RefCell<ComputeProgram>>>;

    /// Runs `program` once over `output`.
    ///
    /// `output` is advanced first and its new current slot is the render target. `inputs` are
    /// bound to sampler units `0..inputs.len()`; take them from `current_state()` (or
    /// `last_state()`) before the call.
    fn step(
        &mut self,
        program: &ComputeProgram,
        inputs: &[TextureId],
        output: &mut ResidentArray,
    ) -> Result<()>;

    /// Builds a new array with `source`'s format and shape and copies its contents and ring
    /// position.
    fn clone_array(&mut self, source: &ResidentArray, name: Option<&str>) -> Result<ResidentArray>;
}

/// Single-device scheduler: one draw per step, fill kernels linked on first use.
pub struct BasicScheduler {
    context: GpuContext,
    fill_programs: HashMap<OutputFamily, Rc<RefCell<ComputeProgram>>>,
}

impl BasicScheduler {
    pub fn new(context: &GpuContext) -> Self {
        Self {
            context: context.clone(),
            fill_programs: HashMap::new(),
        }
    }
}

impl Scheduler for BasicScheduler {
    fn context(&self) -> &GpuContext {
        &self.context
    }

    fn fill_program(&mut self, family: OutputFamily) -> Result<Rc<RefCell<ComputeProgram>>> {
        if let Some(program) = self.fill_programs.get(&family) {
            return Ok(program.clone());
        }
        let program = ComputeProgram::new(
            &self.context,
            FULLSCREEN_VERTEX,
            fill_kernel_source(family),
            &[],
        )?;
        let program = Rc::new(RefCell::new(program));
        // Only cache linked programs so a transient link failure can be retried.
        if program.borrow().is_linked() {
            self.fill_programs.insert(family, program.clone());
        }
        Ok(program)
    }

    fn step(
        &mut self,
        program: &ComputeProgram,
        inputs: &[TextureId],
        output: &mut ResidentArray,
    ) -> Result<()> {
        let handle = program.handle().ok_or_else(|| {
            ResidentError::Precondition(format!(
                "cannot step array `{}` with a program that failed to link",
                output.name()
            ))
        })?;
        if !program.context().same_device(&self.context) {
            return Err(ResidentError::Precondition(format!(
                "program for array `{}` belongs to another device",
                output.name()
            )));
        }
        let framebuffer = output.prepare_for_write(true)?;
        let (width, height) = (output.width(), output.height());

        let drawn = {
            let mut bound = self.context.bind_framebuffer(framebuffer)?;
            let mut run = || {
                bound.use_program(Some(handle))?;
                for (unit, texture) in inputs.iter().enumerate() {
                    bound.bind_texture(unit as u32, Some(*texture))?;
                }
                bound.draw(width, height)
            };
            run()
        };

        if let Err(source) = drawn {
            self.context.report(DeviceResourceError::Draw {
                name: output.name().to_string(),
                source,
            });
        }
        Ok(())
    }

    fn clone_array(&mut self, source: &ResidentArray, name: Option<&str>) -> Result<ResidentArray> {
        let name = name.map_or_else(|| format!("{}-copy", source.name()), str::to_string);
        let mut desc = source.descriptor();
        desc.name = name;
        if self.context.verbose() {
            tracing::debug!(array = %source.name(), copy = %desc.name, "cloning resident array");
        }
        let mut copy = ResidentArray::new(&self.context, desc)?;
        if let Err(err) = copy.copy_state_from(source) {
            copy.dispose()?;
            return Err(err);
        }
        Ok(copy)
    }
}

impl core::fmt::Debug for BasicScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BasicScheduler")
            .field("context", &self.context)
            .field("fill_programs", &self.fill_programs.keys().collect::<Vec<_>>())
            .finish()
    }
}
