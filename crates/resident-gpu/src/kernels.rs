//! Built-in kernel sources.

use resident_format::StorageFormat;

use crate::program::UniformDataType;

/// Full-viewport quad shared by every compute kernel.
pub const FULLSCREEN_VERTEX: &str = r#"#version 300 es
in vec2 a_position;
out vec2 v_uv;
void main() {
    v_uv = 0.5 * (a_position + 1.0);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

/// Name of the fill kernels' value uniform.
pub const FILL_VALUE_UNIFORM: &str = "u_value";

const FILL_FLOAT: &str = r#"#version 300 es
precision highp float;
uniform vec4 u_value;
out vec4 out_result;
void main() {
    out_result = u_value;
}
"#;

const FILL_INT: &str = r#"#version 300 es
precision highp float;
precision highp int;
uniform ivec4 u_value;
out ivec4 out_result;
void main() {
    out_result = u_value;
}
"#;

// Unsigned values above i32::MAX arrive wrapped; the uvec4 cast restores the bit pattern.
const FILL_UINT: &str = r#"#version 300 es
precision highp float;
precision highp int;
uniform ivec4 u_value;
out uvec4 out_result;
void main() {
    out_result = uvec4(u_value);
}
"#;

/// Fragment output type a kernel must produce to render into a storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFamily {
    Float,
    Int,
    Uint,
}

impl OutputFamily {
    pub const ALL: [OutputFamily; 3] = [OutputFamily::Float, OutputFamily::Int, OutputFamily::Uint];

    pub fn for_storage(storage: &StorageFormat) -> Self {
        match storage.ty {
            ty if storage.integer && ty.is_signed_integer() => OutputFamily::Int,
            ty if storage.integer && ty.is_unsigned_integer() => OutputFamily::Uint,
            _ => OutputFamily::Float,
        }
    }

    /// Uniform element type used to feed this family's fill value.
    pub fn uniform_type(self) -> UniformDataType {
        match self {
            OutputFamily::Float => UniformDataType::Float,
            OutputFamily::Int | OutputFamily::Uint => UniformDataType::Int,
        }
    }
}

/// Constant-fill kernel: writes `u_value` to every texel of the output.
pub fn fill_kernel_source(family: OutputFamily) -> &'static str {
    match family {
        OutputFamily::Float => FILL_FLOAT,
        OutputFamily::Int => FILL_INT,
        OutputFamily::Uint => FILL_UINT,
    }
}

#[cfg(test)]
mod tests {
    use resident_format::DataType;

    use super::*;

    #[test]
    fn output_family_follows_storage_not_declared_type() {
        let storage = |ty, integer| StorageFormat {
            ty,
            channels: 4,
            integer,
        };
        assert_eq!(
            OutputFamily::for_storage(&storage(DataType::Short, true)),
            OutputFamily::Int
        );
        assert_eq!(
            OutputFamily::for_storage(&storage(DataType::UnsignedByte, true)),
            OutputFamily::Uint
        );
        assert_eq!(
            OutputFamily::for_storage(&storage(DataType::UnsignedByte, false)),
            OutputFamily::Float
        );
        assert_eq!(
            OutputFamily::for_storage(&storage(DataType::HalfFloat, false)),
            OutputFamily::Float
        );
    }

    #[test]
    fn fill_sources_declare_the_value_uniform() {
        for family in OutputFamily::ALL {
            assert!(fill_kernel_source(family).contains(FILL_VALUE_UNIFORM));
        }
    }
}
