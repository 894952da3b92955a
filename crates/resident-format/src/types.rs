use core::fmt;
use core::str::FromStr;

use half::f16;

use crate::FormatError;

/// Element type of a resident array, as declared by the caller.
///
/// The device may store a different *internal* type (see [`crate::resolve`]); host data is
/// always exchanged in the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    HalfFloat,
    Float,
    UnsignedByte,
    Byte,
    UnsignedShort,
    Short,
    UnsignedInt,
    Int,
}

const DATA_TYPE_NAMES: &str =
    "HALF_FLOAT, FLOAT, UNSIGNED_BYTE, BYTE, UNSIGNED_SHORT, SHORT, UNSIGNED_INT, INT";

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::HalfFloat,
        DataType::Float,
        DataType::UnsignedByte,
        DataType::Byte,
        DataType::UnsignedShort,
        DataType::Short,
        DataType::UnsignedInt,
        DataType::Int,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::HalfFloat => "HALF_FLOAT",
            DataType::Float => "FLOAT",
            DataType::UnsignedByte => "UNSIGNED_BYTE",
            DataType::Byte => "BYTE",
            DataType::UnsignedShort => "UNSIGNED_SHORT",
            DataType::Short => "SHORT",
            DataType::UnsignedInt => "UNSIGNED_INT",
            DataType::Int => "INT",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::HalfFloat | DataType::Float)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(self, DataType::Byte | DataType::Short | DataType::Int)
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            DataType::UnsignedByte | DataType::UnsignedShort | DataType::UnsignedInt
        )
    }

    pub fn bytes_per_element(self) -> usize {
        match self {
            DataType::UnsignedByte | DataType::Byte => 1,
            DataType::HalfFloat | DataType::UnsignedShort | DataType::Short => 2,
            DataType::Float | DataType::UnsignedInt | DataType::Int => 4,
        }
    }

    /// Inclusive host range for integer types. Floating types are unbounded.
    pub fn range(self) -> Option<(f64, f64)> {
        match self {
            DataType::HalfFloat | DataType::Float => None,
            DataType::UnsignedByte => Some((0.0, u8::MAX as f64)),
            DataType::Byte => Some((i8::MIN as f64, i8::MAX as f64)),
            DataType::UnsignedShort => Some((0.0, u16::MAX as f64)),
            DataType::Short => Some((i16::MIN as f64, i16::MAX as f64)),
            DataType::UnsignedInt => Some((0.0, u32::MAX as f64)),
            DataType::Int => Some((i32::MIN as f64, i32::MAX as f64)),
        }
    }

    /// Whether `value` is exactly representable as a host value of this type.
    pub fn contains(self, value: f64) -> bool {
        match self.range() {
            None => true,
            Some((min, max)) => value.fract() == 0.0 && value >= min && value <= max,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| FormatError::UnknownName {
                kind: "type",
                value: s.to_string(),
                valid: DATA_TYPE_NAMES,
            })
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    /// Interpolating filter; only legal for floating declared types.
    Linear,
}

impl Filter {
    pub fn as_str(self) -> &'static str {
        match self {
            Filter::Nearest => "NEAREST",
            Filter::Linear => "LINEAR",
        }
    }

    /// 1-D arrays never interpolate by default; 2-D float arrays do.
    pub fn default_for(ty: DataType, is_1d: bool) -> Filter {
        if !is_1d && ty.is_float() {
            Filter::Linear
        } else {
            Filter::Nearest
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEAREST" => Ok(Filter::Nearest),
            "LINEAR" => Ok(Filter::Linear),
            _ => Err(FormatError::UnknownName {
                kind: "filter",
                value: s.to_string(),
                valid: "NEAREST, LINEAR",
            }),
        }
    }
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

impl Wrap {
    pub fn as_str(self) -> &'static str {
        match self {
            Wrap::ClampToEdge => "CLAMP_TO_EDGE",
            Wrap::Repeat => "REPEAT",
            Wrap::MirroredRepeat => "MIRRORED_REPEAT",
        }
    }
}

impl fmt::Display for Wrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Wrap {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLAMP_TO_EDGE" => Ok(Wrap::ClampToEdge),
            "REPEAT" => Ok(Wrap::Repeat),
            "MIRRORED_REPEAT" => Ok(Wrap::MirroredRepeat),
            _ => Err(FormatError::UnknownName {
                kind: "wrap",
                value: s.to_string(),
                valid: "CLAMP_TO_EDGE, REPEAT, MIRRORED_REPEAT",
            }),
        }
    }
}

/// Typed host array in the declared type's natural representation.
///
/// Layout is flat and channel-major: element `i`, component `c` lives at
/// `i * component_count + c`. Half floats are carried as [`f16`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    HalfFloat(Vec<f16>),
    Float(Vec<f32>),
    UnsignedByte(Vec<u8>),
    Byte(Vec<i8>),
    UnsignedShort(Vec<u16>),
    Short(Vec<i16>),
    UnsignedInt(Vec<u32>),
    Int(Vec<i32>),
}

macro_rules! array_data_dispatch {
    ($self:expr, $values:ident => $body:expr) => {
        match $self {
            ArrayData::HalfFloat($values) => $body,
            ArrayData::Float($values) => $body,
            ArrayData::UnsignedByte($values) => $body,
            ArrayData::Byte($values) => $body,
            ArrayData::UnsignedShort($values) => $body,
            ArrayData::Short($values) => $body,
            ArrayData::UnsignedInt($values) => $body,
            ArrayData::Int($values) => $body,
        }
    };
}

impl ArrayData {
    pub fn data_type(&self) -> DataType {
        match self {
            ArrayData::HalfFloat(_) => DataType::HalfFloat,
            ArrayData::Float(_) => DataType::Float,
            ArrayData::UnsignedByte(_) => DataType::UnsignedByte,
            ArrayData::Byte(_) => DataType::Byte,
            ArrayData::UnsignedShort(_) => DataType::UnsignedShort,
            ArrayData::Short(_) => DataType::Short,
            ArrayData::UnsignedInt(_) => DataType::UnsignedInt,
            ArrayData::Int(_) => DataType::Int,
        }
    }

    pub fn len(&self) -> usize {
        array_data_dispatch!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn zeroed(ty: DataType, len: usize) -> Self {
        match ty {
            DataType::HalfFloat => ArrayData::HalfFloat(vec![f16::ZERO; len]),
            DataType::Float => ArrayData::Float(vec![0.0; len]),
            DataType::UnsignedByte => ArrayData::UnsignedByte(vec![0; len]),
            DataType::Byte => ArrayData::Byte(vec![0; len]),
            DataType::UnsignedShort => ArrayData::UnsignedShort(vec![0; len]),
            DataType::Short => ArrayData::Short(vec![0; len]),
            DataType::UnsignedInt => ArrayData::UnsignedInt(vec![0; len]),
            DataType::Int => ArrayData::Int(vec![0; len]),
        }
    }

    /// Builds a typed array from generic numbers, rejecting anything the type cannot hold
    /// exactly (integer types) instead of silently wrapping.
    pub fn from_numbers(ty: DataType, values: &[f64]) -> Result<Self, FormatError> {
        if let Some(&value) = values.iter().find(|&&v| !ty.contains(v)) {
            return Err(FormatError::OutOfRange { ty, value });
        }
        Ok(Self::from_f64_saturating(ty, values))
    }

    /// Converts with rounding and saturation; used on the readback path where values come
    /// from the device rather than the caller.
    pub fn from_f64_saturating(ty: DataType, values: &[f64]) -> Self {
        match ty {
            DataType::HalfFloat => {
                ArrayData::HalfFloat(values.iter().map(|&v| f16::from_f64(v)).collect())
            }
            DataType::Float => ArrayData::Float(values.iter().map(|&v| v as f32).collect()),
            DataType::UnsignedByte => {
                ArrayData::UnsignedByte(values.iter().map(|&v| v.round() as u8).collect())
            }
            DataType::Byte => ArrayData::Byte(values.iter().map(|&v| v.round() as i8).collect()),
            DataType::UnsignedShort => {
                ArrayData::UnsignedShort(values.iter().map(|&v| v.round() as u16).collect())
            }
            DataType::Short => {
                ArrayData::Short(values.iter().map(|&v| v.round() as i16).collect())
            }
            DataType::UnsignedInt => {
                ArrayData::UnsignedInt(values.iter().map(|&v| v.round() as u32).collect())
            }
            DataType::Int => ArrayData::Int(values.iter().map(|&v| v.round() as i32).collect()),
        }
    }

    /// Value at `index` widened to `f64` (lossless for every variant).
    pub fn value(&self, index: usize) -> f64 {
        match self {
            ArrayData::HalfFloat(values) => values[index].to_f64(),
            ArrayData::Float(values) => values[index] as f64,
            ArrayData::UnsignedByte(values) => values[index] as f64,
            ArrayData::Byte(values) => values[index] as f64,
            ArrayData::UnsignedShort(values) => values[index] as f64,
            ArrayData::Short(values) => values[index] as f64,
            ArrayData::UnsignedInt(values) => values[index] as f64,
            ArrayData::Int(values) => values[index] as f64,
        }
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.value(i)).collect()
    }

    /// Raw native-endian bytes of the host values.
    pub fn as_bytes(&self) -> &[u8] {
        array_data_dispatch!(self, values => bytemuck::cast_slice(values.as_slice()))
    }
}

macro_rules! impl_array_data_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for ArrayData {
                fn from(values: Vec<$ty>) -> Self {
                    ArrayData::$variant(values)
                }
            }
        )*
    };
}

impl_array_data_from!(
    f16 => HalfFloat,
    f32 => Float,
    u8 => UnsignedByte,
    i8 => Byte,
    u16 => UnsignedShort,
    i16 => Short,
    u32 => UnsignedInt,
    i32 => Int,
);

/// Value written by `clear()`: a scalar broadcast to every channel, or one value per
/// component.
#[derive(Debug, Clone, PartialEq)]
pub enum ClearValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Scalar(0.0)
    }
}

impl From<f64> for ClearValue {
    fn from(value: f64) -> Self {
        ClearValue::Scalar(value)
    }
}

impl From<Vec<f64>> for ClearValue {
    fn from(values: Vec<f64>) -> Self {
        ClearValue::Vector(values)
    }
}

impl ClearValue {
    pub fn validate(&self, ty: DataType, component_count: u8) -> Result<(), FormatError> {
        let values: &[f64] = match self {
            ClearValue::Scalar(value) => core::slice::from_ref(value),
            ClearValue::Vector(values) => {
                if values.len() != component_count as usize {
                    return Err(FormatError::InvalidClearValue(format!(
                        "expected {ty} or {component_count} values of {ty}, got {} values",
                        values.len()
                    )));
                }
                values
            }
        };
        match values.iter().find(|&&v| !ty.contains(v)) {
            Some(value) => Err(FormatError::InvalidClearValue(format!(
                "{value} is not representable as {ty}"
            ))),
            None => Ok(()),
        }
    }

    /// Four-channel expansion: scalars broadcast, vectors are zero padded.
    pub fn expand(&self) -> [f64; 4] {
        match self {
            ClearValue::Scalar(value) => [*value; 4],
            ClearValue::Vector(values) => {
                let mut out = [0.0; 4];
                for (dst, src) in out.iter_mut().zip(values) {
                    *dst = *src;
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_names_round_trip_through_from_str() {
        for ty in DataType::ALL {
            assert_eq!(ty.as_str().parse::<DataType>().unwrap(), ty);
        }
        let err = "DOUBLE".parse::<DataType>().unwrap_err();
        assert!(matches!(err, FormatError::UnknownName { kind: "type", .. }));
    }

    #[test]
    fn integer_types_reject_fractions_and_out_of_range() {
        assert!(DataType::UnsignedByte.contains(255.0));
        assert!(!DataType::UnsignedByte.contains(256.0));
        assert!(!DataType::UnsignedByte.contains(-1.0));
        assert!(!DataType::Short.contains(1.5));
        assert!(DataType::UnsignedInt.contains(u32::MAX as f64));
        assert!(DataType::Float.contains(f64::NAN));
    }

    #[test]
    fn from_numbers_reports_first_bad_value() {
        let err = ArrayData::from_numbers(DataType::Byte, &[1.0, 200.0, 300.0]).unwrap_err();
        assert_eq!(
            err,
            FormatError::OutOfRange {
                ty: DataType::Byte,
                value: 200.0
            }
        );
        let ok = ArrayData::from_numbers(DataType::Byte, &[-128.0, 127.0]).unwrap();
        assert_eq!(ok, ArrayData::Byte(vec![-128, 127]));
    }

    #[test]
    fn default_filter_depends_on_dimensionality_and_type() {
        assert_eq!(Filter::default_for(DataType::Float, false), Filter::Linear);
        assert_eq!(Filter::default_for(DataType::HalfFloat, true), Filter::Nearest);
        assert_eq!(Filter::default_for(DataType::Int, false), Filter::Nearest);
    }

    #[test]
    fn clear_value_validation_and_expansion() {
        let scalar = ClearValue::Scalar(3.0);
        scalar.validate(DataType::UnsignedShort, 3).unwrap();
        assert_eq!(scalar.expand(), [3.0; 4]);

        let vector = ClearValue::Vector(vec![1.0, -2.0]);
        vector.validate(DataType::Short, 2).unwrap();
        assert_eq!(vector.expand(), [1.0, -2.0, 0.0, 0.0]);

        assert!(vector.validate(DataType::Short, 3).is_err());
        assert!(vector.validate(DataType::UnsignedShort, 2).is_err());
        assert!(ClearValue::Scalar(0.5).validate(DataType::Int, 1).is_err());
    }

    #[test]
    fn as_bytes_exposes_native_layout() {
        let data = ArrayData::UnsignedShort(vec![1, 0x0203]);
        assert_eq!(data.as_bytes().len(), 4);
        assert_eq!(data.as_bytes()[..2], 1u16.to_ne_bytes());
    }
}
