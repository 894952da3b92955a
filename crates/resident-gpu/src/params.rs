//! Resident array parameters.
//!
//! [`ResidentArrayDescriptor`] is the typed parameter set. [`ResidentArrayDescriptor::from_json`]
//! accepts the loosely typed key/value form (`{"name": .., "type": "FLOAT", "numComponents": ..}`)
//! and applies the same checks, in the same order, with messages naming the offending key.

use resident_format::codec::check_host_array;
use resident_format::{ArrayData, ClearValue, DataType, Dimensions, Filter, Shape, Wrap};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ResidentError, Result};

const VALID_KEYS: [&str; 11] = [
    "name",
    "type",
    "numComponents",
    "dimensions",
    "filter",
    "wrapS",
    "wrapT",
    "writable",
    "numBuffers",
    "clearValue",
    "array",
];
const REQUIRED_KEYS: [&str; 4] = ["name", "type", "numComponents", "dimensions"];

#[derive(Debug, Clone, PartialEq)]
pub struct ResidentArrayDescriptor {
    pub name: String,
    pub ty: DataType,
    pub component_count: u8,
    pub dimensions: Dimensions,
    /// `None` picks the default for the shape and type (see [`Filter::default_for`]).
    pub filter: Option<Filter>,
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
    pub writable: bool,
    pub buffer_count: u32,
    pub clear_value: ClearValue,
    pub initial_data: Option<ArrayData>,
}

/// Checked form of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Validated {
    pub shape: Shape,
    pub filter: Filter,
}

impl ResidentArrayDescriptor {
    pub fn new(
        name: impl Into<String>,
        ty: DataType,
        component_count: u8,
        dimensions: impl Into<Dimensions>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            component_count,
            dimensions: dimensions.into(),
            filter: None,
            wrap_s: Wrap::ClampToEdge,
            wrap_t: Wrap::ClampToEdge,
            writable: false,
            buffer_count: 1,
            clear_value: ClearValue::default(),
            initial_data: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_wrap(mut self, wrap_s: Wrap, wrap_t: Wrap) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    pub fn with_clear_value(mut self, clear_value: impl Into<ClearValue>) -> Self {
        self.clear_value = clear_value.into();
        self
    }

    pub fn with_initial_data(mut self, data: impl Into<ArrayData>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<Validated> {
        let name = &self.name;
        let config = |msg: String| ResidentError::Configuration(format!("array `{name}`: {msg}"));

        if !(1..=4).contains(&self.component_count) {
            return Err(config(format!(
                "invalid numComponents {}, must be in range [1-4]",
                self.component_count
            )));
        }
        let shape = Shape::from_dimensions(self.dimensions).map_err(|e| config(e.to_string()))?;
        let filter = self
            .filter
            .unwrap_or_else(|| Filter::default_for(self.ty, shape.is_1d()));
        if filter == Filter::Linear && !self.ty.is_float() {
            return Err(config(format!(
                "LINEAR filtering is not supported on integer types, use NEAREST for type {}",
                self.ty
            )));
        }
        if self.buffer_count == 0 {
            return Err(config("invalid numBuffers 0, must be a positive integer".into()));
        }
        self.clear_value
            .validate(self.ty, self.component_count)
            .map_err(|e| config(e.to_string()))?;
        if let Some(data) = &self.initial_data {
            check_host_array(data, self.ty, self.component_count, &shape)
                .map_err(|e| config(e.to_string()))?;
        }
        Ok(Validated { shape, filter })
    }

    /// Parses the key/value parameter form.
    pub fn from_json(params: &Value) -> Result<Self> {
        let object = params.as_object().ok_or_else(|| {
            ResidentError::Configuration(format!("params must be an object, got {params}"))
        })?;
        let name = object.get("name").and_then(Value::as_str).unwrap_or_default();
        let config = |msg: String| ResidentError::Configuration(format!("array `{name}`: {msg}"));

        if let Some(key) = object.keys().find(|key| !VALID_KEYS.contains(&key.as_str())) {
            return Err(config(format!(
                "invalid params key `{key}`, valid keys are {VALID_KEYS:?}"
            )));
        }
        if let Some(key) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(config(format!("required params key `{key}` was not passed")));
        }

        let raw: RawParams =
            serde_json::from_value(params.clone()).map_err(|e| config(e.to_string()))?;

        let component_count = whole_number(&raw.num_components)
            .filter(|n| (1..=4).contains(n))
            .ok_or_else(|| {
                config(format!(
                    "invalid numComponents {}, must be in range [1-4]",
                    raw.num_components
                ))
            })? as u8;

        let dimensions = match &raw.dimensions {
            RawDimensions::Length(length) => positive_u32(length).map(Dimensions::Length),
            RawDimensions::Size([width, height]) => positive_u32(width)
                .zip(positive_u32(height))
                .map(Dimensions::from),
        }
        .ok_or_else(|| {
            config(format!(
                "invalid dimensions {}, must be a positive integer or [width, height]",
                raw.dimensions
            ))
        })?;

        let filter = raw
            .filter
            .as_deref()
            .map(str::parse::<Filter>)
            .transpose()
            .map_err(|e| config(e.to_string()))?;
        let is_float_name = matches!(raw.ty.as_str(), "FLOAT" | "HALF_FLOAT");
        if filter == Some(Filter::Linear) && !is_float_name {
            return Err(config(format!(
                "LINEAR filtering is not supported on integer types, use NEAREST for type {}",
                raw.ty
            )));
        }
        let wrap = |value: &Option<String>| -> Result<Wrap> {
            value
                .as_deref()
                .map_or(Ok(Wrap::ClampToEdge), str::parse::<Wrap>)
                .map_err(|e| config(e.to_string()))
        };
        let wrap_s = wrap(&raw.wrap_s)?;
        let wrap_t = wrap(&raw.wrap_t)?;
        let ty: DataType = raw.ty.parse().map_err(|e: resident_format::FormatError| config(e.to_string()))?;

        let buffer_count = match &raw.num_buffers {
            None => 1,
            Some(value) => positive_u32(value).ok_or_else(|| {
                config(format!(
                    "invalid numBuffers {value}, must be a positive integer"
                ))
            })?,
        };

        let clear_value = match raw.clear_value {
            None => ClearValue::default(),
            Some(RawClearValue::Scalar(value)) => ClearValue::Scalar(value),
            Some(RawClearValue::Vector(values)) => ClearValue::Vector(values),
        };
        clear_value
            .validate(ty, component_count)
            .map_err(|e| config(e.to_string()))?;

        let initial_data = raw
            .array
            .map(|values| ArrayData::from_numbers(ty, &values))
            .transpose()
            .map_err(|e| config(e.to_string()))?;

        let descriptor = Self {
            name: raw.name,
            ty,
            component_count,
            dimensions,
            filter,
            wrap_s,
            wrap_t,
            writable: raw.writable.unwrap_or(false),
            buffer_count,
            clear_value,
            initial_data,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// A non-negative integer, written either as `3` or as `3.0`.
fn whole_number(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(n))
            .map(|n| n as u64)
    })
}

fn positive_u32(value: &Value) -> Option<u32> {
    whole_number(value)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParams {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    num_components: Value,
    dimensions: RawDimensions,
    filter: Option<String>,
    wrap_s: Option<String>,
    wrap_t: Option<String>,
    writable: Option<bool>,
    num_buffers: Option<Value>,
    clear_value: Option<RawClearValue>,
    array: Option<Vec<f64>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDimensions {
    Size([Value; 2]),
    Length(Value),
}

impl core::fmt::Display for RawDimensions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RawDimensions::Size([w, h]) => write!(f, "[{w}, {h}]"),
            RawDimensions::Length(length) => write!(f, "{length}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawClearValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_message(result: Result<ResidentArrayDescriptor>) -> String {
        match result {
            Err(ResidentError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn json_params_parse_with_defaults() {
        let descriptor = ResidentArrayDescriptor::from_json(&json!({
            "name": "temperature",
            "type": "FLOAT",
            "numComponents": 1,
            "dimensions": [4, 4],
            "numBuffers": 2,
            "writable": true,
        }))
        .unwrap();
        assert_eq!(
            descriptor,
            ResidentArrayDescriptor::new("temperature", DataType::Float, 1, (4, 4))
                .writable(true)
                .with_buffer_count(2)
        );
    }

    #[test]
    fn json_params_carry_optional_fields() {
        let descriptor = ResidentArrayDescriptor::from_json(&json!({
            "name": "ids",
            "type": "SHORT",
            "numComponents": 2,
            "dimensions": 3,
            "wrapS": "REPEAT",
            "clearValue": [1, -1],
            "array": [1, 2, 3, 4, 5, 6],
        }))
        .unwrap();
        assert_eq!(descriptor.dimensions, Dimensions::Length(3));
        assert_eq!(descriptor.wrap_s, Wrap::Repeat);
        assert_eq!(descriptor.clear_value, ClearValue::Vector(vec![1.0, -1.0]));
        assert_eq!(
            descriptor.initial_data,
            Some(ArrayData::Short(vec![1, 2, 3, 4, 5, 6]))
        );
    }

    #[test]
    fn integral_floats_count_as_integers() {
        let descriptor = ResidentArrayDescriptor::from_json(&json!({
            "name": "loose",
            "type": "FLOAT",
            "numComponents": 2.0,
            "dimensions": [3.0, 2],
            "numBuffers": 1.0,
        }))
        .unwrap();
        assert_eq!(descriptor.component_count, 2);
        assert_eq!(descriptor.dimensions, Dimensions::Size { width: 3, height: 2 });
        assert_eq!(descriptor.buffer_count, 1);

        for (key, value) in [("numComponents", json!(1.5)), ("dimensions", json!(-4.0))] {
            let mut params = json!({
                "name": "loose",
                "type": "FLOAT",
                "numComponents": 1,
                "dimensions": 4,
            });
            params[key] = value;
            let msg = config_message(ResidentArrayDescriptor::from_json(&params));
            assert!(msg.contains(key), "{msg}");
        }
    }

    #[test]
    fn unknown_and_missing_keys_are_rejected_first() {
        let msg = config_message(ResidentArrayDescriptor::from_json(&json!({
            "name": "a",
            "type": "BOGUS",
            "numComponents": 9,
            "dimensions": 4,
            "color": "red",
        })));
        assert!(msg.contains("`color`"), "{msg}");

        let msg = config_message(ResidentArrayDescriptor::from_json(&json!({
            "name": "a",
            "type": "FLOAT",
            "numComponents": 1,
        })));
        assert!(msg.contains("`dimensions`"), "{msg}");
    }

    #[test]
    fn validation_runs_in_declared_order() {
        // numComponents is checked before the (also invalid) type.
        let msg = config_message(ResidentArrayDescriptor::from_json(&json!({
            "name": "a",
            "type": "BOGUS",
            "numComponents": 5,
            "dimensions": 4,
        })));
        assert!(msg.contains("numComponents"), "{msg}");

        let msg = config_message(ResidentArrayDescriptor::from_json(&json!({
            "name": "a",
            "type": "INT",
            "numComponents": 1,
            "dimensions": [0, 0],
        })));
        assert!(msg.contains("dimensions"), "{msg}");

        let msg = config_message(ResidentArrayDescriptor::from_json(&json!({
            "name": "a",
            "type": "INT",
            "numComponents": 1,
            "dimensions": [2, 2],
            "filter": "LINEAR",
        })));
        assert!(msg.contains("LINEAR"), "{msg}");

        let msg = config_message(ResidentArrayDescriptor::from_json(&json!({
            "name": "a",
            "type": "UNSIGNED_BYTE",
            "numComponents": 2,
            "dimensions": [2, 2],
            "clearValue": [1, 2, 3],
        })));
        assert!(msg.contains("clear value"), "{msg}");
    }

    #[test]
    fn typed_descriptor_validation() {
        let ok = ResidentArrayDescriptor::new("a", DataType::HalfFloat, 4, (8, 8))
            .validate()
            .unwrap();
        assert_eq!(ok.filter, Filter::Linear);

        let one_d = ResidentArrayDescriptor::new("a", DataType::Float, 1, 10u32)
            .validate()
            .unwrap();
        assert_eq!(one_d.filter, Filter::Nearest);

        assert!(ResidentArrayDescriptor::new("a", DataType::Float, 1, 4u32)
            .with_buffer_count(0)
            .validate()
            .is_err());
        assert!(ResidentArrayDescriptor::new("a", DataType::Float, 1, 4u32)
            .with_initial_data(vec![0.0f32; 3])
            .validate()
            .is_err());
    }
}
