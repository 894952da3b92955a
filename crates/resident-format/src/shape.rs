use crate::FormatError;

/// Caller-facing array extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimensions {
    /// 1-D array of `n` elements, laid out on a power-of-two texture.
    Length(u32),
    Size { width: u32, height: u32 },
}

impl From<u32> for Dimensions {
    fn from(length: u32) -> Self {
        Dimensions::Length(length)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Dimensions::Size { width, height }
    }
}

/// Physical texture extent plus the logical length of 1-D arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    length: Option<u32>,
    width: u32,
    height: u32,
}

impl Shape {
    pub fn from_dimensions(dimensions: Dimensions) -> Result<Self, FormatError> {
        match dimensions {
            Dimensions::Length(0) => Err(FormatError::InvalidDimensions(
                "length must be a positive integer".into(),
            )),
            Dimensions::Length(length) => {
                let (width, height) = layout_1d(length);
                Ok(Self {
                    length: Some(length),
                    width,
                    height,
                })
            }
            Dimensions::Size { width, height } => {
                if width == 0 || height == 0 {
                    return Err(FormatError::InvalidDimensions(format!(
                        "width and height must be positive integers, got {width}x{height}"
                    )));
                }
                Ok(Self {
                    length: None,
                    width,
                    height,
                })
            }
        }
    }

    pub fn is_1d(&self) -> bool {
        self.length.is_some()
    }

    /// Logical length of a 1-D array; `None` for 2-D arrays.
    pub fn length(&self) -> Option<u32> {
        self.length
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        match self.length {
            Some(length) => Dimensions::Length(length),
            None => Dimensions::Size {
                width: self.width,
                height: self.height,
            },
        }
    }

    /// Number of elements visible to the host.
    pub fn logical_len(&self) -> usize {
        match self.length {
            Some(length) => length as usize,
            None => self.texel_count(),
        }
    }

    /// Number of texels backing the array on the device. Saturates on targets where the extent
    /// does not fit in `usize`.
    pub fn texel_count(&self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }
}

// Smallest e >= 1 with 2^e >= length, split as evenly as possible with width the larger side.
fn layout_1d(length: u32) -> (u32, u32) {
    let exponent = u64::from(length).next_power_of_two().trailing_zeros().max(1);
    let width = 1u32 << exponent.div_ceil(2);
    let height = 1u32 << (exponent / 2);
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimensional_layout_is_power_of_two_and_covers_length() {
        let cases = [
            (1, 2, 1),
            (2, 2, 1),
            (3, 2, 2),
            (4, 2, 2),
            (5, 4, 2),
            (16, 4, 4),
            (17, 8, 4),
            (1000, 32, 32),
            (1025, 64, 32),
        ];
        for (length, width, height) in cases {
            let shape = Shape::from_dimensions(Dimensions::Length(length)).unwrap();
            assert_eq!((shape.width(), shape.height()), (width, height), "length {length}");
            assert!(shape.texel_count() >= length as usize);
            assert_eq!(shape.logical_len(), length as usize);
        }
    }

    #[test]
    fn largest_length_does_not_overflow() {
        let shape = Shape::from_dimensions(Dimensions::Length(u32::MAX)).unwrap();
        assert_eq!((shape.width(), shape.height()), (1 << 16, 1 << 16));
    }

    #[test]
    fn two_dimensional_sizes_are_used_verbatim() {
        let shape = Shape::from_dimensions((3u32, 5u32).into()).unwrap();
        assert!(!shape.is_1d());
        assert_eq!(shape.length(), None);
        assert_eq!(shape.logical_len(), 15);
        assert_eq!(shape.dimensions(), Dimensions::Size { width: 3, height: 5 });
    }

    #[test]
    fn zero_extents_are_rejected() {
        assert!(Shape::from_dimensions(Dimensions::Length(0)).is_err());
        assert!(Shape::from_dimensions((0u32, 0u32).into()).is_err());
        assert!(Shape::from_dimensions((4u32, 0u32).into()).is_err());
    }
}
