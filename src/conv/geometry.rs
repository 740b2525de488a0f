use serde::{Deserialize, Serialize};

use crate::conv::error::{ConvError, Result};
use crate::conv::tensor::shape_len;

/// Kernel extent and channel counts for one convolution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvGeometry {
    pub kernel_v: usize,
    pub kernel_h: usize,
    pub input_channels: usize,
    pub output_channels: usize,
}

impl ConvGeometry {
    pub fn new(kernel_v: usize, kernel_h: usize, input_channels: usize, output_channels: usize) -> Self {
        Self { kernel_v, kernel_h, input_channels, output_channels }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kernel_v == 0 || self.kernel_h == 0 {
            return Err(ConvError::ZeroKernel { kernel_v: self.kernel_v, kernel_h: self.kernel_h });
        }
        if self.input_channels == 0 || self.output_channels == 0 {
            return Err(ConvError::ZeroChannels {
                input_channels: self.input_channels,
                output_channels: self.output_channels,
            });
        }
        Ok(())
    }

    /// Number of products summed into one output cell; `None` on usize overflow.
    #[inline]
    pub fn terms_per_output(&self) -> Option<usize> {
        shape_len(&[self.kernel_v, self.kernel_h, self.input_channels])
    }

    /// Element count of the matching filter tensor; `None` on usize overflow.
    #[inline]
    pub fn filter_len(&self) -> Option<usize> {
        self.terms_per_output()?.checked_mul(self.output_channels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strides {
    pub vertical: usize,
    pub horizontal: usize,
}

impl Strides {
    pub fn new(vertical: usize, horizontal: usize) -> Self { Self { vertical, horizontal } }

    pub fn unit() -> Self { Self::new(1, 1) }

    pub fn validate(&self) -> Result<()> {
        if self.vertical == 0 || self.horizontal == 0 {
            return Err(ConvError::ZeroStride { vertical: self.vertical, horizontal: self.horizontal });
        }
        Ok(())
    }
}

impl Default for Strides {
    fn default() -> Self { Self::unit() }
}

/// Spatial padding mode. Only `Valid` is computed; `Same` is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

/// Window positions along one axis for valid convolution; zero when the kernel
/// does not fit. `stride` must be non-zero.
#[inline]
pub fn sweep_count(extent: usize, kernel: usize, stride: usize) -> usize {
    if kernel > extent { return 0; }
    (extent - kernel) / stride + 1
}

/// Output (rows, cols) for an input of `rows x cols`.
pub fn output_dims(rows: usize, cols: usize, geometry: &ConvGeometry, strides: Strides) -> (usize, usize) {
    (
        sweep_count(rows, geometry.kernel_v, strides.vertical),
        sweep_count(cols, geometry.kernel_h, strides.horizontal),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_count_matches_floor_formula() {
        assert_eq!(sweep_count(4, 2, 2), 2);
        assert_eq!(sweep_count(5, 2, 2), 2);
        assert_eq!(sweep_count(5, 3, 1), 3);
        assert_eq!(sweep_count(3, 3, 7), 1);
    }

    #[test]
    fn sweep_count_clamps_when_kernel_exceeds_extent() {
        assert_eq!(sweep_count(2, 3, 1), 0);
        // (2 - 3) / 2 truncates to 0 in signed arithmetic; still no window fits
        assert_eq!(sweep_count(2, 3, 2), 0);
        assert_eq!(sweep_count(0, 1, 1), 0);
    }

    #[test]
    fn geometry_rejects_zero_dims() {
        assert!(matches!(ConvGeometry::new(0, 3, 1, 1).validate(), Err(ConvError::ZeroKernel { .. })));
        assert!(matches!(ConvGeometry::new(3, 3, 0, 1).validate(), Err(ConvError::ZeroChannels { .. })));
        assert!(matches!(ConvGeometry::new(3, 3, 1, 0).validate(), Err(ConvError::ZeroChannels { .. })));
        assert!(ConvGeometry::new(3, 3, 1, 1).validate().is_ok());
    }

    #[test]
    fn geometry_products_report_overflow() {
        let g = ConvGeometry::new(usize::MAX / 2, 3, 1, 1);
        assert_eq!(g.terms_per_output(), None);
        assert_eq!(g.filter_len(), None);
        let g = ConvGeometry::new(3, 3, 2, usize::MAX / 4);
        assert_eq!(g.terms_per_output(), Some(18));
        assert_eq!(g.filter_len(), None);
    }

    #[test]
    fn strides_reject_zero() {
        assert!(matches!(Strides::new(0, 1).validate(), Err(ConvError::ZeroStride { .. })));
        assert!(Strides::unit().validate().is_ok());
    }
}
