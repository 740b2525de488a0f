use thiserror::Error;

use crate::conv::geometry::Padding;

/// Configuration and contract errors raised before any output cell is computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvError {
    /// Kernel height or width is zero
    #[error("kernel dimensions must be positive: {kernel_v}x{kernel_h}")]
    ZeroKernel { kernel_v: usize, kernel_h: usize },

    /// Input or output channel count is zero
    #[error("channel counts must be positive: in={input_channels} out={output_channels}")]
    ZeroChannels { input_channels: usize, output_channels: usize },

    /// Vertical or horizontal stride is zero
    #[error("strides must be positive: ({vertical}, {horizontal})")]
    ZeroStride { vertical: usize, horizontal: usize },

    /// Rescale shift outside 1..=62
    #[error("rescale shift {shift} for channel {channel} is outside 1..=62")]
    InvalidShift { channel: usize, shift: u32 },

    /// Rescale multiplier is not positive
    #[error("rescale multiplier {multiplier} for channel {channel} must be positive")]
    InvalidMultiplier { channel: usize, multiplier: i32 },

    /// A tensor or vector does not match the declared geometry
    #[error("{what} shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { what: &'static str, expected: String, actual: String },

    /// Worst-case accumulator times multiplier does not fit in i64
    #[error("accumulator may overflow i64: {terms} terms, multiplier {multiplier}, shift {shift}")]
    AccumulatorOverflow { terms: usize, multiplier: i32, shift: u32 },

    /// Only valid (unpadded) convolution is implemented
    #[error("unsupported padding mode: {0:?}")]
    UnsupportedPadding(Padding),
}

impl ConvError {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        ConvError::ShapeMismatch { what, expected: expected.to_string(), actual: actual.to_string() }
    }

    pub(crate) fn overflow(what: &'static str, dims: &[usize]) -> Self {
        ConvError::ShapeMismatch {
            what,
            expected: "an element count that fits usize".to_string(),
            actual: format!("{:?} (product overflows usize)", dims),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvError>;
