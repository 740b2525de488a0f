use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conv::error::{ConvError, Result};

/// Element count for a shape, or `None` if the product overflows usize.
pub fn shape_len(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn checked_len(what: &'static str, dims: &[usize]) -> Result<usize> {
    shape_len(dims).ok_or_else(|| ConvError::overflow(what, dims))
}

/// A 3D INT8 feature map.
///
/// Layout is [row][col][channel] (NHWC without the batch axis): the channel
/// index varies fastest in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorI8 {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
    pub data: Vec<i8>,
}

impl TensorI8 {
    /// Zero-filled tensor.
    ///
    /// # Panics
    /// If `rows * cols * channels` overflows usize; use [`TensorI8::try_new`]
    /// for shapes that come from outside the program.
    pub fn new(rows: usize, cols: usize, channels: usize) -> Self {
        match Self::try_new(rows, cols, channels) {
            Ok(t) => t,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_new(rows: usize, cols: usize, channels: usize) -> Result<Self> {
        let len = checked_len("tensor", &[rows, cols, channels])?;
        Ok(TensorI8 { rows, cols, channels, data: vec![0i8; len] })
    }

    pub fn from_vec(rows: usize, cols: usize, channels: usize, data: Vec<i8>) -> Result<Self> {
        let expected = checked_len("tensor data", &[rows, cols, channels])?;
        if data.len() != expected {
            return Err(ConvError::shape("tensor data", expected, data.len()));
        }
        Ok(TensorI8 { rows, cols, channels, data })
    }

    #[inline]
    fn index(&self, r: usize, c: usize, ch: usize) -> usize {
        (r * self.cols + c) * self.channels + ch
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize, ch: usize) -> i8 {
        self.data[self.index(r, c, ch)]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, ch: usize, val: i8) {
        let idx = self.index(r, c, ch);
        self.data[idx] = val;
    }

    pub fn fill(&mut self, val: i8) {
        self.data.fill(val);
    }

    pub fn shape(&self) -> (usize, usize, usize) { (self.rows, self.cols, self.channels) }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Checks that the buffer length agrees with the declared shape. Fields are
    /// public, so deserialized tensors go through this before use.
    pub fn check_consistent(&self, what: &'static str) -> Result<()> {
        let expected = checked_len(what, &[self.rows, self.cols, self.channels])?;
        if self.data.len() != expected {
            return Err(ConvError::shape(what, expected, self.data.len()));
        }
        Ok(())
    }
}

impl fmt::Display for TensorI8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{} (i8)", self.rows, self.cols, self.channels)
    }
}

/// Convolution weights laid out as [out_channel][kernel_row][kernel_col][in_channel].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterI8 {
    pub out_channels: usize,
    pub kernel_v: usize,
    pub kernel_h: usize,
    pub in_channels: usize,
    pub data: Vec<i8>,
}

impl FilterI8 {
    /// Zero-filled filter.
    ///
    /// # Panics
    /// If the element count overflows usize.
    pub fn new(out_channels: usize, kernel_v: usize, kernel_h: usize, in_channels: usize) -> Self {
        let len = match checked_len("filter", &[out_channels, kernel_v, kernel_h, in_channels]) {
            Ok(len) => len,
            Err(e) => panic!("{}", e),
        };
        FilterI8 { out_channels, kernel_v, kernel_h, in_channels, data: vec![0i8; len] }
    }

    pub fn from_vec(
        out_channels: usize, kernel_v: usize, kernel_h: usize, in_channels: usize,
        data: Vec<i8>,
    ) -> Result<Self> {
        let expected = checked_len("filter data", &[out_channels, kernel_v, kernel_h, in_channels])?;
        if data.len() != expected {
            return Err(ConvError::shape("filter data", expected, data.len()));
        }
        Ok(FilterI8 { out_channels, kernel_v, kernel_h, in_channels, data })
    }

    #[inline]
    fn index(&self, oc: usize, ky: usize, kx: usize, ic: usize) -> usize {
        ((oc * self.kernel_v + ky) * self.kernel_h + kx) * self.in_channels + ic
    }

    #[inline]
    pub fn get(&self, oc: usize, ky: usize, kx: usize, ic: usize) -> i8 {
        self.data[self.index(oc, ky, kx, ic)]
    }

    #[inline]
    pub fn set(&mut self, oc: usize, ky: usize, kx: usize, ic: usize, val: i8) {
        let idx = self.index(oc, ky, kx, ic);
        self.data[idx] = val;
    }

    pub fn fill(&mut self, val: i8) {
        self.data.fill(val);
    }

    /// All weights of one output channel, in [ky][kx][ic] order.
    pub fn window(&self, oc: usize) -> &[i8] {
        let len = self.kernel_v * self.kernel_h * self.in_channels;
        &self.data[oc * len..(oc + 1) * len]
    }

    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.out_channels, self.kernel_v, self.kernel_h, self.in_channels)
    }
}

impl fmt::Display for FilterI8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}x{} (i8)", self.out_channels, self.kernel_v, self.kernel_h, self.in_channels)
    }
}
