//! Valid-convolution loop nest over NHWC int8 tensors.
//!
//! Callers validate shapes and quantization parameters first (see
//! [`QuantConv2d::new`](crate::conv::QuantConv2d::new)); these functions index
//! without further checks.

use rayon::prelude::*;

use crate::conv::geometry::Strides;
use crate::conv::quant::{requantize, QuantParams};
use crate::conv::tensor::{FilterI8, TensorI8};

/// Borrowed, already-validated operands shared read-only by every output cell.
#[derive(Clone, Copy)]
pub(crate) struct ConvOperands<'a> {
    pub input: &'a TensorI8,
    pub filter: &'a FilterI8,
    pub bias: &'a [i32],
    pub params: &'a QuantParams,
    pub strides: Strides,
}

impl ConvOperands<'_> {
    /// Raw accumulator for output channel `oc` with the window's top-left at (`top`, `left`).
    #[inline]
    fn accumulate(&self, oc: usize, top: usize, left: usize) -> i64 {
        let input = self.input;
        let filter = self.filter;
        let input_zp = self.params.input_zero_point as i32;
        let weight_zp = self.params.weight_zero_points[oc] as i32;
        // With channel-last layout one kernel row covers kernel_h * in_channels
        // contiguous input bytes, in the same [kx][ic] order as the filter.
        let span = filter.kernel_h * filter.in_channels;
        let window = filter.window(oc);
        let mut acc: i64 = 0;
        for ky in 0..filter.kernel_v {
            let base = ((top + ky) * input.cols + left) * input.channels;
            let xs = &input.data[base..base + span];
            let ws = &window[ky * span..(ky + 1) * span];
            for (&x, &w) in xs.iter().zip(ws) {
                let xv = x as i32 - input_zp;
                let wv = w as i32 - weight_zp;
                acc += xv as i64 * wv as i64;
            }
        }
        acc
    }

    /// Fills one output row (`out_cols * out_channels` cells).
    fn compute_row(&self, r: usize, out_row: &mut [i8]) {
        let out_channels = self.filter.out_channels;
        let top = r * self.strides.vertical;
        for (c, cell) in out_row.chunks_exact_mut(out_channels).enumerate() {
            let left = c * self.strides.horizontal;
            for (oc, out) in cell.iter_mut().enumerate() {
                let acc = self.accumulate(oc, top, left);
                *out = requantize(acc, self.bias[oc], self.params.rescale[oc], self.params.output_zero_point);
            }
        }
    }
}

/// Serial path. `output` must already have the valid-convolution shape.
pub(crate) fn conv2d_valid_into(ops: ConvOperands<'_>, output: &mut TensorI8) {
    let row_len = output.cols * output.channels;
    if row_len == 0 { return; }
    for (r, out_row) in output.data.chunks_exact_mut(row_len).enumerate() {
        ops.compute_row(r, out_row);
    }
}

/// Parallel path over disjoint output rows; bit-identical to the serial path.
pub(crate) fn conv2d_valid_par_into(ops: ConvOperands<'_>, output: &mut TensorI8) {
    let row_len = output.cols * output.channels;
    if row_len == 0 { return; }
    output
        .data
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(r, out_row)| ops.compute_row(r, out_row));
}
