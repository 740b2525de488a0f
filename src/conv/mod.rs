//! Quantized int8 2D convolution.
//!
//! `QuantConv2d` owns one layer's weights, bias and quantization parameters,
//! validates them once at construction, and runs the valid-convolution kernel
//! on NHWC input tensors.

pub mod error;
pub mod geometry;
mod kernel;
pub mod quant;
pub mod tensor;

use log::{debug, warn};

pub use error::{ConvError, Result};
pub use geometry::{output_dims, sweep_count, ConvGeometry, Padding, Strides};
pub use quant::{requantize, saturate_i8, QuantParams, Rescale};
pub use tensor::{FilterI8, TensorI8};

use kernel::{conv2d_valid_into, conv2d_valid_par_into, ConvOperands};

/// Execution knobs; results do not depend on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecParams {
    /// Worker threads. 1 runs the serial loop; 0 uses the current rayon pool.
    pub threads: usize,
    /// Outputs with fewer rows than this stay on the serial path.
    pub parallel_min_rows: usize,
}

impl Default for ExecParams {
    fn default() -> Self { Self { threads: 1, parallel_min_rows: 4 } }
}

impl ExecParams {
    /// A pool sized by `threads` (0 lets rayon choose), for reuse across forwards.
    pub fn build_pool(&self) -> std::result::Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new().num_threads(self.threads).build()
    }
}

/// Checks every configuration invariant before any arithmetic runs.
pub fn validate_layer(
    geometry: &ConvGeometry,
    filter: &FilterI8,
    bias: &[i32],
    params: &QuantParams,
    strides: Strides,
    padding: Padding,
) -> Result<()> {
    geometry.validate()?;
    strides.validate()?;
    if padding != Padding::Valid {
        return Err(ConvError::UnsupportedPadding(padding));
    }
    let dims = [geometry.output_channels, geometry.kernel_v, geometry.kernel_h, geometry.input_channels];
    let terms = geometry.terms_per_output().ok_or_else(|| ConvError::overflow("kernel window", &dims[1..]))?;
    let filter_len = geometry.filter_len().ok_or_else(|| ConvError::overflow("filter", &dims))?;
    let expected = (dims[0], dims[1], dims[2], dims[3]);
    if filter.shape() != expected {
        return Err(ConvError::shape("filter", format!("{:?}", expected), format!("{:?}", filter.shape())));
    }
    if filter.data.len() != filter_len {
        return Err(ConvError::shape("filter data", filter_len, filter.data.len()));
    }
    let oc = geometry.output_channels;
    if bias.len() != oc {
        return Err(ConvError::shape("bias", oc, bias.len()));
    }
    if params.weight_zero_points.len() != oc {
        return Err(ConvError::shape("weight zero points", oc, params.weight_zero_points.len()));
    }
    if params.rescale.len() != oc {
        return Err(ConvError::shape("rescale", oc, params.rescale.len()));
    }
    for (channel, (rescale, &b)) in params.rescale.iter().zip(bias).enumerate() {
        rescale.validate(channel)?;
        let fits = quant::accumulator_bound(terms, (b as i64).abs())
            .map(|bound| rescale.fits(bound))
            .unwrap_or(false);
        if !fits {
            return Err(ConvError::AccumulatorOverflow {
                terms,
                multiplier: rescale.multiplier,
                shift: rescale.shift,
            });
        }
    }
    Ok(())
}

fn check_input(geometry: &ConvGeometry, input: &TensorI8) -> Result<()> {
    input.check_consistent("input data")?;
    if input.channels != geometry.input_channels {
        return Err(ConvError::shape("input channels", geometry.input_channels, input.channels));
    }
    Ok(())
}

/// One int8 convolution layer with per-output-channel quantization.
#[derive(Debug, Clone)]
pub struct QuantConv2d {
    geometry: ConvGeometry,
    filter: FilterI8,
    bias: Vec<i32>,
    params: QuantParams,
    strides: Strides,
}

impl QuantConv2d {
    pub fn new(
        geometry: ConvGeometry,
        filter: FilterI8,
        bias: Vec<i32>,
        params: QuantParams,
        strides: Strides,
        padding: Padding,
    ) -> Result<Self> {
        validate_layer(&geometry, &filter, &bias, &params, strides, padding)?;
        debug!(
            "conv layer: kernel {}x{} in={} out={} stride=({}, {})",
            geometry.kernel_v, geometry.kernel_h, geometry.input_channels, geometry.output_channels,
            strides.vertical, strides.horizontal
        );
        Ok(Self { geometry, filter, bias, params, strides })
    }

    pub fn geometry(&self) -> &ConvGeometry { &self.geometry }
    pub fn filter(&self) -> &FilterI8 { &self.filter }
    pub fn bias(&self) -> &[i32] { &self.bias }
    pub fn params(&self) -> &QuantParams { &self.params }
    pub fn strides(&self) -> Strides { self.strides }

    /// (rows, cols, channels) of the output for `input`.
    pub fn output_shape(&self, input: &TensorI8) -> Result<(usize, usize, usize)> {
        check_input(&self.geometry, input)?;
        let (rows, cols) = output_dims(input.rows, input.cols, &self.geometry, self.strides);
        Ok((rows, cols, self.geometry.output_channels))
    }

    fn operands<'a>(&'a self, input: &'a TensorI8) -> ConvOperands<'a> {
        ConvOperands {
            input,
            filter: &self.filter,
            bias: &self.bias,
            params: &self.params,
            strides: self.strides,
        }
    }

    fn allocate_output(&self, input: &TensorI8) -> Result<TensorI8> {
        let (rows, cols, channels) = self.output_shape(input)?;
        if rows == 0 || cols == 0 {
            warn!(
                "kernel {}x{} does not fit input {}: empty output",
                self.geometry.kernel_v, self.geometry.kernel_h, input
            );
        }
        TensorI8::try_new(rows, cols, channels)
    }

    pub fn forward(&self, input: &TensorI8) -> Result<TensorI8> {
        let mut output = self.allocate_output(input)?;
        debug!("conv forward {} -> {}", input, output);
        conv2d_valid_into(self.operands(input), &mut output);
        Ok(output)
    }

    /// Writes into a caller-allocated output of exactly the output shape.
    pub fn forward_into(&self, input: &TensorI8, output: &mut TensorI8) -> Result<()> {
        let expected = self.output_shape(input)?;
        if output.shape() != expected || output.check_consistent("output data").is_err() {
            return Err(ConvError::shape("output", format!("{:?}", expected), format!("{:?}", output.shape())));
        }
        conv2d_valid_into(self.operands(input), output);
        Ok(())
    }

    /// Parallel over output rows on the current rayon pool.
    pub fn forward_par(&self, input: &TensorI8) -> Result<TensorI8> {
        let mut output = self.allocate_output(input)?;
        conv2d_valid_par_into(self.operands(input), &mut output);
        Ok(output)
    }

    /// Parallel over output rows on a caller-owned pool. Prefer this (or
    /// `threads: 0` inside `pool.install`) when running many forwards.
    pub fn forward_in(&self, input: &TensorI8, pool: &rayon::ThreadPool) -> Result<TensorI8> {
        pool.install(|| self.forward_par(input))
    }

    /// Picks the serial or parallel path from `exec`. With `threads > 1` this
    /// builds a fresh pool for the call, so its threads are spawned and joined
    /// every time; repeated callers should hold a pool and use [`Self::forward_in`].
    pub fn forward_with(&self, input: &TensorI8, exec: &ExecParams) -> Result<TensorI8> {
        let (rows, _, _) = self.output_shape(input)?;
        if exec.threads == 1 || rows < exec.parallel_min_rows {
            return self.forward(input);
        }
        if exec.threads == 0 {
            return self.forward_par(input);
        }
        match exec.build_pool() {
            Ok(pool) => self.forward_in(input, &pool),
            Err(e) => {
                warn!("failed to build {}-thread pool ({}), using global pool", exec.threads, e);
                self.forward_par(input)
            }
        }
    }
}

/// One-shot convolution without keeping a layer around.
pub fn conv2d(
    input: &TensorI8,
    filter: &FilterI8,
    bias: &[i32],
    params: &QuantParams,
    geometry: &ConvGeometry,
    strides: Strides,
    padding: Padding,
) -> Result<TensorI8> {
    validate_layer(geometry, filter, bias, params, strides, padding)?;
    check_input(geometry, input)?;
    let (rows, cols) = output_dims(input.rows, input.cols, geometry, strides);
    let mut output = TensorI8::try_new(rows, cols, geometry.output_channels)?;
    conv2d_valid_into(ConvOperands { input, filter, bias, params, strides }, &mut output);
    Ok(output)
}
