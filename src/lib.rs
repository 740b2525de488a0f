// Int8 quantized 2D convolution: kernel, layer file and JSON cases
pub mod conv;
pub mod io;

// Re-exports for callers that only run layers
pub use conv::{
    conv2d, ConvError, ConvGeometry, ExecParams, FilterI8, Padding, QuantConv2d, QuantParams,
    Rescale, Strides, TensorI8,
};
