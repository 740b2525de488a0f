//! On-disk forms of a layer: the binary layer file and JSON test cases.

pub mod fixture;
pub mod layer_file;

pub use fixture::{random_filter, random_tensor, CaseReport, LayerCase};
pub use layer_file::LayerFile;
