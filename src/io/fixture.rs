//! JSON layer cases: one layer's configuration, an input tensor and
//! optionally the output a reference interpreter produced for it.

use anyhow::{Context, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::conv::{
    ConvGeometry, ExecParams, FilterI8, Padding, QuantConv2d, QuantParams, Strides, TensorI8,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerCase {
    #[serde(default)]
    pub name: String,
    pub geometry: ConvGeometry,
    #[serde(default)]
    pub strides: Strides,
    #[serde(default)]
    pub padding: Padding,
    pub params: QuantParams,
    pub bias: Vec<i32>,
    pub filter: FilterI8,
    pub input: TensorI8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<TensorI8>,
}

/// Outcome of comparing a computed output against `LayerCase::expected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub shape: (usize, usize, usize),
    pub expected_shape: (usize, usize, usize),
    pub cells: usize,
    pub mismatches: usize,
    pub max_abs_diff: u8,
}

impl CaseReport {
    pub fn passed(&self) -> bool { self.shape == self.expected_shape && self.mismatches == 0 }
}

impl LayerCase {
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(&path).with_context(|| format!("open case file: {}", path.as_ref().display()))?;
        let case: LayerCase = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse case file: {}", path.as_ref().display()))?;
        Ok(case)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let f = File::create(&path).with_context(|| format!("create case file: {}", path.as_ref().display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, self).context("serialize case")?;
        w.flush().context("flush case file")?;
        Ok(())
    }

    pub fn layer(&self) -> crate::conv::Result<QuantConv2d> {
        QuantConv2d::new(
            self.geometry,
            self.filter.clone(),
            self.bias.clone(),
            self.params.clone(),
            self.strides,
            self.padding,
        )
    }

    pub fn run(&self, exec: &ExecParams) -> Result<TensorI8> {
        let layer = self.layer().with_context(|| format!("build layer for case '{}'", self.name))?;
        let out = layer
            .forward_with(&self.input, exec)
            .with_context(|| format!("run case '{}'", self.name))?;
        Ok(out)
    }

    /// `None` when the case carries no expected output.
    pub fn check(&self, output: &TensorI8) -> Option<CaseReport> {
        let expected = self.expected.as_ref()?;
        let same_shape = output.shape() == expected.shape();
        let (mut mismatches, mut max_abs_diff) = (0usize, 0u8);
        if same_shape {
            for (&a, &b) in output.data.iter().zip(&expected.data) {
                let d = (a as i16 - b as i16).unsigned_abs() as u8;
                if d != 0 { mismatches += 1; }
                max_abs_diff = max_abs_diff.max(d);
            }
        } else {
            mismatches = expected.data.len().max(output.data.len());
        }
        Some(CaseReport {
            name: self.name.clone(),
            shape: output.shape(),
            expected_shape: expected.shape(),
            cells: expected.data.len(),
            mismatches,
            max_abs_diff,
        })
    }
}

/// Uniform random int8 tensor; same seed, same tensor. Panics like
/// [`TensorI8::new`] on an overflowing shape.
pub fn random_tensor(rows: usize, cols: usize, channels: usize, seed: u64) -> TensorI8 {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut t = TensorI8::new(rows, cols, channels);
    rng.fill(&mut t.data[..]);
    t
}

/// Uniform random filter for the given geometry.
pub fn random_filter(geometry: &ConvGeometry, seed: u64) -> FilterI8 {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut f = FilterI8::new(
        geometry.output_channels,
        geometry.kernel_v,
        geometry.kernel_h,
        geometry.input_channels,
    );
    rng.fill(&mut f.data[..]);
    f
}
