use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::conv::{
    ConvGeometry, FilterI8, Padding, QuantConv2d, QuantParams, Rescale, Strides,
};

const L_MAGIC: &[u8; 8] = b"QCONVL01"; // QConv layer v1
pub const LAYER_VERSION: u32 = 1;
// Refuse to allocate absurd buffers from a corrupt header.
const MAX_ELEMS: usize = 1 << 30;

/// One convolution layer as stored on disk.
///
/// Format (all little-endian):
/// magic: 8 bytes b"QCONVL01"
/// u32 version
/// u32 out_ch, u32 kernel_v, u32 kernel_h, u32 in_ch
/// u32 stride_v, u32 stride_h
/// u8  padding (0 = valid, 1 = same)
/// i8  input_zp, i8 output_zp
/// i8  weight_zp[out_ch]
/// i32 multiplier[out_ch], u32 shift[out_ch]
/// i32 bias[out_ch]
/// i8  weights[out_ch * kernel_v * kernel_h * in_ch]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFile {
    pub version: u32,
    pub geometry: ConvGeometry,
    pub strides: Strides,
    pub padding: Padding,
    pub params: QuantParams,
    pub bias: Vec<i32>,
    pub filter: FilterI8,
}

fn read_u32<R: Read>(r: &mut R, what: &str) -> Result<u32> {
    let mut b4 = [0u8; 4];
    r.read_exact(&mut b4).with_context(|| format!("read {}", what))?;
    Ok(u32::from_le_bytes(b4))
}

fn read_dim<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let v = read_u32(r, what)? as usize;
    if v > MAX_ELEMS { bail!("{} = {} is implausibly large", what, v); }
    Ok(v)
}

fn read_i8s<R: Read>(r: &mut R, n: usize, what: &str) -> Result<Vec<i8>> {
    let mut buf = vec![0u8; n];
    // Truncated files are an error; nothing is zero-filled.
    r.read_exact(&mut buf).with_context(|| format!("read {} i8 {}", n, what))?;
    Ok(buf.into_iter().map(|b| b as i8).collect())
}

fn read_4byte<R: Read, T>(r: &mut R, n: usize, what: &str, conv: fn([u8; 4]) -> T) -> Result<Vec<T>> {
    let mut buf = vec![0u8; n * 4];
    r.read_exact(&mut buf).with_context(|| format!("read {} {}", n, what))?;
    Ok(buf
        .chunks_exact(4)
        .map(|c| conv([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl LayerFile {
    pub fn from_layer(layer: &QuantConv2d) -> Self {
        LayerFile {
            version: LAYER_VERSION,
            geometry: *layer.geometry(),
            strides: layer.strides(),
            padding: Padding::Valid,
            params: layer.params().clone(),
            bias: layer.bias().to_vec(),
            filter: layer.filter().clone(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(&path).with_context(|| format!("open layer file: {}", path.as_ref().display()))?;
        let mut r = BufReader::new(f);
        Self::read_from(&mut r).with_context(|| format!("parse layer file: {}", path.as_ref().display()))
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).context("read magic")?;
        if &magic != L_MAGIC { bail!("bad layer magic"); }
        let version = read_u32(r, "version")?;
        if version != LAYER_VERSION { bail!("unsupported layer version {}", version); }
        let out_ch = read_dim(r, "out_ch")?;
        let kernel_v = read_dim(r, "kernel_v")?;
        let kernel_h = read_dim(r, "kernel_h")?;
        let in_ch = read_dim(r, "in_ch")?;
        let stride_v = read_dim(r, "stride_v")?;
        let stride_h = read_dim(r, "stride_h")?;
        let mut b1 = [0u8; 1];
        r.read_exact(&mut b1).context("read padding")?;
        let padding = match b1[0] {
            0 => Padding::Valid,
            1 => Padding::Same,
            other => bail!("unknown padding tag {}", other),
        };
        let zps = read_i8s(r, 2, "zero points")?;
        let (input_zp, output_zp) = (zps[0], zps[1]);
        let weight_zps = read_i8s(r, out_ch, "weight zero points")?;
        let multipliers = read_4byte(r, out_ch, "multipliers", i32::from_le_bytes)?;
        let shifts = read_4byte(r, out_ch, "shifts", u32::from_le_bytes)?;
        let bias = read_4byte(r, out_ch, "bias", i32::from_le_bytes)?;

        let n_weights = out_ch
            .checked_mul(kernel_v)
            .and_then(|v| v.checked_mul(kernel_h))
            .and_then(|v| v.checked_mul(in_ch))
            .filter(|&v| v <= MAX_ELEMS)
            .context("weight count overflows")?;
        let weights = read_i8s(r, n_weights, "weights")?;

        let rescale = multipliers.into_iter().zip(shifts).map(|(m, s)| Rescale::new(m, s)).collect();
        Ok(Self {
            version,
            geometry: ConvGeometry::new(kernel_v, kernel_h, in_ch, out_ch),
            strides: Strides::new(stride_v, stride_h),
            padding,
            params: QuantParams {
                input_zero_point: input_zp,
                weight_zero_points: weight_zps,
                output_zero_point: output_zp,
                rescale,
            },
            bias,
            filter: FilterI8::from_vec(out_ch, kernel_v, kernel_h, in_ch, weights)?,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let f = File::create(&path).with_context(|| format!("create layer file: {}", path.as_ref().display()))?;
        let mut w = BufWriter::new(f);
        self.write_to(&mut w)?;
        w.flush().context("flush layer file")?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let g = &self.geometry;
        let oc = g.output_channels;
        if self.params.weight_zero_points.len() != oc || self.params.rescale.len() != oc || self.bias.len() != oc {
            bail!("per-channel vectors do not match out_ch = {}", oc);
        }
        let filter_len = g.filter_len().context("filter size overflows usize")?;
        if self.filter.data.len() != filter_len {
            bail!("filter has {} weights, geometry needs {}", self.filter.data.len(), filter_len);
        }
        let dim = |v: usize| -> Result<[u8; 4]> {
            Ok(u32::try_from(v).context("dimension exceeds u32")?.to_le_bytes())
        };
        w.write_all(L_MAGIC)?;
        w.write_all(&self.version.to_le_bytes())?;
        for v in [oc, g.kernel_v, g.kernel_h, g.input_channels, self.strides.vertical, self.strides.horizontal] {
            w.write_all(&dim(v)?)?;
        }
        let tag: u8 = match self.padding { Padding::Valid => 0, Padding::Same => 1 };
        w.write_all(&[tag, self.params.input_zero_point as u8, self.params.output_zero_point as u8])?;
        let zps: Vec<u8> = self.params.weight_zero_points.iter().map(|&z| z as u8).collect();
        w.write_all(&zps)?;
        for r in &self.params.rescale { w.write_all(&r.multiplier.to_le_bytes())?; }
        for r in &self.params.rescale { w.write_all(&r.shift.to_le_bytes())?; }
        for b in &self.bias { w.write_all(&b.to_le_bytes())?; }
        let weights: Vec<u8> = self.filter.data.iter().map(|&v| v as u8).collect();
        w.write_all(&weights).context("write weights")?;
        Ok(())
    }

    /// Validates the stored configuration and builds the layer.
    pub fn into_layer(self) -> crate::conv::Result<QuantConv2d> {
        QuantConv2d::new(self.geometry, self.filter, self.bias, self.params, self.strides, self.padding)
    }
}
