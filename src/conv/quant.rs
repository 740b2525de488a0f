//! Fixed-point requantization and saturation helpers.

use serde::{Deserialize, Serialize};

use crate::conv::error::{ConvError, Result};

/// Largest |x - zp| for int8 `x` and int8 `zp`.
pub const MAX_CENTERED: i64 = 255;
/// Largest |product| one (input, weight) pair can add to the accumulator.
pub const MAX_TERM: i64 = MAX_CENTERED * MAX_CENTERED;

pub const MAX_SHIFT: u32 = 62;

/// Per-channel fixed-point multiplier `M / 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rescale {
    pub multiplier: i32,
    pub shift: u32,
}

impl Rescale {
    pub fn new(multiplier: i32, shift: u32) -> Self { Self { multiplier, shift } }

    pub fn validate(&self, channel: usize) -> Result<()> {
        if self.shift < 1 || self.shift > MAX_SHIFT {
            return Err(ConvError::InvalidShift { channel, shift: self.shift });
        }
        if self.multiplier <= 0 {
            return Err(ConvError::InvalidMultiplier { channel, multiplier: self.multiplier });
        }
        Ok(())
    }

    /// `(acc * M + 2^(n-1)) >> n`, round half up.
    ///
    /// Expects a pair that passed [`Rescale::validate`] and an `acc` for which
    /// `acc * M` fits in i64 (see [`accumulator_bound`]); debug builds assert both.
    #[inline]
    pub fn apply(&self, acc: i64) -> i64 {
        debug_assert!(
            (1..=MAX_SHIFT).contains(&self.shift) && self.multiplier > 0,
            "unvalidated rescale {:?}", self
        );
        debug_assert!(
            acc.checked_mul(self.multiplier as i64).is_some(),
            "acc {} * multiplier {} overflows i64", acc, self.multiplier
        );
        let round = 1i64 << (self.shift - 1);
        (acc * self.multiplier as i64 + round) >> self.shift
    }

    /// Whether `apply` stays inside i64 for every |acc| <= `bound`.
    pub fn fits(&self, bound: i64) -> bool {
        bound
            .checked_mul(self.multiplier as i64)
            .and_then(|v| v.checked_add(1i64 << (self.shift - 1)))
            .is_some()
    }
}

/// Zero points and rescale pairs for one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantParams {
    pub input_zero_point: i8,
    /// One per output channel.
    pub weight_zero_points: Vec<i8>,
    pub output_zero_point: i8,
    /// One per output channel.
    pub rescale: Vec<Rescale>,
}

impl QuantParams {
    /// Uniform parameters across `channels` output channels.
    pub fn per_tensor(input_zp: i8, weight_zp: i8, output_zp: i8, rescale: Rescale, channels: usize) -> Self {
        QuantParams {
            input_zero_point: input_zp,
            weight_zero_points: vec![weight_zp; channels],
            output_zero_point: output_zp,
            rescale: vec![rescale; channels],
        }
    }
}

#[inline]
pub fn saturate_i8(v: i64) -> i8 {
    v.clamp(i8::MIN as i64, i8::MAX as i64) as i8
}

/// Bias, rescale, output zero point, then clamp to int8. Same preconditions
/// as [`Rescale::apply`].
#[inline]
pub fn requantize(acc: i64, bias: i32, rescale: Rescale, output_zp: i8) -> i8 {
    debug_assert!(acc.checked_add(bias as i64).is_some(), "acc {} + bias {} overflows i64", acc, bias);
    let scaled = rescale.apply(acc + bias as i64);
    saturate_i8(scaled + output_zp as i64)
}

/// Worst-case |accumulator| after adding the bias, or `None` if that alone
/// leaves i64. Overflow needs more than ~2^47 terms, but adversarial sizes are
/// rejected rather than assumed away.
pub fn accumulator_bound(terms: usize, max_abs_bias: i64) -> Option<i64> {
    i64::try_from(terms).ok()?.checked_mul(MAX_TERM)?.checked_add(max_abs_bias)
}
