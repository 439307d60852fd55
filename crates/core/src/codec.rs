//! Telephony codec and sample-rate conversion
//!
//! Pure functions over sample buffers, shared by the inbound and outbound
//! halves of the audio bridge:
//! - [`mulaw::expand`] / [`mulaw::compress`]: G.711 μ-law <-> 16-bit linear PCM
//! - [`resample`]: linear interpolation between arbitrary rates

/// G.711 μ-law companding
pub mod mulaw {
    /// Bias added before segment lookup
    pub const BIAS: i32 = 0x84;
    /// Magnitude clip applied before biasing
    pub const CLIP: i32 = 32635;

    /// Segment base values used when expanding
    const SEGMENT_BASE: [i32; 8] = [0, 132, 396, 924, 1980, 4092, 8316, 16764];

    /// Expand μ-law bytes to linear PCM samples
    pub fn expand(companded: &[u8]) -> Vec<i16> {
        companded.iter().map(|&b| expand_sample(b)).collect()
    }

    /// Compress linear PCM samples to μ-law bytes
    pub fn compress(linear: &[i16]) -> Vec<u8> {
        linear.iter().map(|&s| compress_sample(s)).collect()
    }

    /// Expand a single μ-law byte
    #[inline]
    pub fn expand_sample(byte: u8) -> i16 {
        let b = !byte;
        let sign = b & 0x80;
        let exponent = ((b >> 4) & 0x07) as usize;
        let mantissa = (b & 0x0F) as i32;
        let magnitude = SEGMENT_BASE[exponent] + (mantissa << (exponent + 3));
        if sign != 0 {
            -magnitude as i16
        } else {
            magnitude as i16
        }
    }

    /// Compress a single linear sample
    #[inline]
    pub fn compress_sample(sample: i16) -> u8 {
        let mut value = sample as i32;
        let sign: u8 = if value < 0 { 0x80 } else { 0x00 };
        if sign != 0 {
            value = -value;
        }
        value = value.min(CLIP) + BIAS;

        // Segment is the position of the highest set bit above bit 7
        let segment_bits = ((value >> 7) & 0xFF) as u8;
        let exponent = if segment_bits == 0 {
            0
        } else {
            7 - segment_bits.leading_zeros() as u8
        };
        let mantissa = ((value >> (exponent + 3)) & 0x0F) as u8;

        !(sign | (exponent << 4) | mantissa)
    }
}

/// Resample linear PCM by linear interpolation
///
/// Output length is `round(len * rate_out / rate_in)`. Positions past the
/// last input sample take the last input sample. Equal rates return the
/// input unchanged.
pub fn resample(samples: &[i16], rate_in: u32, rate_out: u32) -> Vec<i16> {
    if samples.is_empty() || rate_in == 0 || rate_out == 0 {
        return Vec::new();
    }
    if rate_in == rate_out {
        return samples.to_vec();
    }

    let step = rate_in as f64 / rate_out as f64;
    let out_len = (samples.len() as f64 * rate_out as f64 / rate_in as f64).round() as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos.floor() as usize;
        let value = if idx < last {
            let frac = pos - idx as f64;
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[last] as f64
        };
        out.push(clamp_i16(value));
    }
    out
}

#[inline]
fn clamp_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
