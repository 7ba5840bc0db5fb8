//! Pixel and sample helpers shared by the presenter and the audio sinks.

use super::{FrameError, PixelFormat, validate_frame};

/// Expand a 5-bit channel to 8 bits, replicating the high bits into the low ones.
#[inline]
pub fn expand5(c: u16) -> u8 {
    let c = (c & 0x1f) as u8;
    (c << 3) | (c >> 2)
}

/// Expand a 6-bit channel to 8 bits.
#[inline]
pub fn expand6(c: u16) -> u8 {
    let c = (c & 0x3f) as u8;
    (c << 2) | (c >> 4)
}

/// Decode one native-endian pixel into `[r, g, b, 255]`.
#[inline]
fn decode_pixel(format: PixelFormat, px: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Rgb1555 => {
            let v = u16::from_ne_bytes([px[0], px[1]]);
            [expand5(v >> 10), expand5(v >> 5), expand5(v), 0xff]
        }
        PixelFormat::Rgb565 => {
            let v = u16::from_ne_bytes([px[0], px[1]]);
            [expand5(v >> 11), expand6(v >> 5), expand5(v), 0xff]
        }
        PixelFormat::Xrgb8888 => {
            let v = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
            [(v >> 16) as u8, (v >> 8) as u8, v as u8, 0xff]
        }
    }
}

/// Decode a software frame into tightly packed RGBA8 rows (first row first).
///
/// `pitch` is the byte distance between rows in `data`; padding past the visible
/// pixels is skipped. `out` is resized to `width * height * 4`.
pub fn decode_to_rgba(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
    pitch: usize,
    out: &mut Vec<u8>,
) -> Result<(), FrameError> {
    validate_frame(width, height, pitch, data.len(), format)?;

    let bpp = format.bytes_per_pixel();
    let (w, h) = (width as usize, height as usize);
    out.clear();
    out.reserve(w * h * 4);

    for y in 0..h {
        let row = &data[y * pitch..y * pitch + w * bpp];
        for px in row.chunks_exact(bpp) {
            out.extend_from_slice(&decode_pixel(format, px));
        }
    }
    Ok(())
}

/// Apply linear gain to one sample.
///
/// - gain >= 1: passthrough
/// - 0 < gain < 1: `round(s * gain)`, clamped to the i16 range
/// - gain <= 0 (or NaN): silence
#[inline]
pub fn scale_sample(s: i16, gain: f32) -> i16 {
    if !(gain > 0.0) {
        return 0;
    }
    if gain >= 1.0 {
        return s;
    }
    (s as f32 * gain)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Apply gain to a whole buffer, writing into `out` (same length as `samples`).
pub fn apply_gain(samples: &[i16], gain: f32, out: &mut Vec<i16>) {
    out.clear();
    if gain >= 1.0 {
        out.extend_from_slice(samples);
    } else {
        out.extend(samples.iter().map(|&s| scale_sample(s, gain)));
    }
}

/// Clamp a widened value back into the i16 range.
#[inline]
pub fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
