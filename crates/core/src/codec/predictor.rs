//! PNG row predictors (`/Predictor` >= 10).

use crate::error::{PdfError, Result};

/// Undo PNG prediction. Each encoded row carries a leading filter-type byte.
pub fn png_unpredict(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    let pixel_bits = colors
        .checked_mul(bits_per_component)
        .ok_or_else(|| PdfError::DecodeError("predictor pixel width overflows".into()))?;
    let row_bytes = pixel_bits
        .checked_mul(columns)
        .ok_or_else(|| PdfError::DecodeError("predictor row width overflows".into()))?
        .div_ceil(8);
    if row_bytes == 0 {
        return Err(PdfError::DecodeError("predictor row width is zero".into()));
    }
    if row_bytes > data.len() {
        return Err(PdfError::DecodeError(format!(
            "predictor row of {} bytes exceeds {} bytes of data",
            row_bytes,
            data.len()
        )));
    }
    let stride = (pixel_bits / 8).max(1);

    let mut out = Vec::with_capacity(data.len());
    let mut prior = vec![0u8; row_bytes];
    let mut line = vec![0u8; row_bytes];

    for encoded in data.chunks_exact(row_bytes + 1) {
        let filter = encoded[0];
        for (i, &raw) in encoded[1..].iter().enumerate() {
            let (left, upper_left) = if i >= stride {
                (line[i - stride], prior[i - stride])
            } else {
                (0, 0)
            };
            let up = prior[i];
            let guess = match filter {
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) >> 1) as u8,
                4 => paeth(left, up, upper_left),
                // 0 and unknown filter types pass through
                _ => 0,
            };
            line[i] = raw.wrapping_add(guess);
        }
        out.extend_from_slice(&line);
        std::mem::swap(&mut prior, &mut line);
    }

    Ok(out)
}

/// Whichever of left, up and upper-left is closest to `left + up - upper_left`.
fn paeth(left: u8, up: u8, upper_left: u8) -> u8 {
    let estimate = i16::from(left) + i16::from(up) - i16::from(upper_left);
    let dist = |v: u8| (estimate - i16::from(v)).abs();
    if dist(left) <= dist(up) && dist(left) <= dist(upper_left) {
        left
    } else if dist(up) <= dist(upper_left) {
        up
    } else {
        upper_left
    }
}
