//! Various utility functions and helpful constants

use num_traits::Float;

/// Distance from `base` to `freq`, in cents.  Positive if `freq` is sharp.
pub fn calculate_cents(base: f32, freq: f32) -> f32 {
    1200.0 * Float::log2(freq / base)
}

/// Scale a frequency by a pitch offset given in cents
pub fn offset_by_cents(freq: f32, cents: f32) -> f32 {
    freq * Float::powf(2.0f32, cents / 1200.0)
}

/// Round to the nearest integer and saturate into an `i8`
pub fn saturate_i8(x: f32) -> i8 {
    let rounded = Float::round(x);
    if rounded >= i8::MAX as f32 {
        i8::MAX
    } else if rounded <= i8::MIN as f32 {
        i8::MIN
    } else {
        rounded as i8
    }
}

/// Elapsed milliseconds between two readings of a wrapping millisecond clock
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}
