//! Text width estimation and auto-fit
//!
//! The estimate is a heuristic, not glyph metrics: full-width characters
//! count as one em, everything else as half an em. The rotated bounding
//! width is `|w·cos θ| + |size·sin θ|`.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::east_asian_width::WIDE_OR_AMBIGUOUS;

/// Smallest font size auto-fit will go down to
pub const MIN_FONT_SIZE: i32 = 8;

/// Headroom applied to the estimate before comparing with the target width
pub const SAFETY_MULTIPLIER: f64 = 1.2;

fn width_cache() -> &'static RwLock<HashMap<char, bool>> {
    static CACHE: OnceLock<RwLock<HashMap<char, bool>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Whether `c` is wide, fullwidth or ambiguous under East Asian Width
pub fn is_full_width(c: char) -> bool {
    if c.is_ascii() {
        return false;
    }

    if let Ok(cache) = width_cache().read() {
        if let Some(&wide) = cache.get(&c) {
            return wide;
        }
    }

    let wide = in_wide_or_ambiguous(c);
    if let Ok(mut cache) = width_cache().write() {
        cache.insert(c, wide);
    }
    wide
}

fn in_wide_or_ambiguous(c: char) -> bool {
    let cp = u32::from(c);
    WIDE_OR_AMBIGUOUS
        .binary_search_by(|&(start, end)| {
            if end < cp {
                std::cmp::Ordering::Less
            } else if start > cp {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// Approximate rendered width of `text` at `size`, rotated by `rotation_deg`
pub fn approximate_width(text: &str, size: i32, rotation_deg: f64) -> f64 {
    let size = f64::from(size);
    let width: f64 = text
        .chars()
        .map(|c| if is_full_width(c) { size } else { size / 2.0 })
        .sum();

    let theta = rotation_deg.to_radians();
    (width * theta.cos()).abs() + (size * theta.sin()).abs()
}

/// Largest size in `[min_size, start_size]` whose padded estimate fits
/// `target_width`, searching downwards one unit at a time. Returns
/// `min_size` when nothing fits; `start_size` below `min_size` is returned
/// unchanged.
pub fn auto_fit_with(
    text: &str,
    start_size: i32,
    rotation_deg: f64,
    target_width: f64,
    min_size: i32,
    safety_multiplier: f64,
) -> i32 {
    let mut size = start_size;
    while size > min_size {
        if approximate_width(text, size, rotation_deg) * safety_multiplier <= target_width {
            break;
        }
        size -= 1;
    }
    size
}

/// [`auto_fit_with`] using [`MIN_FONT_SIZE`] and [`SAFETY_MULTIPLIER`]
pub fn auto_fit(text: &str, start_size: i32, rotation_deg: f64, target_width: f64) -> i32 {
    auto_fit_with(
        text,
        start_size,
        rotation_deg,
        target_width,
        MIN_FONT_SIZE,
        SAFETY_MULTIPLIER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EPSILON: f64 = 1e-9;

    #[rstest]
    #[case('A', false)]
    #[case(' ', false)]
    #[case('字', true)]
    #[case('あ', true)]
    #[case('Ａ', true)]
    #[case('é', true)]
    #[case('\u{0300}', true)]
    #[case('—', true)]
    #[case('ب', false)]
    #[case('ñ', false)]
    #[case('\u{FF61}', false)]
    #[case('\u{1F600}', true)]
    #[case('\u{20000}', true)]
    fn test_is_full_width(#[case] c: char, #[case] expected: bool) {
        assert_eq!(is_full_width(c), expected);
        // memoized answer is the same
        assert_eq!(is_full_width(c), expected);
    }

    #[test]
    fn test_range_table_is_sorted_and_disjoint() {
        for pair in WIDE_OR_AMBIGUOUS.windows(2) {
            assert!(pair[0].0 <= pair[0].1);
            assert!(pair[0].1 < pair[1].0);
        }
    }

    #[test]
    fn test_approximate_width_unrotated() {
        assert!((approximate_width("A", 20, 0.0) - 10.0).abs() < EPSILON);
        assert!((approximate_width("字", 20, 0.0) - 20.0).abs() < EPSILON);
        assert!((approximate_width("A字", 20, 0.0) - 30.0).abs() < EPSILON);
        assert!(approximate_width("", 20, 0.0).abs() < EPSILON);
    }

    #[test]
    fn test_approximate_width_rotated() {
        // at 90 degrees only the glyph height remains
        assert!((approximate_width("AAAA", 20, 90.0) - 20.0).abs() < 1e-6);
        let expected = 40.0 * 45f64.to_radians().cos() + 20.0 * 45f64.to_radians().sin();
        assert!((approximate_width("AAAA", 20, -45.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_auto_fit_keeps_fitting_size() {
        assert_eq!(auto_fit("Hi", 40, 0.0, 296.0), 40);
    }

    #[test]
    fn test_auto_fit_shrinks_long_text() {
        let size = auto_fit("This text is far too long for one line", 47, 0.0, 296.0);
        assert!(size < 47);
        assert!(size >= MIN_FONT_SIZE);
        assert!(approximate_width("This text is far too long for one line", size, 0.0) * SAFETY_MULTIPLIER <= 296.0);
    }

    #[test]
    fn test_auto_fit_floors_at_min() {
        let text = "字".repeat(200);
        assert_eq!(auto_fit(&text, 47, 0.0, 296.0), MIN_FONT_SIZE);
    }

    #[test]
    fn test_auto_fit_custom_bounds() {
        assert_eq!(auto_fit_with("AAAA", 30, 0.0, 40.0, 12, 1.0), 20);
        assert_eq!(auto_fit_with("AAAA", 30, 0.0, 1.0, 12, 1.0), 12);
    }

    #[test]
    fn test_auto_fit_monotonic_in_target_width() {
        let text = "Sekai 表情 sticker";
        let mut previous = MIN_FONT_SIZE;
        for target in (0..600_i32).step_by(7) {
            let size = auto_fit(text, 60, 12.0, f64::from(target));
            assert!(size >= previous);
            assert!((MIN_FONT_SIZE..=60).contains(&size));
            previous = size;
        }
    }
}
