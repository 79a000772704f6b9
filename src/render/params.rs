//! Render parameters and override resolution

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::catalog::StickerDescriptor;
use crate::errors::{Result, StickerError};
use crate::text_fit::auto_fit;

/// Output width of a single sticker
pub const DEFAULT_WIDTH: u32 = 296;

/// Output height of a single sticker
pub const DEFAULT_HEIGHT: u32 = 256;

pub const DEFAULT_STROKE_WIDTH: i32 = 9;

pub const DEFAULT_STROKE_COLOR: &str = "#ffffff";

pub const DEFAULT_LINE_SPACING: f64 = 1.3;

/// Everything that determines a rendered sticker; the unit of caching
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderParameters {
    /// Virtual URL of the sticker image
    pub image: String,
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub font_color: String,
    pub font_size: i32,
    /// Rotation in degrees
    pub rotate: f64,
    pub stroke_color: String,
    pub stroke_width: i32,
    pub line_spacing: f64,
    /// Virtual URL of the font
    pub font: String,
    pub width: u32,
    pub height: u32,
}

/// Raw caller overrides, as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementOverrides {
    pub x: Option<String>,
    pub y: Option<String>,
    pub rotate: Option<String>,
    pub font_size: Option<String>,
    pub font_color: Option<String>,
    pub stroke_width: Option<String>,
    pub stroke_color: Option<String>,
    pub line_spacing: Option<String>,
}

impl PlacementOverrides {
    /// Auto-fit applies when no explicit font size was given
    pub fn wants_auto_fit(&self) -> bool {
        self.font_size.as_deref().map_or(true, |s| s.trim().is_empty())
    }
}

/// Numeric override target
pub trait OverrideValue: FromStr + Copy {
    /// `self + offset`, `None` when the result is out of range
    fn offset_by(self, offset: Self) -> Option<Self>;

    /// Whether a parsed value can be rendered at all
    fn is_usable(self) -> bool {
        true
    }
}

impl OverrideValue for i32 {
    fn offset_by(self, offset: Self) -> Option<Self> {
        self.checked_add(offset)
    }
}

impl OverrideValue for f64 {
    fn offset_by(self, offset: Self) -> Option<Self> {
        Some(self + offset).filter(|v| v.is_finite())
    }

    fn is_usable(self) -> bool {
        self.is_finite()
    }
}

/// Resolve a raw override against `default`.
///
/// Absent or blank input yields the default. `^n` means default plus `n`.
/// Anything unparseable, out of range or non-finite is a
/// [`StickerError::ParameterResolution`] carrying the raw value.
pub fn resolve_value<T: OverrideValue>(raw: Option<&str>, default: T) -> Result<T> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    let rejected = || StickerError::ParameterResolution(value.to_string());
    let parse = |s: &str| {
        s.trim()
            .parse::<T>()
            .ok()
            .filter(|v| v.is_usable())
            .ok_or_else(rejected)
    };

    match value.strip_prefix('^') {
        Some(offset) => default.offset_by(parse(offset)?).ok_or_else(rejected),
        None => parse(value),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Default rotation in degrees for a stored rotation value
pub fn default_rotation(stored: i32) -> f64 {
    (f64::from(stored) / 10.0).to_degrees()
}

impl RenderParameters {
    /// Merge overrides, descriptor defaults and global defaults
    pub fn build(
        descriptor: &StickerDescriptor,
        text: Option<&str>,
        overrides: &PlacementOverrides,
        image: String,
        font: String,
    ) -> Result<Self> {
        let placement = &descriptor.default_text;
        let text = text
            .filter(|t| !t.is_empty())
            .map_or_else(|| placement.text.clone(), str::to_string);

        let rotate = resolve_value(overrides.rotate.as_deref(), default_rotation(placement.rotation))?;
        let font_size = if overrides.wants_auto_fit() {
            auto_fit(&text, placement.size, rotate, f64::from(DEFAULT_WIDTH))
        } else {
            resolve_value(overrides.font_size.as_deref(), placement.size)?
        };

        Ok(Self {
            image,
            x: resolve_value(overrides.x.as_deref(), placement.x)?,
            y: resolve_value(overrides.y.as_deref(), placement.y)?,
            text,
            font_color: non_empty(overrides.font_color.as_deref())
                .unwrap_or(&descriptor.color)
                .to_string(),
            font_size,
            rotate,
            stroke_color: non_empty(overrides.stroke_color.as_deref())
                .unwrap_or(DEFAULT_STROKE_COLOR)
                .to_string(),
            stroke_width: resolve_value(overrides.stroke_width.as_deref(), DEFAULT_STROKE_WIDTH)?,
            line_spacing: resolve_value(overrides.line_spacing.as_deref(), DEFAULT_LINE_SPACING)?,
            font,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        })
    }

    /// Parameters for a grid tile: descriptor defaults with `label` as text
    pub fn for_tile(descriptor: &StickerDescriptor, label: &str, image: String, font: String) -> Self {
        let placement = &descriptor.default_text;
        Self {
            image,
            x: placement.x,
            y: placement.y,
            text: label.to_string(),
            font_color: descriptor.color.clone(),
            font_size: placement.size,
            rotate: default_rotation(placement.rotation),
            stroke_color: DEFAULT_STROKE_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            line_spacing: DEFAULT_LINE_SPACING,
            font,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }

    /// Hex SHA-256 of the parameter set, independent of field order
    pub fn fingerprint(&self) -> String {
        let mut normalized = self.clone();
        // -0.0 and 0.0 compare equal and must hash equal; adding +0.0 folds them
        normalized.rotate += 0.0;
        normalized.line_spacing += 0.0;

        let canonical: BTreeMap<String, serde_json::Value> = match serde_json::to_value(&normalized) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        let encoded = serde_json::to_string(&canonical).unwrap_or_default();

        let digest = Sha256::digest(encoded.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DefaultPlacement, StickerDescriptor};
    use rstest::rstest;

    fn descriptor() -> StickerDescriptor {
        StickerDescriptor {
            id: "1".to_string(),
            name: "Miku 01".to_string(),
            character: "Miku".to_string(),
            image: "miku/Miku_01.png".to_string(),
            color: "#33ccbb".to_string(),
            default_text: DefaultPlacement {
                text: "Hi".to_string(),
                x: 150,
                y: 40,
                rotation: -2,
                size: 40,
            },
        }
    }

    fn build(text: Option<&str>, overrides: &PlacementOverrides) -> Result<RenderParameters> {
        RenderParameters::build(
            &descriptor(),
            text,
            overrides,
            "https://pjsk.local/resource/miku/Miku_01.png".to_string(),
            "https://pjsk.local/fonts/YurukaFangTang.ttf".to_string(),
        )
    }

    #[rstest]
    #[case(None, 100, 100)]
    #[case(Some(""), 100, 100)]
    #[case(Some("  "), 100, 100)]
    #[case(Some("42"), 100, 42)]
    #[case(Some("^-5"), 100, 95)]
    #[case(Some("^7"), 100, 107)]
    #[case(Some(" 12 "), 100, 12)]
    fn test_resolve_int(#[case] raw: Option<&str>, #[case] default: i32, #[case] expected: i32) {
        assert_eq!(resolve_value(raw, default).unwrap(), expected);
    }

    #[rstest]
    #[case(Some("1.5"), 1.3, 1.5)]
    #[case(Some("^0.2"), 1.3, 1.5)]
    #[case(None, 1.3, 1.3)]
    fn test_resolve_float(#[case] raw: Option<&str>, #[case] default: f64, #[case] expected: f64) {
        assert!((resolve_value(raw, default).unwrap() - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case("abc")]
    #[case("^x")]
    #[case("1.5")]
    #[case("^")]
    #[case("^2147483647")]
    #[case("99999999999")]
    fn test_resolve_int_rejects(#[case] raw: &str) {
        match resolve_value::<i32>(Some(raw), 10) {
            Err(StickerError::ParameterResolution(value)) => assert_eq!(value, raw),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[rstest]
    #[case("inf")]
    #[case("NaN")]
    #[case("-inf")]
    #[case("^inf")]
    #[case("^1e308")]
    fn test_resolve_float_rejects_non_finite(#[case] raw: &str) {
        let default = if raw == "^1e308" { f64::MAX } else { 1.3 };
        match resolve_value::<f64>(Some(raw), default) {
            Err(StickerError::ParameterResolution(value)) => assert_eq!(value, raw),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_build_rejects_non_finite_rotation() {
        for raw in ["inf", "NaN"] {
            let overrides = PlacementOverrides {
                rotate: Some(raw.to_string()),
                ..PlacementOverrides::default()
            };
            assert!(matches!(
                build(None, &overrides),
                Err(StickerError::ParameterResolution(value)) if value == raw
            ));
        }
    }

    #[test]
    fn test_build_uses_descriptor_defaults() {
        let params = build(None, &PlacementOverrides::default()).unwrap();

        assert_eq!(params.text, "Hi");
        assert_eq!((params.x, params.y), (150, 40));
        assert_eq!(params.font_color, "#33ccbb");
        assert_eq!(params.stroke_color, DEFAULT_STROKE_COLOR);
        assert_eq!(params.stroke_width, DEFAULT_STROKE_WIDTH);
        assert_eq!((params.width, params.height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
        assert!((params.rotate - (-0.2f64).to_degrees()).abs() < 1e-9);
        // short text fits at the default size
        assert_eq!(params.font_size, 40);
    }

    #[test]
    fn test_build_applies_overrides() {
        let overrides = PlacementOverrides {
            x: Some("^10".to_string()),
            y: Some("60".to_string()),
            rotate: Some("15".to_string()),
            font_size: Some("30".to_string()),
            font_color: Some("#000000".to_string()),
            stroke_width: Some("4".to_string()),
            stroke_color: Some(String::new()),
            line_spacing: Some("2".to_string()),
        };
        let params = build(Some("Hello"), &overrides).unwrap();

        assert_eq!(params.text, "Hello");
        assert_eq!((params.x, params.y), (160, 60));
        assert!((params.rotate - 15.0).abs() < 1e-9);
        assert_eq!(params.font_size, 30);
        assert_eq!(params.font_color, "#000000");
        assert_eq!(params.stroke_width, 4);
        // blank color falls back to the default
        assert_eq!(params.stroke_color, DEFAULT_STROKE_COLOR);
        assert!((params.line_spacing - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_auto_fits_long_text() {
        let text = "A very long sticker caption that cannot fit";
        let params = build(Some(text), &PlacementOverrides::default()).unwrap();
        assert!(params.font_size < 40);
    }

    #[test]
    fn test_build_reports_bad_override() {
        let overrides = PlacementOverrides {
            y: Some("up".to_string()),
            ..PlacementOverrides::default()
        };
        assert!(matches!(
            build(None, &overrides),
            Err(StickerError::ParameterResolution(raw)) if raw == "up"
        ));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = build(None, &PlacementOverrides::default()).unwrap();
        let b = build(None, &PlacementOverrides::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_per_field() {
        let base = build(None, &PlacementOverrides::default()).unwrap();

        let mut moved = base.clone();
        moved.x += 1;
        let mut recolored = base.clone();
        recolored.font_color = "#000000".to_string();
        let mut retexted = base.clone();
        retexted.text = "Bye".to_string();

        let fingerprints = [
            base.fingerprint(),
            moved.fingerprint(),
            recolored.fingerprint(),
            retexted.fingerprint(),
        ];
        for (i, a) in fingerprints.iter().enumerate() {
            for b in &fingerprints[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_fingerprint_treats_negative_zero_as_zero() {
        let mut a = build(None, &PlacementOverrides::default()).unwrap();
        a.rotate = 0.0;
        let mut b = a.clone();
        b.rotate = -0.0;
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
