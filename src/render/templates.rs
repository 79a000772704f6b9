//! Markup templates
//!
//! Three documents are produced: a single sticker (`<svg>`), a grid of
//! sticker fragments and a plain-text panel. Grids and panels wrap their
//! content in `.main-wrapper`, which is the element that gets captured.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::render::params::RenderParameters;

/// Element captured for grids and panels
pub const WRAPPER_SELECTOR: &str = ".main-wrapper";

/// Element captured for single stickers
pub const STICKER_SELECTOR: &str = "svg";

/// Widest grid, in tiles
const MAX_GRID_COLUMNS: usize = 8;

/// Standalone SVG for one sticker.
///
/// Lines of `text` are stacked around `(x, y)` so the block stays centered
/// whatever the line count; the stroke is painted under the fill.
pub fn sticker_svg(params: &RenderParameters) -> String {
    let fingerprint = params.fingerprint();
    let id = &fingerprint[..12];
    let font_family = format!("sticker-font-{id}");
    let lines: Vec<&str> = params.text.split('\n').collect();
    let first_dy = -((lines.len() as f64 - 1.0) * params.line_spacing / 2.0) + 0.0;

    let mut tspans = String::new();
    for (index, line) in lines.iter().enumerate() {
        let dy = if index == 0 { first_dy } else { params.line_spacing };
        tspans.push_str(&format!(
            r#"<tspan x="{x}" dy="{dy}em">{line}</tspan>"#,
            x = params.x,
            line = encode_text(line),
        ));
    }

    format!(
        r#"<svg id="sticker-{id}" xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
<defs><style>@font-face {{ font-family: "{font_family}"; src: url("{font}"); }}</style></defs>
<image href="{image}" x="0" y="0" width="{width}" height="{height}" preserveAspectRatio="xMidYMid meet"/>
<text x="{x}" y="{y}" transform="rotate({rotate} {x} {y})" font-family="{font_family}" font-size="{size}" fill="{fill}" stroke="{stroke}" stroke-width="{stroke_width}" stroke-linejoin="round" paint-order="stroke" text-anchor="middle" dominant-baseline="middle">{tspans}</text>
</svg>"#,
        width = params.width,
        height = params.height,
        font = encode_double_quoted_attribute(&params.font),
        image = encode_double_quoted_attribute(&params.image),
        x = params.x,
        y = params.y,
        rotate = params.rotate,
        size = params.font_size,
        fill = encode_double_quoted_attribute(&params.font_color),
        stroke = encode_double_quoted_attribute(&params.stroke_color),
        stroke_width = params.stroke_width,
    )
}

/// Column count for a grid of `count` tiles: roughly square, at most 8 wide
pub fn grid_columns(count: usize) -> usize {
    let mut columns = 1;
    while columns * columns < count {
        columns += 1;
    }
    columns.clamp(1, MAX_GRID_COLUMNS)
}

/// Grid document holding one pre-rendered fragment per tile
pub fn sticker_grid(items: &[String]) -> String {
    let columns = grid_columns(items.len());

    let mut tiles = String::new();
    for item in items {
        tiles.push_str(&format!(r#"<div class="tile">{item}</div>"#));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body {{ margin: 0; background: #ffffff; }}
.main-wrapper {{ display: inline-grid; grid-template-columns: repeat({columns}, auto); gap: 8px; padding: 16px; background: #ffffff; }}
.tile {{ display: flex; align-items: center; justify-content: center; }}
</style>
</head>
<body><div class="main-wrapper">{tiles}</div></body>
</html>"#
    )
}

/// Plain-text panel, whitespace preserved
pub fn text_panel(text: &str, font: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
@font-face {{ font-family: "panel-font"; src: url("{font}"); }}
body {{ margin: 0; background: #ffffff; }}
.main-wrapper {{ display: inline-block; padding: 24px 32px; background: #ffffff; }}
.main-wrapper pre {{ margin: 0; font-family: "panel-font", sans-serif; font-size: 20px; line-height: 1.5; color: #333333; }}
</style>
</head>
<body><div class="main-wrapper"><pre>{text}</pre></div></body>
</html>"#,
        font = encode_double_quoted_attribute(font),
        text = encode_text(text),
    )
}
