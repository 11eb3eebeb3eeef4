//! Pie chart model and SVG rendering

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::Write;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 600.0;
const RADIUS: f64 = 210.0;

/// ggplot colour cycle
const PALETTE: &[&str] = &[
    "#E24A33", "#348ABD", "#988ED5", "#777777", "#FBC15E", "#8EBA42", "#FFB5B8",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub percent: f64,
    /// One decimal place, e.g. `83.3%`.
    pub percent_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieChart {
    pub title: String,
    pub slices: Vec<PieSlice>,
    /// Angle of the first wedge edge, counter-clockwise from three o'clock.
    pub start_angle_degrees: f64,
    /// Draw as a circle regardless of the viewport.
    pub equal_aspect: bool,
}

impl PieChart {
    /// Build a chart from `(label, value)` pairs in the given order.
    ///
    /// Wedges cannot be negative, so non-positive and non-finite values are
    /// left out.
    pub fn from_totals(title: impl Into<String>, totals: &[(String, f64)]) -> Self {
        let positive: Vec<&(String, f64)> = totals
            .iter()
            .filter(|(_, v)| v.is_finite() && *v > 0.0)
            .collect();
        // Shares are taken against the largest wedge so huge totals can't
        // overflow the sum.
        let largest = positive.iter().map(|(_, v)| *v).fold(0.0, f64::max);
        let sum: f64 = positive.iter().map(|(_, v)| v / largest).sum();

        let slices = positive
            .into_iter()
            .map(|(label, value)| {
                let percent = value / largest / sum * 100.0;
                PieSlice {
                    label: label.clone(),
                    value: *value,
                    percent,
                    percent_label: format!("{:.1}%", percent),
                }
            })
            .collect();

        Self {
            title: title.into(),
            slices,
            start_angle_degrees: 90.0,
            equal_aspect: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Render as a standalone SVG document (800×600).
    pub fn to_svg(&self) -> String {
        let cx = WIDTH / 2.0;
        let cy = HEIGHT / 2.0 + 20.0;
        let mut svg = String::new();

        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = WIDTH,
            h = HEIGHT
        );
        let _ = writeln!(svg, r##"<rect width="100%" height="100%" fill="#E5E5E5"/>"##);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="40" text-anchor="middle" font-size="20" font-family="sans-serif">{}</text>"#,
            cx,
            escape_xml(&self.title)
        );

        if self.slices.is_empty() {
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-size="16" font-family="sans-serif">No data</text>"#,
                cx, cy
            );
            svg.push_str("</svg>\n");
            return svg;
        }

        let mut angle = self.start_angle_degrees.to_radians();

        for (i, slice) in self.slices.iter().enumerate() {
            let colour = PALETTE[i % PALETTE.len()];
            let sweep = slice.percent / 100.0 * 2.0 * PI;
            let end = angle + sweep;

            if self.slices.len() == 1 {
                let _ = writeln!(
                    svg,
                    r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}"/>"#,
                    cx, cy, RADIUS, colour
                );
            } else {
                let (x0, y0) = point(cx, cy, RADIUS, angle);
                let (x1, y1) = point(cx, cy, RADIUS, end);
                let large_arc = if sweep > PI { 1 } else { 0 };
                // counter-clockwise on screen is sweep-flag 0
                let _ = writeln!(
                    svg,
                    r#"<path d="M {:.2} {:.2} L {:.2} {:.2} A {:.2} {:.2} 0 {} 0 {:.2} {:.2} Z" fill="{}" stroke="white"/>"#,
                    cx, cy, x0, y0, RADIUS, RADIUS, large_arc, x1, y1, colour
                );
            }

            let mid = angle + sweep / 2.0;
            let (lx, ly) = point(cx, cy, RADIUS * 1.1, mid);
            let anchor = if lx >= cx { "start" } else { "end" };
            let _ = writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="{}" font-size="14" font-family="sans-serif">{}</text>"#,
                lx,
                ly,
                anchor,
                escape_xml(&slice.label)
            );
            let (px, py) = point(cx, cy, RADIUS * 0.6, mid);
            let _ = writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="13" font-family="sans-serif">{}</text>"#,
                px, py, slice.percent_label
            );

            angle = end;
        }

        svg.push_str("</svg>\n");
        svg
    }
}

fn point(cx: f64, cy: f64, radius: f64, angle: f64) -> (f64, f64) {
    (cx + radius * angle.cos(), cy - radius * angle.sin())
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
