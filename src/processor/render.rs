//! Histogram plots
//!
//! Renders filled step histograms as standalone SVG documents with an
//! experiment label and a stat box, optionally rasterised to PNG. The style
//! comes from an explicit [`RenderConfig`] value; nothing here reads or writes
//! shared plot state.

use crate::aggregation::Histogram;
use crate::config::{PlotFormat, RenderConfig};
use crate::constants::{HISTOGRAM_DEFINITIONS, plot_filename};
use crate::error::{DimuonError, Result};
use crate::processor::writer::write_atomically;

use resvg::{tiny_skia, usvg};
use std::fmt::{self, Write as FmtWrite};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Turns one histogram into a plot file
pub trait HistogramRenderer: Send + Sync {
    /// File extension of the produced plots
    fn extension(&self) -> &'static str;

    fn render(&self, histogram: &Histogram, path: &Path) -> Result<()>;
}

/// Renderer for the requested image format
pub fn renderer_for(format: PlotFormat, config: RenderConfig) -> Box<dyn HistogramRenderer> {
    match format {
        PlotFormat::Png => Box::new(PngRenderer::new(config)),
        PlotFormat::Svg => Box::new(SvgRenderer::new(config)),
    }
}

/// Plot path of a histogram inside `output_dir`
pub fn plot_path(histogram: &Histogram, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = HISTOGRAM_DEFINITIONS
        .iter()
        .find(|definition| definition.name == histogram.name())
        .map(|definition| definition.stem)
        .unwrap_or(histogram.name());
    output_dir.join(plot_filename(stem, extension))
}

/// Render every histogram into `output_dir`, returning the written paths
pub fn render_all(
    renderer: &dyn HistogramRenderer,
    histograms: &[Histogram],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    histograms
        .iter()
        .map(|histogram| {
            let path = plot_path(histogram, output_dir, renderer.extension());
            renderer.render(histogram, &path)?;
            Ok(path)
        })
        .collect()
}

/// SVG renderer driven by a [`RenderConfig`]
#[derive(Debug, Clone, Default)]
pub struct SvgRenderer {
    config: RenderConfig,
}

/// Plot frame in pixels
#[derive(Debug, Clone, Copy)]
struct Frame {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl Frame {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

impl SvgRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn frame(&self) -> Frame {
        let (w, h) = (f64::from(self.config.width), f64::from(self.config.height));
        Frame {
            left: w * self.config.left_margin,
            right: w * (1.0 - self.config.right_margin),
            top: h * self.config.top_margin,
            bottom: h * (1.0 - self.config.bottom_margin),
        }
    }

    /// Build the SVG document for a histogram
    pub fn to_svg(&self, histogram: &Histogram) -> std::result::Result<String, fmt::Error> {
        let c = &self.config;
        let frame = self.frame();
        let binning = histogram.binning();

        // Leave headroom above the tallest bin for the stat box
        let y_axis = nice_axis(0.0, (histogram.maximum() * 1.1).max(1.0), 6);
        let y_max = y_axis.last().copied().unwrap_or(1.0);
        let x_axis = nice_axis(binning.low, binning.high, 8);

        let x_to_px = |x: f64| frame.left + (x - binning.low) / (binning.high - binning.low) * frame.width();
        let y_to_px = |y: f64| frame.bottom - y / y_max * frame.height();

        let mut svg = String::new();
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{font}" font-size="{size}">"#,
            w = c.width,
            h = c.height,
            font = escape(&c.font_family),
            size = c.font_size
        )?;
        writeln!(svg, r#"<rect x="0" y="0" width="{}" height="{}" fill="white"/>"#, c.width, c.height)?;

        // Step outline over the in-range bins, closed to the baseline for the fill
        let mut outline = Vec::with_capacity(2 * binning.bins + 2);
        outline.push((x_to_px(binning.low), y_to_px(0.0)));
        for (i, &content) in histogram.contents().iter().enumerate() {
            let bin = i + 1;
            let y = y_to_px(content.min(y_max));
            outline.push((x_to_px(binning.low_edge(bin)), y));
            outline.push((x_to_px(binning.low_edge(bin + 1)), y));
        }
        outline.push((x_to_px(binning.high), y_to_px(0.0)));

        let points = outline
            .iter()
            .map(|(x, y)| format!("{:.2},{:.2}", x, y))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(svg, r#"<polygon points="{}" fill="{}" stroke="none"/>"#, points, escape(&c.fill_color))?;
        writeln!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{}"/>"#,
            points,
            escape(&c.line_color),
            c.line_width
        )?;

        // Frame and ticks
        writeln!(
            svg,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="black" stroke-width="1"/>"#,
            frame.left,
            frame.top,
            frame.width(),
            frame.height()
        )?;
        let tick = 0.015 * frame.height();
        for &x in &x_axis {
            if x < binning.low || x > binning.high {
                continue;
            }
            let px = x_to_px(x);
            writeln!(
                svg,
                r#"<line x1="{px:.2}" y1="{:.2}" x2="{px:.2}" y2="{:.2}" stroke="black"/>"#,
                frame.bottom,
                frame.bottom - tick
            )?;
            writeln!(
                svg,
                r#"<text x="{px:.2}" y="{:.2}" text-anchor="middle">{}</text>"#,
                frame.bottom + c.font_size * 1.3,
                format_tick(x, &x_axis)
            )?;
        }
        for &y in &y_axis {
            let py = y_to_px(y);
            writeln!(
                svg,
                r#"<line x1="{:.2}" y1="{py:.2}" x2="{:.2}" y2="{py:.2}" stroke="black"/>"#,
                frame.left,
                frame.left + tick
            )?;
            writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="end">{}</text>"#,
                frame.left - c.font_size * 0.4,
                py + c.font_size * 0.35,
                format_tick(y, &y_axis)
            )?;
        }

        // Axis titles
        writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="end">{}</text>"#,
            frame.right,
            frame.bottom + c.font_size * 2.6,
            markup(histogram.x_label())
        )?;
        let y_title_x = frame.left - c.font_size * 3.2;
        writeln!(
            svg,
            r#"<text x="{x:.2}" y="{y:.2}" text-anchor="end" transform="rotate(-90 {x:.2} {y:.2})">{}</text>"#,
            markup(histogram.y_label()),
            x = y_title_x,
            y = frame.top
        )?;

        // Title and experiment label
        writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="{}">{}</text>"#,
            f64::from(c.width) / 2.0,
            frame.top * 0.45,
            c.font_size * 1.2,
            markup(histogram.title())
        )?;
        if !c.label.is_empty() {
            writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" font-weight="bold">{}</text>"#,
                frame.left,
                frame.top - c.font_size * 0.4,
                escape(&c.label)
            )?;
        }

        self.write_stat_box(&mut svg, histogram, &frame)?;

        writeln!(svg, "</svg>")?;
        Ok(svg)
    }

    fn write_stat_box(&self, svg: &mut String, histogram: &Histogram, frame: &Frame) -> fmt::Result {
        let options = &self.config.stat_box;
        let mut lines = Vec::new();
        if options.name {
            lines.push(escape(histogram.name()));
        }
        if options.entries {
            lines.push(format!("Entries = {}", histogram.entries()));
        }
        if options.mean {
            lines.push(format!("Mean = {:.4}", histogram.mean()));
        }
        if options.std_dev {
            lines.push(format!("Std Dev = {:.4}", histogram.std_dev()));
        }
        if lines.is_empty() {
            return Ok(());
        }

        let size = self.config.font_size * 0.85;
        let line_height = size * 1.35;
        let width = frame.width() * 0.28;
        let height = line_height * lines.len() as f64 + size * 0.6;
        let x = frame.right - width;
        let y = frame.top;

        writeln!(
            svg,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="white" stroke="black" stroke-width="1"/>"#,
            x, y, width, height
        )?;
        for (i, line) in lines.iter().enumerate() {
            writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" font-size="{}">{}</text>"#,
                x + size * 0.5,
                y + line_height * (i as f64 + 1.0),
                size,
                line
            )?;
        }
        Ok(())
    }
}

impl HistogramRenderer for SvgRenderer {
    fn extension(&self) -> &'static str {
        "svg"
    }

    fn render(&self, histogram: &Histogram, path: &Path) -> Result<()> {
        let svg = self.to_svg(histogram).map_err(|e| DimuonError::OutputWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_atomically(path, |file| {
            file.write_all(svg.as_bytes())?;
            Ok(())
        })?;
        debug!("Rendered {} to {}", histogram.name(), path.display());
        Ok(())
    }
}

/// PNG renderer rasterising the SVG document with resvg
#[derive(Debug, Clone, Default)]
pub struct PngRenderer {
    svg: SvgRenderer,
}

impl PngRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            svg: SvgRenderer::new(config),
        }
    }

    /// Encode the plot of a histogram as PNG bytes
    pub fn to_png(&self, histogram: &Histogram) -> Result<Vec<u8>> {
        let render_error = |reason: String| DimuonError::Render {
            histogram: histogram.name().to_string(),
            reason,
        };
        let svg = self.svg.to_svg(histogram).map_err(|e| render_error(e.to_string()))?;
        svg_to_png(&svg, self.svg.config().dpi).map_err(render_error)
    }
}

impl HistogramRenderer for PngRenderer {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn render(&self, histogram: &Histogram, path: &Path) -> Result<()> {
        let png = self.to_png(histogram)?;
        write_atomically(path, |file| {
            file.write_all(&png)?;
            Ok(())
        })?;
        debug!("Rendered {} to {}", histogram.name(), path.display());
        Ok(())
    }
}

/// Rasterise an SVG document on a white background at `dpi`
fn svg_to_png(svg: &str, dpi: u32) -> std::result::Result<Vec<u8>, String> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| e.to_string())?;

    let scale = dpi as f32 / 72.0;
    let size = tree.size();
    let width = (size.width() * scale).round() as u32;
    let height = (size.height() * scale).round() as u32;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| format!("cannot allocate a {}x{} pixmap", width, height))?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap.encode_png().map_err(|e| e.to_string())
}

/// Evenly spaced "nice" tick values covering `[low, high]`
fn nice_axis(low: f64, high: f64, target_ticks: usize) -> Vec<f64> {
    if !(high > low) {
        return vec![low, low + 1.0];
    }
    let rough = (high - low) / (target_ticks.max(2) - 1) as f64;
    let exp = rough.log10().floor();
    let frac = rough / 10f64.powf(exp);
    let nice = if frac <= 1.5 {
        1.0
    } else if frac <= 3.5 {
        2.0
    } else if frac <= 7.5 {
        5.0
    } else {
        10.0
    };
    let step = nice * 10f64.powf(exp);

    let first = (low / step).floor() * step;
    let last = (high / step).ceil() * step;
    let count = ((last - first) / step).round() as usize;
    (0..=count).map(|i| first + i as f64 * step).collect()
}

fn format_tick(value: f64, ticks: &[f64]) -> String {
    let step = match ticks {
        [a, b, ..] => b - a,
        _ => 1.0,
    };
    if step >= 1.0 {
        format!("{}", value.round() as i64)
    } else {
        let decimals = (-step.log10().floor()) as usize;
        format!("{:.prec$}", value, prec = decimals)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape a ROOT-style label, turning `#mu` into a Greek mu and `_{x}` into a subscript
fn markup(label: &str) -> String {
    let text = escape(&label.replace("#mu", "\u{03bc}"));
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(start) = rest.find("_{") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(r#"<tspan baseline-shift="sub" font-size="75%">"#);
        out.push_str(&rest[start + 2..start + 2 + len]);
        out.push_str("</tspan>");
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    out
}
