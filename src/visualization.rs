//! Balance chart for a planned month.
//!
//! Draws the end-of-day balance of every ledger row as an SVG line, with
//! the minimum floor and the target as dashed guides and work days marked.

use crate::config::OptimizationConfig;
use crate::error::Result;
use crate::schedule::{DaySchedule, OptimizationResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;
#[cfg(feature = "png")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "png")]
use resvg::usvg::{self, TreeParsing};

/// SVG chart generator
pub struct BalanceChart {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
    pub marker_radius: f64,
}

impl Default for BalanceChart {
    fn default() -> Self {
        BalanceChart {
            width: 900.0,
            height: 420.0,
            margin: 60.0,
            marker_radius: 4.0,
        }
    }
}

impl BalanceChart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value range covered by the y axis, padded by 5%
    fn value_range(schedule: &[DaySchedule], config: &OptimizationConfig) -> (f64, f64) {
        let mut lo = config.minimum_balance.min(config.target_ending_balance);
        let mut hi = config.minimum_balance.max(config.target_ending_balance);
        for row in schedule {
            lo = lo.min(row.end_balance).min(row.start_balance);
            hi = hi.max(row.end_balance).max(row.start_balance);
        }
        let pad = ((hi - lo) * 0.05).max(1.0);
        (lo - pad, hi + pad)
    }

    pub fn generate_svg(&self, result: &OptimizationResult, config: &OptimizationConfig) -> String {
        let schedule = &result.schedule;
        let mut svg = String::new();

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .line {{ stroke: #3498db; stroke-width: 2; fill: none; }}
    .minimum {{ stroke: #e74c3c; stroke-width: 1; stroke-dasharray: 5,5; }}
    .target {{ stroke: #27ae60; stroke-width: 1; stroke-dasharray: 5,5; }}
    .axis {{ stroke: #2c3e50; stroke-width: 1; }}
    .label {{ font-family: Arial; font-size: 11px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        svg.push_str(&format!(
            r#"<text x="{}" y="25" class="title">Balance ({} mode) | Final: {:.2} | Work days: {} | Violations: {}</text>
"#,
            self.margin,
            result.mode,
            result.final_balance,
            result.work_days.len(),
            result.violations
        ));

        let (lo, hi) = Self::value_range(schedule, config);
        let plot_width = self.width - 2.0 * self.margin;
        let plot_height = self.height - 2.0 * self.margin;
        let x_step = plot_width / schedule.len().saturating_sub(1).max(1) as f64;
        let y_of = |value: f64| self.height - self.margin - (value - lo) / (hi - lo) * plot_height;
        let x_of = |i: usize| self.margin + i as f64 * x_step;

        svg.push_str(&format!(
            r##"<line x1="{m}" y1="{b}" x2="{r}" y2="{b}" class="axis"/>
<line x1="{m}" y1="{m}" x2="{m}" y2="{b}" class="axis"/>
"##,
            m = self.margin,
            b = self.height - self.margin,
            r = self.width - self.margin
        ));

        for (class, name, value) in [
            ("minimum", "Minimum", config.minimum_balance),
            ("target", "Target", config.target_ending_balance),
        ] {
            let y = y_of(value);
            svg.push_str(&format!(
                r##"<line x1="{}" y1="{:.2}" x2="{}" y2="{:.2}" class="{}"/>
<text x="{}" y="{:.2}" class="label">{} {:.0}</text>
"##,
                self.margin,
                y,
                self.width - self.margin,
                y,
                class,
                self.width - self.margin + 4.0,
                y + 4.0,
                name,
                value
            ));
        }

        let mut path = String::new();
        for (i, row) in schedule.iter().enumerate() {
            let command = if i == 0 { "M" } else { " L" };
            path.push_str(&format!("{} {:.2} {:.2}", command, x_of(i), y_of(row.end_balance)));
        }
        svg.push_str(&format!(
            r##"<path d="{}" class="line"/>
"##,
            path
        ));

        for (i, row) in schedule.iter().enumerate() {
            let color = if row.end_balance < config.minimum_balance {
                "#e74c3c"
            } else if row.is_work_day() {
                "#f39c12"
            } else {
                "#3498db"
            };
            svg.push_str(&format!(
                r##"<circle cx="{:.2}" cy="{:.2}" r="{}" fill="{}"/>
"##,
                x_of(i),
                y_of(row.end_balance),
                self.marker_radius,
                color
            ));
            if row.day == 1 || row.day % 5 == 0 {
                svg.push_str(&format!(
                    r#"<text x="{:.2}" y="{}" class="label">{}</text>
"#,
                    x_of(i) - 4.0,
                    self.height - self.margin + 16.0,
                    row.day
                ));
            }
        }

        svg.push_str("</svg>");
        svg
    }

    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Rasterise with resvg when built with the `png` feature, otherwise
    /// try `rsvg-convert`, `magick` and `inkscape` in turn.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> Result<()> {
        #[cfg(feature = "png")]
        return render_png(svg, path.as_ref());
        #[cfg(not(feature = "png"))]
        return self.convert_externally(svg, path.as_ref());
    }

    #[cfg_attr(feature = "png", allow(dead_code))]
    fn convert_externally(&self, svg: &str, path: &Path) -> Result<()> {
        let tmp_svg = path.with_extension("svg.tmp");
        self.save_svg(svg, &tmp_svg)?;
        let src = tmp_svg.to_string_lossy().to_string();
        let dst = path.to_string_lossy().to_string();

        let attempts: [(&str, Vec<&str>); 3] = [
            ("rsvg-convert", vec!["-o", dst.as_str(), src.as_str()]),
            ("magick", vec!["convert", src.as_str(), dst.as_str()]),
            (
                "inkscape",
                vec![src.as_str(), "--export-type=png", "--export-filename", dst.as_str()],
            ),
        ];
        for (program, args) in &attempts {
            if let Ok(status) = Command::new(program).args(args).status() {
                if status.success() {
                    let _ = std::fs::remove_file(&tmp_svg);
                    return Ok(());
                }
            }
            log::debug!("{} could not convert {}", program, src);
        }

        let _ = std::fs::remove_file(&tmp_svg);
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "No SVG->PNG converter succeeded (tried rsvg-convert, magick, inkscape)",
        )
        .into())
    }
}

#[cfg(feature = "png")]
fn render_png(svg: &str, path: &Path) -> Result<()> {
    let other = |msg: String| std::io::Error::new(std::io::ErrorKind::Other, msg);
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default())
        .map_err(|e| other(format!("usvg parse error: {}", e)))?;
    let size = tree.size.to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height())
        .ok_or_else(|| other("failed to create pixmap".to_string()))?;
    resvg::Tree::from_usvg(&tree).render(Transform::default(), &mut pixmap.as_mut());
    pixmap
        .save_png(path)
        .map_err(|e| other(format!("save_png failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Expense, ProblemInput};
    use crate::optimizer::EvolutionEngine;

    #[test]
    fn test_chart_marks_every_day() {
        let mut config = OptimizationConfig::new(200.0, 900.0, 50.0);
        config.population_size = 20;
        config.generations = 15;
        let mut input = ProblemInput::new(config.clone());
        input.expenses.push(Expense::new(8, 180.0, "car"));
        let result = EvolutionEngine::new(&input).unwrap().run_silent().unwrap();

        let svg = BalanceChart::new().generate_svg(&result, &config);
        assert!(svg.starts_with("<?xml"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<circle").count(), 30);
        assert!(svg.contains("Target 900"));
        assert!(svg.contains("Minimum 50"));
    }

    #[test]
    fn test_value_range_covers_guides() {
        let config = OptimizationConfig::new(0.0, 1000.0, -50.0);
        let (lo, hi) = BalanceChart::value_range(&[], &config);
        assert!(lo < -50.0);
        assert!(hi > 1000.0);
    }
}
