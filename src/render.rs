//! PNG and HTML renderings of the sales charts.

use std::error::Error;
use std::sync::OnceLock;

use chrono::{Days, NaiveDate};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use plotly::common::{Mode, Title};
use plotly::{Layout, Plot, Scatter};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::charts::{
    self, chart_error, BoxStats, Chart, CorrelationMatrix, EmployeeSeries, LabelledValue,
    CORRELATION_COLUMNS, HISTOGRAM_BINS,
};
use crate::error::SalesError;
use crate::models::{columns, SalesTable};

const FONT_FAMILY: &str = "sans-serif";
const FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
const FACET_COLUMNS: usize = 4;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type DrawResult = Result<(), Box<dyn Error>>;

fn ensure_font() -> Result<(), SalesError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT)
                .map_err(|_| "embedded font rejected".to_string())
        })
        .clone()
        .map_err(SalesError::Chart)
}

pub fn render_png(chart: Chart, table: &SalesTable) -> Result<Vec<u8>, SalesError> {
    let title = chart.title();
    match chart {
        Chart::LinePlot | Chart::InteractivePlot => {
            let series = plotted_series(table)?;
            draw_png((1400, 700), |area| line_plot(area, title, &series))
        }
        Chart::Histogram => {
            let hist = charts::histogram(table, columns::REVENUE_CONFIRMED, HISTOGRAM_BINS)?;
            draw_png((1000, 600), |area| histogram(area, title, &hist))
        }
        Chart::Heatmap => {
            let matrix = charts::correlation(table, &CORRELATION_COLUMNS)?;
            draw_png((1200, 1000), |area| correlation_heatmap(area, title, &matrix))
        }
        Chart::BoxPlot => {
            let stats = charts::revenue_by_employee(table)?;
            if stats.is_empty() {
                return Err(SalesError::NoValidRecords(
                    "no confirmed revenue to plot".to_string(),
                ));
            }
            draw_png((1200, 700), |area| box_plot(area, title, &stats))
        }
        Chart::BarPlot => {
            let days = charts::tours_by_weekday(table)?;
            if days.is_empty() {
                return Err(SalesError::NoValidRecords("no dated tours to plot".to_string()));
            }
            draw_png((1000, 600), |area| bar_plot(area, title, &days))
        }
        Chart::CallsHeatmap => {
            let calls = charts::calls_by_weekday(table)?;
            draw_png((1000, 600), |area| calls_heatmap(area, title, &calls))
        }
        Chart::FacetGrid => {
            let series = plotted_series(table)?;
            let rows = series.len().div_ceil(FACET_COLUMNS) as u32;
            draw_png((1400, 60 + 320 * rows), |area| facet_grid(area, title, &series))
        }
    }
}

/// Self-contained plotly page with one line per employee.
pub fn interactive_html(table: &SalesTable) -> Result<String, SalesError> {
    let series = plotted_series(table)?;
    let mut plot = Plot::new();
    for employee in &series {
        let dates: Vec<String> = employee.points.iter().map(|p| p.dated.to_string()).collect();
        let values: Vec<f64> = employee.points.iter().map(|p| p.value).collect();
        plot.add_trace(
            Scatter::new(dates, values)
                .mode(Mode::Lines)
                .name(&employee.employee_name),
        );
    }
    plot.set_layout(Layout::new().title(Title::new(Chart::InteractivePlot.title())));
    Ok(plot.to_html())
}

fn plotted_series(table: &SalesTable) -> Result<Vec<EmployeeSeries>, SalesError> {
    let series = charts::revenue_over_time(table)?;
    if series.is_empty() {
        return Err(SalesError::NoValidRecords(
            "no dated revenue to plot".to_string(),
        ));
    }
    Ok(series)
}

fn draw_png<F>(size: (u32, u32), draw: F) -> Result<Vec<u8>, SalesError>
where
    F: FnOnce(&Area<'_>) -> DrawResult,
{
    ensure_font()?;
    let (width, height) = size;
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, size).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;
        draw(&root).map_err(chart_error)?;
        root.present().map_err(chart_error)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&buffer, width, height, ExtendedColorType::Rgb8)
        .map_err(chart_error)?;
    Ok(png)
}

struct Bounds {
    start: NaiveDate,
    days: f64,
    low: f64,
    high: f64,
}

impl Bounds {
    fn of(series: &[EmployeeSeries]) -> Self {
        let points = || series.iter().flat_map(|s| s.points.iter());
        let start = points().map(|p| p.dated).min().unwrap_or_default();
        let end = points().map(|p| p.dated).max().unwrap_or(start);
        let (low, high) = padded(points().map(|p| p.value));
        Self {
            start,
            days: ((end - start).num_days() as f64).max(1.0),
            low,
            high,
        }
    }

    fn x(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64
    }

    fn label(&self, x: f64) -> String {
        self.start
            .checked_add_days(Days::new(x.round().max(0.0) as u64))
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// Value range with 5% headroom on both sides.
fn padded(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !low.is_finite() || !high.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if high > low { (high - low) * 0.05 } else { 1.0 };
    (low - pad, high + pad)
}

fn line_plot(area: &Area<'_>, title: &str, series: &[EmployeeSeries]) -> DrawResult {
    let bounds = Bounds::of(series);
    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..bounds.days, bounds.low..bounds.high)?;

    let date_label = |x: &f64| bounds.label(*x);
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Revenue Confirmed")
        .x_label_formatter(&date_label)
        .draw()?;

    for (idx, employee) in series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(
                employee.points.iter().map(|p| (bounds.x(p.dated), p.value)),
                color.stroke_width(2),
            ))?
            .label(employee.employee_name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    Ok(())
}

fn facet_grid(area: &Area<'_>, title: &str, series: &[EmployeeSeries]) -> DrawResult {
    let bounds = Bounds::of(series);
    let body = area.titled(title, (FONT_FAMILY, 28))?;
    let rows = series.len().div_ceil(FACET_COLUMNS);
    let panels = body.split_evenly((rows, FACET_COLUMNS));

    let date_label = |x: &f64| bounds.label(*x);
    for (panel, employee) in panels.iter().zip(series) {
        let mut chart = ChartBuilder::on(panel)
            .caption(&employee.employee_name, (FONT_FAMILY, 18))
            .margin(10)
            .x_label_area_size(35)
            .y_label_area_size(60)
            .build_cartesian_2d(0f64..bounds.days, bounds.low..bounds.high)?;
        chart
            .configure_mesh()
            .x_labels(3)
            .y_labels(5)
            .x_desc("Date")
            .y_desc("Revenue Confirmed")
            .x_label_formatter(&date_label)
            .draw()?;
        chart.draw_series(LineSeries::new(
            employee.points.iter().map(|p| (bounds.x(p.dated), p.value)),
            BLUE.stroke_width(2),
        ))?;
    }
    Ok(())
}

fn histogram(area: &Area<'_>, title: &str, hist: &charts::Histogram) -> DrawResult {
    let start = hist.bins.first().map(|b| b.start).unwrap_or(0.0);
    let end = hist.bins.last().map(|b| b.end).unwrap_or(1.0);
    let tallest = hist.bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;

    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(start..end, 0f64..tallest + 1.0)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Revenue Confirmed")
        .y_desc("Frequency")
        .draw()?;

    let bars = || {
        hist.bins
            .iter()
            .map(|b| [(b.start, 0.0), (b.end, b.count as f64)])
    };
    chart.draw_series(bars().map(|corners| Rectangle::new(corners, BLUE.mix(0.7).filled())))?;
    chart.draw_series(bars().map(|corners| Rectangle::new(corners, BLACK.stroke_width(1))))?;
    Ok(())
}

/// Segment range for `n` categories. A single category still gets two
/// segments so the axis never collapses.
fn segments(n: i32) -> std::ops::Range<i32> {
    0..n.max(2) - 1
}

fn index_label(names: &[String], value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(idx) => names.get(*idx as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

fn centered(size: u32) -> TextStyle<'static> {
    TextStyle::from((FONT_FAMILY, size).into_font()).pos(Pos::new(HPos::Center, VPos::Center))
}

/// Blue through grey to red over [-1, 1].
fn diverging(value: f64) -> RGBColor {
    let (cold, mid, hot) = ((59.0, 76.0, 192.0), (221.0, 221.0, 221.0), (180.0, 4.0, 38.0));
    let t = value.clamp(-1.0, 1.0);
    let (from, to, f) = if t < 0.0 { (cold, mid, t + 1.0) } else { (mid, hot, t) };
    let mix = |a: f64, b: f64| (a + (b - a) * f).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

/// Pale yellow to dark blue over [0, 1].
fn sequential(fraction: f64) -> RGBColor {
    let f = fraction.clamp(0.0, 1.0);
    let mix = |a: f64, b: f64| (a + (b - a) * f).round() as u8;
    RGBColor(mix(255.0, 8.0), mix(255.0, 29.0), mix(217.0, 88.0))
}

fn correlation_heatmap(area: &Area<'_>, title: &str, matrix: &CorrelationMatrix) -> DrawResult {
    let n = matrix.columns.len() as i32;
    let reversed: Vec<String> = matrix.columns.iter().rev().cloned().collect();
    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(140)
        .build_cartesian_2d(segments(n).into_segmented(), segments(n).into_segmented())?;

    let x_label = |v: &SegmentValue<i32>| index_label(&matrix.columns, v);
    let y_label = |v: &SegmentValue<i32>| index_label(&reversed, v);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n as usize)
        .y_labels(n as usize)
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .draw()?;

    let cells = || {
        (0..n).flat_map(move |row| (0..n).map(move |col| (row, col))).map(|(row, col)| {
            let value = matrix.values[row as usize][col as usize];
            (col, n - 1 - row, value)
        })
    };
    chart.draw_series(cells().map(|(x, y, value)| {
        let color = value.map(diverging).unwrap_or(RGBColor(240, 240, 240));
        Rectangle::new(
            [
                (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
            ],
            color.filled(),
        )
    }))?;
    chart.draw_series(cells().map(|(x, y, value)| {
        let text = value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "n/a".to_string());
        Text::new(
            text,
            (SegmentValue::CenterOf(x), SegmentValue::CenterOf(y)),
            centered(16),
        )
    }))?;
    Ok(())
}

fn calls_heatmap(area: &Area<'_>, title: &str, calls: &[LabelledValue]) -> DrawResult {
    let n = calls.len() as i32;
    let labels: Vec<String> = calls.iter().map(|c| c.label.clone()).collect();
    let highest = calls.iter().map(|c| c.value).fold(0.0, f64::max);

    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(segments(n).into_segmented(), 0f64..1f64)?;

    let x_label = |v: &SegmentValue<i32>| index_label(&labels, v);
    let y_label = |_: &f64| String::new();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n as usize)
        .y_labels(1)
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .y_desc("Calls")
        .draw()?;

    chart.draw_series(calls.iter().zip(0..).map(|(call, x)| {
        let fraction = if highest > 0.0 { call.value / highest } else { 0.0 };
        Rectangle::new(
            [
                (SegmentValue::Exact(x), 0.0),
                (SegmentValue::Exact(x + 1), 1.0),
            ],
            sequential(fraction).filled(),
        )
    }))?;
    chart.draw_series(calls.iter().zip(0..).map(|(call, x)| {
        Text::new(
            format!("{:.0}", call.value),
            (SegmentValue::CenterOf(x), 0.5),
            centered(18),
        )
    }))?;
    Ok(())
}

fn bar_plot(area: &Area<'_>, title: &str, days: &[LabelledValue]) -> DrawResult {
    let n = days.len() as i32;
    let labels: Vec<String> = days.iter().map(|d| d.label.clone()).collect();
    let highest = days.iter().map(|d| d.value).fold(0.0, f64::max);

    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(segments(n).into_segmented(), 0f64..highest * 1.1 + 1.0)?;

    let x_label = |v: &SegmentValue<i32>| index_label(&labels, v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n as usize)
        .x_label_formatter(&x_label)
        .x_desc("Day of the Week")
        .y_desc("Average Tours Booked")
        .draw()?;

    chart.draw_series(days.iter().zip(0..).map(|(day, x)| {
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(x), 0.0), (SegmentValue::Exact(x + 1), day.value)],
            RGBColor(135, 206, 235).filled(),
        );
        bar.set_margin(0, 0, 10, 10);
        bar
    }))?;
    Ok(())
}

fn box_plot(area: &Area<'_>, title: &str, stats: &[BoxStats]) -> DrawResult {
    let n = stats.len() as i32;
    let labels: Vec<String> = stats.iter().map(|s| s.employee_name.clone()).collect();
    let (low, high) = padded(stats.iter().flat_map(|s| [s.min, s.max]));

    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(segments(n).into_segmented(), low..high)?;

    let x_label = |v: &SegmentValue<i32>| index_label(&labels, v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n as usize)
        .x_label_formatter(&x_label)
        .x_desc("Employee Name")
        .y_desc("Revenue Confirmed")
        .draw()?;

    chart.draw_series(stats.iter().zip(0..).map(|(s, x)| {
        let mut body = Rectangle::new(
            [(SegmentValue::Exact(x), s.q1), (SegmentValue::Exact(x + 1), s.q3)],
            RGBColor(100, 149, 237).filled(),
        );
        body.set_margin(0, 0, 15, 15);
        body
    }))?;
    chart.draw_series(stats.iter().zip(0..).flat_map(|(s, x)| {
        [
            vec![(SegmentValue::CenterOf(x), s.min), (SegmentValue::CenterOf(x), s.q1)],
            vec![(SegmentValue::CenterOf(x), s.q3), (SegmentValue::CenterOf(x), s.max)],
            vec![(SegmentValue::Exact(x), s.median), (SegmentValue::Exact(x + 1), s.median)],
        ]
        .into_iter()
        .map(|path| PathElement::new(path, BLACK.stroke_width(2)))
    }))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::tests::{weekly_table, with_calls};

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn every_chart_renders_a_png() {
        let table = with_calls(weekly_table());
        for chart in Chart::ALL {
            let png = render_png(chart, &table)
                .unwrap_or_else(|e| panic!("{} failed: {e}", chart.name()));
            assert!(png.starts_with(&PNG_MAGIC), "{} is not a PNG", chart.name());
        }
    }

    #[test]
    fn missing_call_columns_fail_before_drawing() {
        assert!(matches!(
            render_png(Chart::CallsHeatmap, &weekly_table()),
            Err(SalesError::MissingField(_))
        ));
    }

    #[test]
    fn interactive_page_names_every_employee() {
        let html = interactive_html(&weekly_table()).unwrap();
        assert!(html.contains("Avery Lee"));
        assert!(html.contains("Jules Moreno"));
        assert!(html.contains("Revenue Confirmed Over Time for Each Employee"));
    }

    #[test]
    fn palette_endpoints() {
        assert_eq!(diverging(-1.0), RGBColor(59, 76, 192));
        assert_eq!(diverging(1.0), RGBColor(180, 4, 38));
        assert_eq!(sequential(0.0), RGBColor(255, 255, 217));
    }

    #[test]
    fn single_employee_box_plot_renders() {
        let mut table = weekly_table();
        table.records.retain(|r| r.employee_name().unwrap() == "Avery Lee");
        let png = render_png(Chart::BoxPlot, &table).unwrap();
        assert!(png.starts_with(&PNG_MAGIC));
        assert_eq!(segments(1), 0..1);
        assert_eq!(segments(7), 0..6);
    }

    #[test]
    fn headroom_handles_flat_and_empty_ranges() {
        assert_eq!(padded([5.0, 5.0].into_iter()), (4.0, 6.0));
        assert_eq!(padded(std::iter::empty()), (0.0, 1.0));
        assert_eq!(padded([0.0, 100.0].into_iter()), (-5.0, 105.0));
    }
}
