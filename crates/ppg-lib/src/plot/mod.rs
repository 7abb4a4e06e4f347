use crate::signal::{PeakRecord, TimeSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

/// 0xRRGGBB
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Data extent as `(x_min, x_max, y_min, y_max)`, `None` without points.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// HRV tachogram: in-range intervals (ms) against seconds since the first peak.
///
/// Peaks with unparseable timestamps are left out.
pub fn figure_from_peaks(records: &[PeakRecord], ticks_per_ms: f64, max_points: usize) -> Figure {
    let ticks_per_s = ticks_per_ms * 1000.0;
    let origin = records
        .iter()
        .find_map(|r| r.timestamp.parse::<f64>().ok())
        .unwrap_or(0.0);
    let points: Vec<[f64; 2]> = records
        .iter()
        .filter(|r| r.valid)
        .filter_map(|r| {
            let t = r.timestamp.parse::<f64>().ok()?;
            Some([(t - origin) / ticks_per_s, r.hrv_ms(ticks_per_ms)])
        })
        .collect();
    let mut fig = Figure::new(Some("HRV tachogram".into())).with_labels("time (s)", "HRV (ms)");
    fig.add_series(Series::Line(LineSeries {
        name: "HRV".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 2.0,
            color: Color(0xFF0077),
        },
    }));
    fig
}

pub fn figure_from_timeseries(
    title: &str,
    series: &TimeSeries,
    max_points: usize,
    color: u32,
) -> Figure {
    let dt = 1.0 / series.fs.max(1.0);
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    let decimated = decimate_points(&points, max_points);
    let mut fig = Figure::new(Some(title.into())).with_labels("time (s)", "amplitude");
    fig.add_series(Series::Line(LineSeries {
        name: title.into(),
        points: decimated,
        style: Style {
            width: 1.4,
            color: Color(color),
        },
    }));
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(ts: u64, hrv: f64, valid: bool) -> PeakRecord {
        PeakRecord {
            stream_index: 0,
            block_index: 0,
            timestamp: ts.to_string(),
            hrv,
            valid,
        }
    }

    #[test]
    fn tachogram_keeps_valid_intervals_only() {
        let records = vec![
            peak(1_000_000, 0.0, false),
            peak(2_000_000, 1_000_000.0, true),
            peak(2_950_000, 950_000.0, true),
            peak(5_000_000, 2_050_000.0, false),
        ];
        let fig = figure_from_peaks(&records, 1000.0, 1024);
        let points = fig.series[0].points();
        assert_eq!(points, &[[1.0, 1000.0], [1.95, 950.0]]);
        assert_eq!(fig.bounds(), Some((1.0, 1.95, 950.0, 1000.0)));
        assert_eq!(fig.y.label.as_deref(), Some("HRV (ms)"));
    }

    #[test]
    fn empty_figure_has_no_bounds() {
        let fig = figure_from_peaks(&[], 1000.0, 1024);
        assert!(fig.bounds().is_none());
    }

    #[test]
    fn decimation_caps_point_count() {
        let series = TimeSeries {
            fs: 50.0,
            data: (0..5000).map(|i| i as f64).collect(),
        };
        let fig = figure_from_timeseries("denoised", &series, 500, 0x0077FF);
        let points = fig.series[0].points();
        assert_eq!(points.len(), 500);
        assert!((points[1][0] - 0.2).abs() < 1e-12);
        assert_eq!(points[1][1], 10.0);
        let json = serde_json::to_string(&fig).unwrap();
        assert!(json.contains("\"denoised\""));
    }

    #[test]
    fn color_channels() {
        assert_eq!(Color(0xFF0077).rgb(), (0xFF, 0x00, 0x77));
    }
}
