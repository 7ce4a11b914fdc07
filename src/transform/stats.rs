//! Per-drive summary statistics and the batch report table

use ordered_float::OrderedFloat;
use prettytable::{Table, row};

/// Integral of `y` over `x` by the trapezoid rule. Points must be sorted by `x`.
pub fn trapezoid(points: &[(f64, f64)]) -> f64 {
    points.windows(2).map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0).sum()
}

/// Distance in km from `(elapsed_sec, speed_mps)` samples.
pub fn distance_km(profile: &[(f64, f64)]) -> f64 {
    trapezoid(profile) / 1000.0
}

/// Span between the earliest and latest sample time.
pub fn duration_sec(profile: &[(f64, f64)]) -> f64 {
    let times = || profile.iter().map(|p| OrderedFloat(p.0));
    match (times().min(), times().max()) {
        (Some(lo), Some(hi)) => (hi - lo).into_inner(),
        _ => 0.0,
    }
}

/// `hh:mm:ss`, rounded to the nearest second.
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveSummary {
    pub vehicle: String,
    pub date: String,
    pub diary_token: String,
    pub drive_token: String,
    pub sequences: usize,
    pub distance_km: f64,
    pub duration_sec: f64,
    /// Segments whose re-probed frame count differed from the request.
    pub segment_mismatches: usize,
}

/// Completed drives of one batch.
#[derive(Debug, Default)]
pub struct SummaryReport {
    rows: Vec<DriveSummary>,
}

impl SummaryReport {
    pub fn push(&mut self, summary: DriveSummary) {
        self.rows.push(summary);
    }

    pub fn rows(&self) -> &[DriveSummary] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row![
            "vehicle",
            "date",
            "diary_token",
            "drive_token",
            "#sequences",
            "distance(KM)",
            "time(hh:mm:ss)"
        ]);
        for s in &self.rows {
            table.add_row(row![
                s.vehicle,
                s.date,
                s.diary_token,
                s.drive_token,
                s.sequences,
                format!("{:.2}", s.distance_km),
                format_hms(s.duration_sec)
            ]);
        }
        table
    }

    pub fn print(&self) {
        self.table().printstd();
    }
}
