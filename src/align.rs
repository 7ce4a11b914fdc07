//! Frame ↔ telemetry alignment
//!
//! Two strategies, one per kind of telemetry source:
//!
//! - [`FixedRateAligner`]: samples carry wall-clock times only. They are
//!   bucketed into the same windows as the frames and each frame picks a
//!   sample by scaling its index inside the window.
//! - [`IndexedAligner`]: rows are keyed by the exact frame number. A frame
//!   either has its row (synchronized) or nothing.

use std::collections::HashMap;

use crate::chunker::FrameWindow;
use crate::records::{LatLon, UNKNOWN_LOCATION};

pub const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Play-time offset of `frame` in microseconds.
pub fn frame_offset_us(frame: u64, fps: f64) -> i64 {
    (frame as f64 * MICROS_PER_SEC / fps) as i64
}

/// Index of the sample a frame maps to inside one window:
/// `floor(frame / (frames_in_chunk / samples_in_chunk))`, clamped to the
/// last sample. `None` when the window has no samples.
pub fn sample_index_for_frame(frame: usize, frames_in_chunk: usize, samples_in_chunk: usize) -> Option<usize> {
    if samples_in_chunk == 0 || frames_in_chunk == 0 {
        return None;
    }
    let ratio = frames_in_chunk as f64 / samples_in_chunk as f64;
    let index = (frame as f64 / ratio).floor() as usize;
    Some(index.min(samples_in_chunk - 1))
}

/// Outcome of aligning one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAlignment {
    /// Index into the window's sample bucket, if one was assigned.
    pub sample: Option<usize>,
    pub location: LatLon,
    pub sync: bool,
}

#[derive(Debug, Clone)]
pub struct FixedRateAligner {
    /// Play-time end of every window, microseconds.
    chunk_end_us: Vec<i64>,
    carried: LatLon,
}

impl FixedRateAligner {
    pub fn new(windows: &[FrameWindow], fps: f64) -> Self {
        let chunk_end_us = windows.iter().map(|w| frame_offset_us(w.end_frame + 1, fps)).collect();
        Self { chunk_end_us, carried: UNKNOWN_LOCATION }
    }

    /// Splits `(elapsed_us, sample)` pairs into one bucket per window.
    ///
    /// The cursor moves forward while a sample lies past the current
    /// window's end, so a gap in the log leaves the skipped windows empty.
    /// Samples past the last window stay in the last bucket.
    pub fn bucket<T>(&self, samples: impl IntoIterator<Item = (i64, T)>) -> Vec<Vec<T>> {
        let mut buckets: Vec<Vec<T>> = self.chunk_end_us.iter().map(|_| Vec::new()).collect();
        if buckets.is_empty() {
            return buckets;
        }
        let last = buckets.len() - 1;
        let mut cursor = 0;
        let mut overflow = 0usize;
        for (elapsed, sample) in samples {
            while cursor < last && elapsed > self.chunk_end_us[cursor] {
                cursor += 1;
            }
            if cursor == last && elapsed > self.chunk_end_us[last] {
                overflow += 1;
            }
            buckets[cursor].push(sample);
        }
        if overflow > 0 {
            tracing::warn!(samples = overflow, "telemetry runs past the end of the video");
        }
        buckets
    }

    /// Assigns a location to every frame of `window` from the window's
    /// sample locations. Windows without samples reuse the last location
    /// assigned, or `[-1, -1]` before any fix was seen.
    pub fn align_window(&mut self, window: &FrameWindow, locations: &[LatLon]) -> Vec<FrameAlignment> {
        let frames = window.frame_count() as usize;
        let mut out = Vec::with_capacity(frames);
        for f in 0..frames {
            let sample = sample_index_for_frame(f, frames, locations.len());
            let location = match sample {
                Some(i) => locations[i],
                None => self.carried,
            };
            self.carried = location;
            out.push(FrameAlignment { sample, location, sync: sample.is_some() });
        }
        out
    }
}

/// Rows keyed by the frame they were logged for.
#[derive(Debug, Clone)]
pub struct IndexedAligner<T> {
    rows: HashMap<u64, T>,
}

impl<T> IndexedAligner<T> {
    pub fn new(rows: impl IntoIterator<Item = (u64, T)>) -> Self {
        Self { rows: rows.into_iter().collect() }
    }

    /// The frame's row and whether the frame is synchronized.
    pub fn lookup(&self, frame: u64) -> (Option<&T>, bool) {
        match self.rows.get(&frame) {
            Some(row) => (Some(row), true),
            None => (None, false),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::fixed_windows;

    #[test]
    fn nearest_index_scales_by_ratio() {
        assert_eq!(sample_index_for_frame(15, 30, 10), Some(5));
        assert_eq!(sample_index_for_frame(0, 30, 10), Some(0));
        assert_eq!(sample_index_for_frame(29, 30, 10), Some(9));
        assert_eq!(sample_index_for_frame(3, 30, 0), None);
    }

    #[test]
    fn index_is_clamped_to_last_sample() {
        assert_eq!(sample_index_for_frame(40, 30, 10), Some(9));
    }

    #[test]
    fn samples_land_in_the_window_covering_them() {
        let windows = fixed_windows(180, 30.0, 2.0).unwrap();
        let aligner = FixedRateAligner::new(&windows, 30.0);
        let samples = [0, 1_000_000, 2_000_000, 2_500_000, 5_000_000, 9_000_000].map(|t| (t, t));
        let buckets = aligner.bucket(samples);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0], vec![0, 1_000_000, 2_000_000]);
        assert_eq!(buckets[1], vec![2_500_000]);
        assert_eq!(buckets[2], vec![5_000_000, 9_000_000]);
    }

    #[test]
    fn empty_window_keeps_location_from_previous_window() {
        let windows = fixed_windows(180, 30.0, 2.0).unwrap();
        let mut aligner = FixedRateAligner::new(&windows, 30.0);
        let buckets = aligner.bucket([(0, [1.0, 1.0]), (1_000_000, [2.0, 2.0]), (4_500_000, [3.0, 3.0])]);
        assert!(buckets[1].is_empty());

        let first = aligner.align_window(&windows[0], &buckets[0]);
        assert_eq!(first[0].location, [1.0, 1.0]);
        assert_eq!(first[59].location, [2.0, 2.0]);

        let second = aligner.align_window(&windows[1], &buckets[1]);
        assert_eq!(second.len(), 60);
        assert!(second.iter().all(|a| a.location == [2.0, 2.0] && !a.sync && a.sample.is_none()));

        let third = aligner.align_window(&windows[2], &buckets[2]);
        assert!(third.iter().all(|a| a.location == [3.0, 3.0] && a.sync));
    }

    #[test]
    fn no_fix_yet_gives_unknown_location() {
        let windows = fixed_windows(10, 10.0, 1.0).unwrap();
        let mut aligner = FixedRateAligner::new(&windows, 10.0);
        let out = aligner.align_window(&windows[0], &[]);
        assert!(out.iter().all(|a| a.location == UNKNOWN_LOCATION));
    }

    #[test]
    fn indexed_lookup_marks_sync() {
        let aligner = IndexedAligner::new([(0u64, "a"), (7, "b")]);
        assert_eq!(aligner.lookup(7), (Some(&"b"), true));
        assert_eq!(aligner.len(), 2);
        assert_eq!(aligner.lookup(3), (None, false));
    }

    #[test]
    fn frame_offsets_are_microseconds() {
        assert_eq!(frame_offset_us(30, 30.0), 1_000_000);
        assert_eq!(frame_offset_us(100, 30.0), 3_333_333);
    }
}
