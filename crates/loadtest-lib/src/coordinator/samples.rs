//! Active-user sample series for equilibrium detection
//!
//! Keeps an append-only sequence of (time, active users) points and
//! computes the least-squares best-fit slope over a sliding window.
//! A near-zero slope over the window means increments and decrements
//! are cancelling out and the test has found its equilibrium.

use std::time::Duration;

use tokio::time::Instant;

/// One observation of the cluster's active-user count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub t: Instant,
    pub y: usize,
}

/// Append-only point buffer bounded by a time window
///
/// Points must be pushed in non-decreasing time order.
#[derive(Debug)]
pub struct SampleSeries {
    points: Vec<Point>,
    window: Duration,
}

impl SampleSeries {
    pub fn new(window: Duration) -> Self {
        Self {
            points: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, t: Instant, y: usize) {
        self.points.push(Point { t, y });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points that fall within `[now - window, now]`
    pub fn latest(&self, now: Instant) -> &[Point] {
        &self.points[self.window_start(now)..]
    }

    /// Drop points older than the window once they make up at least
    /// half of the buffer.
    pub fn compact(&mut self, now: Instant) {
        let start = self.window_start(now);
        let latest_len = self.points.len() - start;
        if self.points.len() >= 2 * latest_len {
            self.points.drain(..start);
        }
    }

    fn window_start(&self, now: Instant) -> usize {
        self.points
            .partition_point(|p| now.duration_since(p.t) > self.window)
    }
}

/// Least-squares best-fit slope of `y` against time in seconds
///
/// Fewer than two points yield a slope of zero.
pub fn slope(points: &[Point]) -> f64 {
    let n = points.len() as f64;
    if points.len() < 2 {
        return 0.0;
    }

    // Time origin at the first point to keep x values small.
    let t0 = points[0].t;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for p in points {
        let x = p.t.duration_since(t0).as_secs_f64();
        let y = p.y as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Mean of the y values; zero for an empty slice
pub fn mean_y(points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.y as f64).sum::<f64>() / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_from(values: &[usize], step: Duration, window: Duration) -> (SampleSeries, Instant) {
        let start = Instant::now();
        let mut series = SampleSeries::new(window);
        let mut t = start;
        for &y in values {
            series.push(t, y);
            t += step;
        }
        (series, t - step)
    }

    #[test]
    fn slope_of_flat_series_is_zero() {
        let (series, now) = series_from(
            &[40; 20],
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        assert_eq!(slope(series.latest(now)), 0.0);
    }

    #[test]
    fn slope_of_rising_series_matches_rate() {
        // One extra user per second.
        let values: Vec<usize> = (0..30).collect();
        let (series, now) = series_from(&values, Duration::from_secs(1), Duration::from_secs(60));
        let s = slope(series.latest(now));
        assert!((s - 1.0).abs() < 1e-9, "slope was {s}");
    }

    #[test]
    fn slope_of_short_series_is_zero() {
        assert_eq!(slope(&[]), 0.0);
        assert_eq!(
            slope(&[Point {
                t: Instant::now(),
                y: 10
            }]),
            0.0
        );
    }

    #[test]
    fn oscillation_around_mean_has_near_zero_slope() {
        let values: Vec<usize> = (0..40).map(|i| if i % 2 == 0 { 38 } else { 42 }).collect();
        let (series, now) = series_from(&values, Duration::from_secs(1), Duration::from_secs(60));
        let latest = series.latest(now);
        assert!(slope(latest).abs() < 0.1);
        assert!((mean_y(latest) - 40.0).abs() < 1.0);
    }

    #[test]
    fn latest_excludes_points_outside_window() {
        let (series, now) = series_from(
            &[1, 2, 3, 4, 5, 6],
            Duration::from_secs(10),
            Duration::from_secs(25),
        );
        // Window of 25s at 10s spacing keeps the last three points.
        let latest = series.latest(now);
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].y, 4);
    }

    #[test]
    fn compact_drops_old_points_when_they_dominate() {
        let (mut series, now) = series_from(
            &[1, 2, 3, 4, 5, 6],
            Duration::from_secs(10),
            Duration::from_secs(25),
        );
        assert_eq!(series.len(), 6);
        series.compact(now);
        assert_eq!(series.len(), 3);
        assert_eq!(series.latest(now).len(), 3);
    }

    #[test]
    fn compact_keeps_buffer_while_window_majority() {
        let (mut series, now) = series_from(
            &[1, 2, 3, 4],
            Duration::from_secs(10),
            Duration::from_secs(100),
        );
        // All four points are inside the window; nothing to drop.
        series.compact(now);
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn mean_of_empty_slice_is_zero() {
        assert_eq!(mean_y(&[]), 0.0);
    }
}
