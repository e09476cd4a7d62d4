/// Streaming mean/variance (Welford) plus extrema and sum.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
    sum: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }

        self.n = self.n.saturating_add(1);
        let n_f = self.n as f64;

        let delta = x - self.mean;
        self.mean += delta / n_f;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
        self.sum += x;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Sample standard deviation; 0 for fewer than two samples.
    pub fn stdev(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.m2 / (self.n as f64 - 1.0)).sqrt()
    }
}

/// Percentile over ascending `sorted` samples using linear interpolation between the two
/// closest ranks: `rank = p / 100 * (n - 1)`.
///
/// `p` is clamped to `0..=100`. An empty slice yields `0.0`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    let lo = sorted[lower.min(last)];
    let hi = sorted[upper.min(last)];
    lo + (rank - lower as f64) * (hi - lo)
}

#[inline]
pub fn per_sec(total: u64, secs: f64) -> f64 {
    if secs <= 0.0 {
        return 0.0;
    }
    total as f64 / secs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_is_pinned_for_small_sets() {
        let five = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(approx(percentile(&five, 95.0), 4.8));

        let ten: Vec<f64> = (1..=10).map(f64::from).collect();
        assert!(approx(percentile(&ten, 90.0), 9.1));
        assert!(approx(percentile(&ten, 50.0), 5.5));
        assert!(approx(percentile(&ten, 0.0), 1.0));
        assert!(approx(percentile(&ten, 100.0), 10.0));
    }

    #[test]
    fn percentile_of_empty_or_single_sample() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[7.0], 99.9), 7.0);
    }

    #[test]
    fn running_stats_tracks_mean_stdev_and_extrema() {
        let mut s = RunningStats::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(x);
        }
        assert_eq!(s.count(), 8);
        assert!(approx(s.mean(), 5.0));
        assert!(approx(s.sum(), 40.0));
        assert_eq!(s.min(), 2.0);
        assert_eq!(s.max(), 9.0);
        assert!(approx(s.stdev(), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn running_stats_handles_negative_first_sample() {
        let mut s = RunningStats::default();
        s.push(-3.0);
        s.push(-1.0);
        assert_eq!(s.min(), -3.0);
        assert_eq!(s.max(), -1.0);
    }

    #[test]
    fn per_sec_guards_zero_elapsed() {
        assert_eq!(per_sec(10, 0.0), 0.0);
        assert_eq!(per_sec(10, 2.0), 5.0);
    }
}
