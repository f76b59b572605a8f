/// Simple moving average over closing prices, maintained with a running sum
/// of raw closes.
///
/// Both the full rebuild and the one-bar paths apply the same floating-point
/// operations in the same order (`sum + close[i] - close[i - window]`), so a
/// column grown bar by bar is bit-for-bit equal to one rebuilt from scratch.
/// At every index that is a multiple of `window` the sum is re-anchored on the
/// raw closes, so accumulated rounding error never outlives one window.
/// Values before index `window - 1` are NaN.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    decimals: Option<u32>,
    values: Vec<f64>,
    /// Sum of the window ending at the last index.
    sum: f64,
    /// Sum of the window ending one index earlier, kept for `replace_last`.
    prev_sum: f64,
}

impl RollingMean {
    pub fn new(window: usize, decimals: Option<u32>) -> Self {
        assert!(window >= 1, "moving average window must be >= 1");
        Self {
            window,
            decimals,
            values: Vec::new(),
            sum: 0.0,
            prev_sum: 0.0,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rebuild the whole column from `closes`.
    pub fn recompute(&mut self, closes: &[f64]) {
        self.values.clear();
        self.values.reserve(closes.len());
        self.sum = 0.0;
        self.prev_sum = 0.0;
        for i in 0..closes.len() {
            self.advance(closes, i);
        }
    }

    /// Extend by one value. `closes` must hold exactly one more close than
    /// the column; returns false (and changes nothing) otherwise.
    pub fn push(&mut self, closes: &[f64]) -> bool {
        if closes.len() != self.values.len() + 1 {
            return false;
        }
        self.advance(closes, closes.len() - 1);
        true
    }

    /// Recompute only the last value after the newest close changed.
    /// `closes` must be the same length as the column.
    pub fn replace_last(&mut self, closes: &[f64]) -> bool {
        if closes.is_empty() || closes.len() != self.values.len() {
            return false;
        }
        let i = closes.len() - 1;
        self.sum = self.window_sum(self.prev_sum, closes, i);
        self.values[i] = self.value_at(i);
        true
    }

    fn advance(&mut self, closes: &[f64], i: usize) {
        self.prev_sum = self.sum;
        self.sum = self.window_sum(self.sum, closes, i);
        let value = self.value_at(i);
        self.values.push(value);
    }

    fn window_sum(&self, previous: f64, closes: &[f64], i: usize) -> f64 {
        if i % self.window == 0 {
            let start = (i + 1).saturating_sub(self.window);
            return closes[start..=i].iter().sum();
        }
        let mut sum = previous + closes[i];
        if i >= self.window {
            sum -= closes[i - self.window];
        }
        sum
    }

    fn value_at(&self, i: usize) -> f64 {
        if i + 1 < self.window {
            return f64::NAN;
        }
        let mean = self.sum / self.window as f64;
        match self.decimals {
            Some(d) => round_to(mean, d),
            None => mean,
        }
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
