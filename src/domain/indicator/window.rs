//! Window primitives shared by the indicator library and position sizing.
//!
//! Semantics follow the usual dataframe conventions: a rolling window needs
//! `window` finite observations or the result is NaN, EWM spans use
//! `alpha = 2 / (span + 1)`, and `shift(n)` moves values forward by `n`
//! rows leaving NaN at the start.

/// Values moved forward by `periods`; the first `periods` entries are NaN.
pub fn shift(values: &[f64], periods: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if periods < n {
        out[periods..].copy_from_slice(&values[..n - periods]);
    }
    out
}

fn rolling(values: &[f64], window: usize, reduce: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| !v.is_nan()) {
            out[i] = reduce(slice);
        }
    }
    out
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Sample (n - 1) standard deviation over a trailing window.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        if w.len() < 2 {
            return f64::NAN;
        }
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let ss: f64 = w.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (w.len() - 1) as f64).sqrt()
    })
}

fn alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// Recursive EWM mean: `y[0] = x[0]`, `y[t] = a*x[t] + (1-a)*y[t-1]`.
///
/// Leading NaNs stay NaN; a NaN after the first observation carries the
/// previous value.
pub fn ewm_mean_recursive(values: &[f64], span: usize) -> Vec<f64> {
    let a = alpha(span);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = f64::NAN;
    for &x in values {
        if !x.is_nan() {
            prev = if prev.is_nan() { x } else { a * x + (1.0 - a) * prev };
        }
        out.push(prev);
    }
    out
}

/// Running sums of an exponentially weighted window where each new row
/// decays the older weights by `1 - alpha`, whether or not it is observed.
#[derive(Debug, Default)]
struct EwmAccumulator {
    sum_w: f64,
    sum_w2: f64,
    sum_wx: f64,
    sum_wx2: f64,
    seen: bool,
}

impl EwmAccumulator {
    fn step(&mut self, x: f64, decay: f64) {
        if self.seen {
            self.sum_w *= decay;
            self.sum_w2 *= decay * decay;
            self.sum_wx *= decay;
            self.sum_wx2 *= decay;
        }
        if !x.is_nan() {
            self.sum_w += 1.0;
            self.sum_w2 += 1.0;
            self.sum_wx += x;
            self.sum_wx2 += x * x;
            self.seen = true;
        }
    }

    fn mean(&self) -> f64 {
        if !self.seen {
            return f64::NAN;
        }
        self.sum_wx / self.sum_w
    }

    fn std(&self) -> f64 {
        if !self.seen {
            return f64::NAN;
        }
        let mean = self.mean();
        let biased = (self.sum_wx2 / self.sum_w - mean * mean).max(0.0);
        let denom = self.sum_w * self.sum_w - self.sum_w2;
        if denom <= f64::EPSILON * self.sum_w * self.sum_w {
            return f64::NAN;
        }
        (biased * self.sum_w * self.sum_w / denom).sqrt()
    }
}

/// Weight-normalized EWM mean over the full history.
pub fn ewm_mean(values: &[f64], span: usize) -> Vec<f64> {
    let decay = 1.0 - alpha(span);
    let mut acc = EwmAccumulator::default();
    values
        .iter()
        .map(|&x| {
            acc.step(x, decay);
            acc.mean()
        })
        .collect()
}

/// Bias-corrected EWM standard deviation. NaN until two observations exist.
pub fn ewm_std(values: &[f64], span: usize) -> Vec<f64> {
    let decay = 1.0 - alpha(span);
    let mut acc = EwmAccumulator::default();
    values
        .iter()
        .map(|&x| {
            acc.step(x, decay);
            acc.std()
        })
        .collect()
}

/// `x[t] / x[t - periods] - 1`.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < periods {
                f64::NAN
            } else {
                values[i] / values[i - periods] - 1.0
            }
        })
        .collect()
}
