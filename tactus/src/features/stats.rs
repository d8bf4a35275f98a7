// tactus/src/features/stats.rs
//
// Deterministic descriptive statistics. Population moments; a statistic that
// is undefined for the sample size is reported as 0:
//   std needs ≥2 points, skewness ≥3, excess kurtosis ≥4.

/// Number of values `Summary::push_into` appends.
pub const SUMMARY_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub count:    usize,
    pub mean:     f64,
    pub std:      f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub median:   f64,
    pub min:      f64,
    pub max:      f64,
}

const EPS: f64 = 1e-12;

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let n = values.len();
        if n == 0 {
            return Self::default();
        }
        let nf   = n as f64;
        let mean = values.iter().sum::<f64>() / nf;

        let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
        for v in &values {
            let d = v - mean;
            m2 += d * d;
            m3 += d * d * d;
            m4 += d * d * d * d;
        }
        m2 /= nf;
        m3 /= nf;
        m4 /= nf;

        let std = if n >= 2 { m2.sqrt() } else { 0.0 };
        let skewness = if n >= 3 && std > EPS { m3 / std.powi(3) } else { 0.0 };
        let kurtosis = if n >= 4 && std > EPS { m4 / (m2 * m2) - 3.0 } else { 0.0 };

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = if n % 2 == 1 { sorted[n / 2] } else { (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0 };

        Self {
            count: n,
            mean,
            std,
            skewness,
            kurtosis,
            median,
            min: sorted[0],
            max: sorted[n - 1],
        }
    }

    /// Append [mean, std, skewness, kurtosis, median, min, max].
    pub fn push_into(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[self.mean, self.std, self.skewness, self.kurtosis, self.median, self.min, self.max]);
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Coefficient of variation; 0 when the mean is not positive.
pub fn cv(values: &[f64]) -> f64 {
    let m = mean(values);
    if m > EPS { std_dev(values) / m } else { 0.0 }
}
