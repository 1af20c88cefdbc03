use core::fmt;

/// Point-in-time view of the pool's load distribution.
///
/// `loads` is indexed by [`WorkerId`](crate::WorkerId). `variance` is the
/// population variance `E[x^2] - E[x]^2`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    pub loads: Vec<usize>,
    pub total: usize,
    pub mean: f64,
    pub variance: f64,
}

impl PoolStats {
    pub fn from_loads(loads: Vec<usize>) -> Self {
        let total: usize = loads.iter().sum();
        let (mean, variance) = if loads.is_empty() {
            (0.0, 0.0)
        } else {
            let n = loads.len() as f64;
            let sum_sq: f64 = loads.iter().map(|&l| (l as f64) * (l as f64)).sum();
            let mean = total as f64 / n;
            (mean, sum_sq / n - mean * mean)
        };

        Self {
            loads,
            total,
            mean,
            variance,
        }
    }
}

impl fmt::Display for PoolStats {
    /// `1 0 2  1.00 0.67`: every load, then mean and variance.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for load in &self.loads {
            write!(f, "{load} ")?;
        }
        write!(f, " {:.2} {:.2}", self.mean, self.variance)
    }
}
