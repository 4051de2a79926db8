// CORESWEEP STATISTICS
// TWO-PASS MEAN / POPULATION STANDARD DEVIATION (DIVISOR = COUNT).

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
}

impl Moments {
    // NO VALID SAMPLES: NaN, NEVER A MADE-UP ZERO
    pub const EMPTY: Moments = Moments { count: 0, mean: f64::NAN, stddev: f64::NAN };

    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::EMPTY;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            count: values.len(),
            mean,
            stddev: var.sqrt(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
