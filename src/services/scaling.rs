/// Conversion from raw section counts to a bounded scaled score. Kept behind
/// a trait because real test programs publish piecewise conversion tables;
/// the grading engine never sees the curve.
pub trait ScalePolicy: Send + Sync {
    fn cap(&self) -> i32;

    fn scale(&self, correct: u32, total: u32) -> i32;
}

#[derive(Debug, Clone, Copy)]
pub struct LinearScale {
    cap: i32,
}

impl LinearScale {
    pub const DEFAULT_CAP: i32 = 495;

    pub fn new(cap: i32) -> Self {
        Self { cap }
    }
}

impl Default for LinearScale {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAP)
    }
}

impl ScalePolicy for LinearScale {
    fn cap(&self) -> i32 {
        self.cap
    }

    fn scale(&self, correct: u32, total: u32) -> i32 {
        if total == 0 {
            return 0;
        }

        let raw = (self.cap as f64 * correct as f64 / total as f64).round() as i32;
        raw.clamp(0, self.cap)
    }
}
