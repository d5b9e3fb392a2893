use num_traits::{AsPrimitive, Float};

/// Storage type for distances and probabilities.
///
/// Arithmetic always happens in `f64`; values are widened on read and
/// narrowed once, when a finished row is written out.
pub trait Element: Float + AsPrimitive<f64> + Default + Send + Sync + 'static {
    #[inline]
    fn widen(self) -> f64 {
        self.as_()
    }

    fn narrow(value: f64) -> Self;
}

impl Element for f32 {
    #[inline]
    fn narrow(value: f64) -> Self {
        value.as_()
    }
}

impl Element for f64 {
    #[inline]
    fn narrow(value: f64) -> Self {
        value
    }
}
