use crate::contractors::Ctc;
use crate::interval::IntervalVector;

/// A static contractor defined by a closure over the box.
///
/// The closure must only narrow the box (the engine intersects the result
/// back regardless, so widening is dropped rather than unsound).
pub struct CtcFn<F> {
    dim: usize,
    name: String,
    f: F,
}

impl<F: Fn(&mut IntervalVector)> CtcFn<F> {
    pub fn new(dim: usize, f: F) -> CtcFn<F> {
        CtcFn::named("fn", dim, f)
    }

    pub fn named(name: &str, dim: usize, f: F) -> CtcFn<F> {
        CtcFn {
            dim,
            name: name.to_owned(),
            f,
        }
    }
}

impl<F: Fn(&mut IntervalVector)> Ctc for CtcFn<F> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn contract(&self, x: &mut IntervalVector) {
        (self.f)(x);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> std::fmt::Debug for CtcFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CtcFn({}, dim {})", self.name, self.dim)
    }
}
