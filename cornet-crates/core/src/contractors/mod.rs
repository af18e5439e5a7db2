//! Contractor operator interfaces, plus a minimal set of bodies.
//!
//! An operator narrows a value towards the subset consistent with its
//! constraint; it must never exclude a consistent value, and narrowing to
//! the empty set is a valid outcome. Operators are opaque to the engine:
//! networks wrap them in contractor nodes and only call through these
//! traits.

mod ctc_deriv;
mod ctc_fn;
mod ctc_sum;

pub use ctc_deriv::CtcDeriv;
pub use ctc_fn::CtcFn;
pub use ctc_sum::CtcSum;

use crate::interval::IntervalVector;
use crate::tube::SliceView;
use crate::tube::Tube;

/// A static contraction operator over a box of scalar values.
///
/// The engine builds the box by copying the current domain values in order
/// and intersects the contracted box back into the domains, so an operator
/// body only has to narrow `x` in place.
pub trait Ctc {
    /// The number of scalar values the operator contracts.
    fn dim(&self) -> usize;

    fn contract(&self, x: &mut IntervalVector);

    fn name(&self) -> &str {
        "ctc"
    }
}

/// A contraction operator over time domains.
///
/// Non-intertemporal operators relate values at one instant only and are
/// applied slice-wise; the engine breaks tubes down to rows of slices and
/// calls [`DynCtc::contract_slices`] per row. Intertemporal operators see
/// whole tubes through [`DynCtc::contract_tubes`].
pub trait DynCtc {
    /// Whether the constraint couples different time instants (and thus
    /// cannot be decomposed to the slice level).
    fn is_intertemporal(&self) -> bool {
        false
    }

    /// Narrows one row of same-tdomain slice views in place.
    fn contract_slices(&self, slices: &mut [SliceView]);

    /// Narrows whole tubes. The default implementation applies
    /// [`DynCtc::contract_slices`] to each row of slices.
    fn contract_tubes(&self, tubes: &mut [Tube]) {
        if tubes.is_empty() {
            return;
        }
        for k in 0..tubes[0].nslices() {
            let mut views: Vec<SliceView> = tubes.iter().map(|t| t.slice_view(k)).collect();
            self.contract_slices(&mut views);
            for (tube, view) in tubes.iter_mut().zip(views.iter()) {
                let envelope = tube.envelope(k) & view.envelope;
                tube.set_envelope(k, envelope);
                let input_gate = tube.gate(k) & view.input_gate;
                tube.set_gate(k, input_gate);
                let output_gate = tube.gate(k + 1) & view.output_gate;
                tube.set_gate(k + 1, output_gate);
            }
        }
    }

    fn name(&self) -> &str {
        "dyn-ctc"
    }
}
