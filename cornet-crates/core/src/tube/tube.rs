use std::fmt;

use crate::asserts::cornet_assert_simple;
use crate::interval::Interval;

#[derive(Clone, Debug, PartialEq)]
struct Slice {
    tdomain: Interval,
    envelope: Interval,
}

/// An interval-valued function of time over a bounded time domain, stored as
/// an ordered sequence of slices with shared boundary gates.
#[derive(Clone, Debug, PartialEq)]
pub struct Tube {
    slices: Vec<Slice>,
    gates: Vec<Interval>,
}

impl Tube {
    /// Creates a tube over `tdomain` with slices of width `timestep` (the
    /// last slice may be shorter) and a constant `codomain` envelope.
    pub fn new(tdomain: Interval, timestep: f64, codomain: Interval) -> Tube {
        cornet_assert_simple!(
            !tdomain.is_empty() && !tdomain.is_unbounded(),
            "a tube needs a bounded time domain"
        );
        cornet_assert_simple!(timestep > 0.0);

        let mut slices = Vec::new();
        let mut lb = tdomain.lb();
        while lb < tdomain.ub() {
            let ub = (lb + timestep).min(tdomain.ub());
            slices.push(Slice {
                tdomain: Interval::new(lb, ub),
                envelope: codomain,
            });
            lb = ub;
        }
        cornet_assert_simple!(!slices.is_empty());

        let gates = vec![codomain; slices.len() + 1];
        Tube { slices, gates }
    }

    pub fn nslices(&self) -> usize {
        self.slices.len()
    }

    pub fn tdomain(&self) -> Interval {
        Interval::new(
            self.slices[0].tdomain.lb(),
            self.slices[self.nslices() - 1].tdomain.ub(),
        )
    }

    pub fn slice_tdomain(&self, k: usize) -> Interval {
        self.slices[k].tdomain
    }

    pub fn envelope(&self, k: usize) -> Interval {
        self.slices[k].envelope
    }

    pub fn set_envelope(&mut self, k: usize, envelope: Interval) {
        self.slices[k].envelope = envelope;
    }

    /// The gate shared between slice `k - 1` and slice `k`; gate 0 is the
    /// input of the tube, gate `nslices()` its output.
    pub fn gate(&self, k: usize) -> Interval {
        self.gates[k]
    }

    pub fn set_gate(&mut self, k: usize, gate: Interval) {
        self.gates[k] = gate;
    }

    pub fn input_gate(&self, k: usize) -> Interval {
        self.gates[k]
    }

    pub fn output_gate(&self, k: usize) -> Interval {
        self.gates[k + 1]
    }

    /// The hull of all slice envelopes.
    pub fn codomain(&self) -> Interval {
        self.slices
            .iter()
            .fold(Interval::EMPTY, |hull, slice| hull | slice.envelope)
    }

    /// The summed area of the slices; `+oo` if any envelope is unbounded.
    pub fn volume(&self) -> f64 {
        self.slices
            .iter()
            .map(|slice| slice.tdomain.diam() * slice.envelope.diam())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.iter().any(|slice| slice.envelope.is_empty())
            || self.gates.iter().any(Interval::is_empty)
    }

    pub fn same_slicing(&self, other: &Tube) -> bool {
        self.nslices() == other.nslices()
            && self
                .slices
                .iter()
                .zip(other.slices.iter())
                .all(|(a, b)| a.tdomain == b.tdomain)
    }

    /// A by-value view of slice `k`, the unit of work of slice-wise
    /// contractor bodies.
    pub fn slice_view(&self, k: usize) -> SliceView {
        SliceView {
            tdomain: self.slices[k].tdomain,
            envelope: self.slices[k].envelope,
            input_gate: self.input_gate(k),
            output_gate: self.output_gate(k),
        }
    }
}

impl fmt::Display for Tube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tube {}->{} ({} slices)",
            self.tdomain(),
            self.codomain(),
            self.nslices()
        )
    }
}

/// The value of one time slice: its envelope and both boundary gates.
///
/// Slice-wise contractor bodies receive and narrow these views; the engine
/// intersects the result back into tube storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceView {
    pub tdomain: Interval,
    pub envelope: Interval,
    pub input_gate: Interval,
    pub output_gate: Interval,
}

impl SliceView {
    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty() || self.input_gate.is_empty() || self.output_gate.is_empty()
    }
}
