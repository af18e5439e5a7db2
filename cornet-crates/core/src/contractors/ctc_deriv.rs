use crate::asserts::cornet_assert_eq_simple;
use crate::contractors::DynCtc;
use crate::interval::Interval;
use crate::tube::SliceView;

/// Slice-wise differential contractor for `x' = v` over a pair of slices
/// `(x, v)` sharing one tdomain.
///
/// Gates are narrowed by integrating the velocity envelope across the
/// slice, the envelope by the forward and backward reachable sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct CtcDeriv;

impl DynCtc for CtcDeriv {
    fn contract_slices(&self, slices: &mut [SliceView]) {
        cornet_assert_eq_simple!(slices.len(), 2);
        cornet_assert_eq_simple!(slices[0].tdomain, slices[1].tdomain);

        let dt = slices[0].tdomain.diam();
        let v = slices[1].envelope;
        let step = v * Interval::point(dt);
        let reach = v * Interval::new(0.0, dt);

        let x = &mut slices[0];

        let output_gate = x.output_gate & (x.input_gate + step);
        x.output_gate = output_gate;

        let input_gate = x.input_gate & (x.output_gate - step);
        x.input_gate = input_gate;

        let envelope = x.envelope & (x.input_gate + reach) & (x.output_gate - reach);
        x.envelope = envelope;

        let input_gate = x.input_gate & x.envelope;
        x.input_gate = input_gate;
        let output_gate = x.output_gate & x.envelope;
        x.output_gate = output_gate;
    }

    fn name(&self) -> &str {
        "d/dt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(tdomain: Interval, envelope: Interval, input: Interval, output: Interval) -> SliceView {
        SliceView {
            tdomain,
            envelope,
            input_gate: input,
            output_gate: output,
        }
    }

    #[test]
    fn constant_derivative_fixes_the_gates() {
        // x' = 0 with x(0) = 2: the output gate and envelope collapse to 2.
        let t = Interval::new(0.0, 5.0);
        let mut slices = [
            view(t, Interval::new(-10.0, 10.0), Interval::point(2.0), Interval::new(-10.0, 10.0)),
            view(t, Interval::point(0.0), Interval::point(0.0), Interval::point(0.0)),
        ];

        CtcDeriv.contract_slices(&mut slices);

        assert_eq!(slices[0].output_gate, Interval::point(2.0));
        assert_eq!(slices[0].envelope, Interval::point(2.0));
    }

    #[test]
    fn bounded_derivative_bounds_the_reachable_set() {
        // |x'| <= 1 over 5 time units from x(0) = 0.
        let t = Interval::new(0.0, 5.0);
        let mut slices = [
            view(t, Interval::ALL_REALS, Interval::point(0.0), Interval::ALL_REALS),
            view(t, Interval::new(-1.0, 1.0), Interval::new(-1.0, 1.0), Interval::new(-1.0, 1.0)),
        ];

        CtcDeriv.contract_slices(&mut slices);

        assert_eq!(slices[0].output_gate, Interval::new(-5.0, 5.0));
        assert_eq!(slices[0].envelope, Interval::new(-5.0, 5.0));
    }

    #[test]
    fn consistent_slices_are_left_unchanged() {
        let t = Interval::new(0.0, 5.0);
        let x = view(t, Interval::new(-10.0, 10.0), Interval::new(-10.0, 10.0), Interval::new(-10.0, 10.0));
        let v = view(t, Interval::point(0.0), Interval::point(0.0), Interval::point(0.0));

        let mut slices = [x, v];
        CtcDeriv.contract_slices(&mut slices);

        assert_eq!(slices[0], x);
    }
}
