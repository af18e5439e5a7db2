//! Propagation through time-indexed domains: tubes, slices, gates.

use std::rc::Rc;

use cornet_solver::ContractorNetwork;
use cornet_solver::NetworkError;
use cornet_solver::TriggerPolicy;
use cornet_solver::contractors::Ctc;
use cornet_solver::contractors::CtcDeriv;
use cornet_solver::contractors::CtcFn;
use cornet_solver::contractors::DynCtc;
use cornet_solver::interval::Interval;
use cornet_solver::interval::IntervalVector;
use cornet_solver::tube::Tube;
use cornet_solver::tube::TubeVector;

fn pin(value: Interval) -> Rc<dyn Ctc> {
    Rc::new(CtcFn::named("pin", 1, move |x: &mut IntervalVector| {
        x[0] = x[0] & value;
    }))
}

fn observation_pins_the_whole_tube(policy: TriggerPolicy) {
    let mut cn = ContractorNetwork::with_policy(policy);
    let x = cn.create_tube(Tube::new(
        Interval::new(0.0, 20.0),
        5.0,
        Interval::new(-10.0, 10.0),
    ));
    let v = cn.create_tube(Tube::new(
        Interval::new(0.0, 20.0),
        5.0,
        Interval::point(0.0),
    ));

    let deriv: Rc<dyn DynCtc> = Rc::new(CtcDeriv);
    cn.add_dyn(&deriv, &[x, v]).unwrap();
    let contractors = cn.num_contractors();
    cn.add_dyn(&deriv, &[x, v]).unwrap(); // redundant, not added
    assert_eq!(cn.num_contractors(), contractors);

    let _ = cn.contract(false).unwrap();
    // A zero derivative is consistent with the initial envelopes.
    assert_eq!(cn.tube(x).codomain(), Interval::new(-10.0, 10.0));
    assert_eq!(cn.tube(v).codomain(), Interval::point(0.0));

    // Observe x(t) = 2 somewhere inside the second slice; since x' = 0 the
    // observation spreads over the whole tube through the shared gates.
    let s1 = cn.slice_domain(x, 1);
    cn.add_static(&pin(Interval::point(2.0)), &[s1]).unwrap();
    let _ = cn.contract(false).unwrap();

    let contracted = cn.tube(x);
    assert_eq!(contracted.codomain(), Interval::point(2.0));
    for k in 0..=contracted.nslices() {
        assert_eq!(contracted.gate(k), Interval::point(2.0));
    }
    assert_eq!(cn.num_queued(), 0);
}

#[test]
fn observation_propagates_with_volume_ratios() {
    observation_pins_the_whole_tube(TriggerPolicy::VolumeRatio);
}

#[test]
fn observation_propagates_with_change_spans() {
    observation_pins_the_whole_tube(TriggerPolicy::ChangeSpan);
}

#[test]
fn static_contractors_decompose_over_slices() {
    let mut cn = ContractorNetwork::new();
    let x = cn.create_tube(Tube::new(
        Interval::new(0.0, 20.0),
        5.0,
        Interval::new(-10.0, 10.0),
    ));
    let s = cn.create_interval(Interval::point(2.0));

    // x(t) = s at every t, applied slice-wise (envelope and both gates).
    let equal: Rc<dyn Ctc> = Rc::new(CtcFn::named("=", 2, |x: &mut IntervalVector| {
        let intersection = x[0] & x[1];
        x[0] = intersection;
        x[1] = intersection;
    }));
    cn.add_static(&equal, &[x, s]).unwrap();

    // One structural node for the tube, three between adjacent slices, and
    // four slice-wise instances of the operator.
    assert_eq!(cn.num_domains(), 6);
    assert_eq!(cn.num_contractors(), 8);

    let _ = cn.contract(false).unwrap();

    let contracted = cn.tube(x);
    assert_eq!(contracted.codomain(), Interval::point(2.0));
    for k in 0..=contracted.nslices() {
        assert_eq!(contracted.gate(k), Interval::point(2.0));
    }
}

#[test]
fn tubes_with_different_slicings_are_rejected() {
    let mut cn = ContractorNetwork::new();
    let a = cn.create_tube(Tube::new(
        Interval::new(0.0, 2.0),
        1.0,
        Interval::new(0.0, 1.0),
    ));
    let b = cn.create_tube(Tube::new(
        Interval::new(0.0, 3.0),
        1.0,
        Interval::new(0.0, 1.0),
    ));

    assert_eq!(cn.add_equality(a, b), Err(NetworkError::SlicingMismatch));

    let deriv: Rc<dyn DynCtc> = Rc::new(CtcDeriv);
    assert_eq!(
        cn.add_dyn(&deriv, &[a, b]),
        Err(NetworkError::SlicingMismatch)
    );
}

#[test]
fn tube_vector_equality_intersects_components() {
    let mut cn = ContractorNetwork::new();
    let tdomain = Interval::new(0.0, 2.0);
    let tv_a = cn.create_tube_vector(TubeVector::new(
        tdomain,
        1.0,
        &IntervalVector::from([Interval::new(-2.0, 2.0), Interval::new(0.0, 4.0)]),
    ));
    let tv_b = cn.create_tube_vector(TubeVector::new(
        tdomain,
        1.0,
        &IntervalVector::from([Interval::new(-1.0, 3.0), Interval::new(1.0, 5.0)]),
    ));

    let _ = cn.add_equality(tv_a, tv_b).unwrap();
    let _ = cn.contract(false).unwrap();

    for id in [tv_a, tv_b] {
        let tv = cn.tube_vector(id);
        assert_eq!(tv[0].codomain(), Interval::new(-1.0, 2.0));
        assert_eq!(tv[1].codomain(), Interval::new(1.0, 4.0));
    }
}

#[test]
fn realtime_data_contracts_covered_slices() {
    let mut cn = ContractorNetwork::new();
    let x = cn.create_tube(Tube::new(
        Interval::new(0.0, 4.0),
        1.0,
        Interval::new(-10.0, 10.0),
    ));

    cn.add_data(x, 0.0, Interval::point(0.0)).unwrap();
    // The first slice is not fully covered yet.
    assert_eq!(cn.tube(x).envelope(0), Interval::new(-10.0, 10.0));

    cn.add_data(x, 1.0, Interval::point(1.0)).unwrap();
    let tube = cn.tube(x);
    assert_eq!(tube.envelope(0), Interval::new(0.0, 1.0));
    assert_eq!(tube.gate(0), Interval::point(0.0));
    assert_eq!(tube.gate(1), Interval::point(1.0));
    assert_eq!(tube.envelope(1), Interval::new(-10.0, 10.0));

    // Timestamps must increase.
    assert_eq!(
        cn.add_data(x, 0.5, Interval::point(0.5)),
        Err(NetworkError::DataOutOfOrder(0.5))
    );

    // The feed change is propagated on the next contraction.
    let _ = cn.contract(false).unwrap();
    assert_eq!(cn.num_queued(), 0);
}
