use crate::asserts::cornet_assert_eq_simple;
use crate::asserts::cornet_assert_simple;
use crate::containers::KeyedVec;
use crate::engine::domain::DomainKind;
use crate::engine::domain::Location;
use crate::engine::domain::SlotId;
use crate::interval::Interval;
use crate::interval::IntervalVector;
use crate::tube::SliceView;
use crate::tube::Tube;
use crate::tube::TubeVector;

/// Size sentinel for unbounded intervals, so that shrink ratios stay finite
/// when domains start unbounded.
pub(crate) const UNBOUNDED_MEASURE: f64 = 999_999.0;

fn measured_diam(i: Interval) -> f64 {
    if i.is_empty() {
        0.0
    } else if i.is_unbounded() {
        UNBOUNDED_MEASURE
    } else {
        i.diam()
    }
}

/// A root value owned by the network.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SlotValue {
    Interval(Interval),
    Vector(IntervalVector),
    Tube(Tube),
    TubeVector(TubeVector),
}

impl SlotValue {
    pub(crate) fn kind(&self) -> DomainKind {
        match self {
            SlotValue::Interval(_) => DomainKind::Scalar,
            SlotValue::Vector(_) => DomainKind::Vector,
            SlotValue::Tube(_) => DomainKind::Tube,
            SlotValue::TubeVector(_) => DomainKind::TubeVector,
        }
    }
}

/// The by-value contents of one domain, in the shape of its kind.
///
/// Used for snapshots (span computation), equality contraction, and
/// crossing nested-network boundaries.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DomainValue {
    Interval(Interval),
    Vector(IntervalVector),
    Slice(SliceView),
    Tube(Tube),
    TubeVector(TubeVector),
}

impl DomainValue {
    pub(crate) fn kind(&self) -> DomainKind {
        match self {
            DomainValue::Interval(_) => DomainKind::Scalar,
            DomainValue::Vector(_) => DomainKind::Vector,
            DomainValue::Slice(_) => DomainKind::TimeSlice,
            DomainValue::Tube(_) => DomainKind::Tube,
            DomainValue::TubeVector(_) => DomainKind::TubeVector,
        }
    }

    /// Component-wise intersection of two same-kind values.
    pub(crate) fn intersect(&self, other: &DomainValue) -> DomainValue {
        match (self, other) {
            (DomainValue::Interval(a), DomainValue::Interval(b)) => DomainValue::Interval(*a & *b),
            (DomainValue::Vector(a), DomainValue::Vector(b)) => DomainValue::Vector(a & b),
            (DomainValue::Slice(a), DomainValue::Slice(b)) => DomainValue::Slice(SliceView {
                tdomain: a.tdomain,
                envelope: a.envelope & b.envelope,
                input_gate: a.input_gate & b.input_gate,
                output_gate: a.output_gate & b.output_gate,
            }),
            (DomainValue::Tube(a), DomainValue::Tube(b)) => {
                DomainValue::Tube(intersect_tubes(a, b))
            }
            (DomainValue::TubeVector(a), DomainValue::TubeVector(b)) => {
                cornet_assert_eq_simple!(a.size(), b.size());
                DomainValue::TubeVector(TubeVector::from_tubes(
                    a.iter()
                        .zip(b.iter())
                        .map(|(ta, tb)| intersect_tubes(ta, tb))
                        .collect(),
                ))
            }
            _ => unreachable!("intersection of differently-kinded domain values"),
        }
    }
}

pub(crate) fn intersect_tubes(a: &Tube, b: &Tube) -> Tube {
    cornet_assert_simple!(a.same_slicing(b));
    let mut out = a.clone();
    for k in 0..a.nslices() {
        out.set_envelope(k, a.envelope(k) & b.envelope(k));
    }
    for k in 0..=a.nslices() {
        out.set_gate(k, a.gate(k) & b.gate(k));
    }
    out
}

/// The single owner of all numeric values of a network, addressed through
/// [`Location`] views.
#[derive(Clone, Debug, Default)]
pub(crate) struct ValueStore {
    slots: KeyedVec<SlotId, SlotValue>,
}

impl ValueStore {
    pub(crate) fn alloc(&mut self, value: SlotValue) -> SlotId {
        self.slots.push(value)
    }

    fn interval_slot(&self, slot: SlotId) -> &Interval {
        match &self.slots[slot] {
            SlotValue::Interval(i) => i,
            _ => unreachable!("slot {slot:?} does not hold an interval"),
        }
    }

    fn vector_slot(&self, slot: SlotId) -> &IntervalVector {
        match &self.slots[slot] {
            SlotValue::Vector(v) => v,
            _ => unreachable!("slot {slot:?} does not hold a box"),
        }
    }

    fn tube_slot(&self, slot: SlotId) -> &Tube {
        match &self.slots[slot] {
            SlotValue::Tube(t) => t,
            _ => unreachable!("slot {slot:?} does not hold a tube"),
        }
    }

    fn tube_vector_slot(&self, slot: SlotId) -> &TubeVector {
        match &self.slots[slot] {
            SlotValue::TubeVector(tv) => tv,
            _ => unreachable!("slot {slot:?} does not hold a tube vector"),
        }
    }

    /// The tube a tube-kind location refers to.
    pub(crate) fn tube_ref(&self, location: Location) -> &Tube {
        match location {
            Location::Tube(slot) => self.tube_slot(slot),
            Location::TubeVectorTube(slot, i) => &self.tube_vector_slot(slot)[i as usize],
            _ => unreachable!("not a tube location: {location:?}"),
        }
    }

    pub(crate) fn tube_vector_ref(&self, location: Location) -> &TubeVector {
        match location {
            Location::TubeVector(slot) => self.tube_vector_slot(slot),
            _ => unreachable!("not a tube-vector location: {location:?}"),
        }
    }

    pub(crate) fn vector_dim(&self, location: Location) -> usize {
        match location {
            Location::Vector(slot) => self.vector_slot(slot).dim(),
            _ => unreachable!("not a vector location: {location:?}"),
        }
    }

    /// A by-value snapshot of the domain at `location`.
    pub(crate) fn read(&self, location: Location) -> DomainValue {
        match location {
            Location::Interval(slot) => DomainValue::Interval(*self.interval_slot(slot)),
            Location::VectorComponent(slot, i) => {
                DomainValue::Interval(self.vector_slot(slot)[i as usize])
            }
            Location::Vector(slot) => DomainValue::Vector(self.vector_slot(slot).clone()),
            Location::Tube(slot) => DomainValue::Tube(self.tube_slot(slot).clone()),
            Location::TubeSlice(slot, k) => {
                DomainValue::Slice(self.tube_slot(slot).slice_view(k as usize))
            }
            Location::TubeVector(slot) => {
                DomainValue::TubeVector(self.tube_vector_slot(slot).clone())
            }
            Location::TubeVectorTube(slot, i) => {
                DomainValue::Tube(self.tube_vector_slot(slot)[i as usize].clone())
            }
            Location::TubeVectorSlice(slot, i, k) => {
                DomainValue::Slice(self.tube_vector_slot(slot)[i as usize].slice_view(k as usize))
            }
        }
    }

    /// Writes `value` through the view at `location`.
    pub(crate) fn write(&mut self, location: Location, value: DomainValue) {
        match (location, value) {
            (Location::Interval(slot), DomainValue::Interval(i)) => {
                self.slots[slot] = SlotValue::Interval(i);
            }
            (Location::VectorComponent(slot, c), DomainValue::Interval(i)) => {
                match &mut self.slots[slot] {
                    SlotValue::Vector(v) => v[c as usize] = i,
                    _ => unreachable!("slot {slot:?} does not hold a box"),
                }
            }
            (Location::Vector(slot), DomainValue::Vector(v)) => {
                self.slots[slot] = SlotValue::Vector(v);
            }
            (Location::Tube(slot), DomainValue::Tube(t)) => {
                self.slots[slot] = SlotValue::Tube(t);
            }
            (Location::TubeSlice(slot, k), DomainValue::Slice(view)) => {
                match &mut self.slots[slot] {
                    SlotValue::Tube(t) => write_slice(t, k as usize, view),
                    _ => unreachable!("slot {slot:?} does not hold a tube"),
                }
            }
            (Location::TubeVector(slot), DomainValue::TubeVector(tv)) => {
                self.slots[slot] = SlotValue::TubeVector(tv);
            }
            (Location::TubeVectorTube(slot, i), DomainValue::Tube(t)) => {
                match &mut self.slots[slot] {
                    SlotValue::TubeVector(tv) => tv[i as usize] = t,
                    _ => unreachable!("slot {slot:?} does not hold a tube vector"),
                }
            }
            (Location::TubeVectorSlice(slot, i, k), DomainValue::Slice(view)) => {
                match &mut self.slots[slot] {
                    SlotValue::TubeVector(tv) => write_slice(&mut tv[i as usize], k as usize, view),
                    _ => unreachable!("slot {slot:?} does not hold a tube vector"),
                }
            }
            (location, value) => {
                unreachable!("cannot write a {:?} value at {location:?}", value.kind())
            }
        }
    }

    /// Overwrites the root value of a slot (used when resetting created
    /// domains to their declared initial value).
    pub(crate) fn write_root(&mut self, location: Location, value: SlotValue) {
        let slot = match location {
            Location::Interval(slot)
            | Location::Vector(slot)
            | Location::Tube(slot)
            | Location::TubeVector(slot) => slot,
            _ => unreachable!("not a root location: {location:?}"),
        };
        cornet_assert_eq_simple!(self.slots[slot].kind(), value.kind());
        self.slots[slot] = value;
    }

    pub(crate) fn is_empty(&self, location: Location) -> bool {
        match location {
            Location::Interval(slot) => self.interval_slot(slot).is_empty(),
            Location::VectorComponent(slot, i) => self.vector_slot(slot)[i as usize].is_empty(),
            Location::Vector(slot) => self.vector_slot(slot).is_empty(),
            Location::Tube(slot) => self.tube_slot(slot).is_empty(),
            Location::TubeSlice(slot, k) => self.tube_slot(slot).slice_view(k as usize).is_empty(),
            Location::TubeVector(slot) => self.tube_vector_slot(slot).is_empty(),
            Location::TubeVectorTube(slot, i) => self.tube_vector_slot(slot)[i as usize].is_empty(),
            Location::TubeVectorSlice(slot, i, k) => self.tube_vector_slot(slot)[i as usize]
                .slice_view(k as usize)
                .is_empty(),
        }
    }

    /// The fixed-point measure of the domain at `location`: diameter for
    /// scalars, hyper-volume for boxes, envelope area plus gate diameters
    /// for slices and tubes.
    pub(crate) fn measure(&self, location: Location) -> f64 {
        match location {
            Location::Interval(slot) => measured_diam(*self.interval_slot(slot)),
            Location::VectorComponent(slot, i) => {
                measured_diam(self.vector_slot(slot)[i as usize])
            }
            Location::Vector(slot) => {
                let v = self.vector_slot(slot);
                if v.is_empty() {
                    0.0
                } else {
                    v.iter().map(|i| measured_diam(*i)).product()
                }
            }
            Location::Tube(slot) => tube_measure(self.tube_slot(slot)),
            Location::TubeSlice(slot, k) => {
                slice_measure(&self.tube_slot(slot).slice_view(k as usize))
            }
            Location::TubeVector(slot) => {
                self.tube_vector_slot(slot).iter().map(tube_measure).sum()
            }
            Location::TubeVectorTube(slot, i) => {
                tube_measure(&self.tube_vector_slot(slot)[i as usize])
            }
            Location::TubeVectorSlice(slot, i, k) => {
                slice_measure(&self.tube_vector_slot(slot)[i as usize].slice_view(k as usize))
            }
        }
    }
}

fn write_slice(tube: &mut Tube, k: usize, view: SliceView) {
    tube.set_envelope(k, view.envelope);
    tube.set_gate(k, view.input_gate);
    tube.set_gate(k + 1, view.output_gate);
}

fn slice_measure(view: &SliceView) -> f64 {
    view.tdomain.diam() * measured_diam(view.envelope)
        + measured_diam(view.input_gate)
        + measured_diam(view.output_gate)
}

fn tube_measure(tube: &Tube) -> f64 {
    let mut volume = 0.0;
    for k in 0..tube.nslices() {
        volume += tube.slice_tdomain(k).diam() * measured_diam(tube.envelope(k));
    }
    for k in 0..=tube.nslices() {
        volume += measured_diam(tube.gate(k));
    }
    volume
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_views_alias_vector_slots() {
        let mut store = ValueStore::default();
        let slot = store.alloc(SlotValue::Vector(IntervalVector::new(2)));

        store.write(
            Location::VectorComponent(slot, 1),
            DomainValue::Interval(Interval::new(0.0, 1.0)),
        );

        match store.read(Location::Vector(slot)) {
            DomainValue::Vector(v) => assert_eq!(v[1], Interval::new(0.0, 1.0)),
            _ => panic!("expected a box"),
        }
    }

    #[test]
    fn slice_views_share_gates() {
        let mut store = ValueStore::default();
        let tube = Tube::new(Interval::new(0.0, 10.0), 5.0, Interval::new(-2.0, 2.0));
        let slot = store.alloc(SlotValue::Tube(tube));

        let mut view = match store.read(Location::TubeSlice(slot, 0)) {
            DomainValue::Slice(view) => view,
            _ => panic!("expected a slice"),
        };
        view.output_gate = Interval::point(1.0);
        store.write(Location::TubeSlice(slot, 0), DomainValue::Slice(view));

        match store.read(Location::TubeSlice(slot, 1)) {
            DomainValue::Slice(next) => assert_eq!(next.input_gate, Interval::point(1.0)),
            _ => panic!("expected a slice"),
        }
    }

    #[test]
    fn measures_follow_the_kind() {
        let mut store = ValueStore::default();

        let i = store.alloc(SlotValue::Interval(Interval::new(1.0, 3.0)));
        assert_eq!(store.measure(Location::Interval(i)), 2.0);

        let v = store.alloc(SlotValue::Vector(IntervalVector::from([
            Interval::new(0.0, 2.0),
            Interval::new(0.0, 3.0),
        ])));
        assert_eq!(store.measure(Location::Vector(v)), 6.0);

        let unbounded = store.alloc(SlotValue::Interval(Interval::ALL_REALS));
        assert_eq!(store.measure(Location::Interval(unbounded)), UNBOUNDED_MEASURE);
    }

    #[test]
    fn empty_domains_measure_zero() {
        let mut store = ValueStore::default();
        let slot = store.alloc(SlotValue::Interval(Interval::EMPTY));

        assert!(store.is_empty(Location::Interval(slot)));
        assert_eq!(store.measure(Location::Interval(slot)), 0.0);
    }
}
