use crate::engine::store::DomainValue;

/// Which part of a domain changed after a contraction.
///
/// Spans scope re-triggering in the fine-grained policy: a contractor is
/// only woken up if the span of one of its domains is non-empty, and spans
/// accumulated against an already-queued contractor are merged instead of
/// duplicating the queue entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Span {
    /// The domain never propagates (constant or unbound variable).
    Never,
    /// Nothing changed.
    Unchanged,
    /// The whole domain changed (scalars, slices).
    Whole,
    /// The listed sub-indices changed (vector components, tube slices,
    /// tube-vector components). Sorted, deduplicated.
    Indices(Vec<u32>),
}

impl Span {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Span::Never | Span::Unchanged => true,
            Span::Whole => false,
            Span::Indices(indices) => indices.is_empty(),
        }
    }

    pub(crate) fn indices(indices: impl IntoIterator<Item = u32>) -> Span {
        let mut indices: Vec<u32> = indices.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Span::Indices(indices)
    }

    /// The span between a pre-contraction snapshot and the current value.
    pub(crate) fn diff(before: &DomainValue, after: &DomainValue) -> Span {
        match (before, after) {
            (DomainValue::Interval(a), DomainValue::Interval(b)) => changed(a != b),
            (DomainValue::Slice(a), DomainValue::Slice(b)) => changed(a != b),
            (DomainValue::Vector(a), DomainValue::Vector(b)) => Span::indices(
                (0..a.dim() as u32).filter(|&i| a[i as usize] != b[i as usize]),
            ),
            (DomainValue::Tube(a), DomainValue::Tube(b)) => {
                let n = a.nslices();
                Span::indices((0..n as u32).filter(|&k| {
                    let k = k as usize;
                    a.envelope(k) != b.envelope(k)
                        || a.gate(k) != b.gate(k)
                        || a.gate(k + 1) != b.gate(k + 1)
                }))
            }
            (DomainValue::TubeVector(a), DomainValue::TubeVector(b)) => Span::indices(
                (0..a.size() as u32).filter(|&i| a[i as usize] != b[i as usize]),
            ),
            _ => unreachable!("span between differently-kinded values"),
        }
    }

    /// Union of two spans against the same domain.
    pub(crate) fn merge(&mut self, other: &Span) {
        match (&mut *self, other) {
            (Span::Never, _) | (_, Span::Never) => {}
            (Span::Whole, _) | (_, Span::Unchanged) => {}
            (Span::Unchanged, _) => *self = other.clone(),
            (_, Span::Whole) => *self = Span::Whole,
            (Span::Indices(a), Span::Indices(b)) => {
                a.extend_from_slice(b);
                a.sort_unstable();
                a.dedup();
            }
        }
    }
}

fn changed(has_changed: bool) -> Span {
    if has_changed { Span::Whole } else { Span::Unchanged }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::interval::IntervalVector;

    #[test]
    fn scalar_diff_is_whole_or_unchanged() {
        let a = DomainValue::Interval(Interval::new(2.0, 4.0));
        let b = DomainValue::Interval(Interval::new(3.0, 4.0));

        assert_eq!(Span::diff(&a, &b), Span::Whole);
        assert_eq!(Span::diff(&a, &a), Span::Unchanged);
    }

    #[test]
    fn vector_diff_reports_changed_components_only() {
        let a = DomainValue::Vector(IntervalVector::from([
            Interval::new(2.0, 4.0),
            Interval::new(12.0, 14.0),
        ]));

        // Intersected with [[3,5],[13,15]]: both components change.
        let narrowed = DomainValue::Vector(IntervalVector::from([
            Interval::new(3.0, 4.0),
            Interval::new(13.0, 14.0),
        ]));
        assert_eq!(Span::diff(&a, &narrowed), Span::Indices(vec![0, 1]));

        // Intersected with [[2,4],[13,15]]: only component 1 changes.
        let partly = DomainValue::Vector(IntervalVector::from([
            Interval::new(2.0, 4.0),
            Interval::new(13.0, 14.0),
        ]));
        assert_eq!(Span::diff(&a, &partly), Span::Indices(vec![1]));
    }

    #[test]
    fn merge_unions_indices() {
        let mut span = Span::Indices(vec![0, 2]);
        span.merge(&Span::Indices(vec![1, 2]));
        assert_eq!(span, Span::Indices(vec![0, 1, 2]));

        span.merge(&Span::Whole);
        assert_eq!(span, Span::Whole);
    }

    #[test]
    fn never_is_absorbing() {
        let mut span = Span::Never;
        span.merge(&Span::Whole);
        assert_eq!(span, Span::Never);
        assert!(span.is_empty());
    }
}
