use std::fmt;
use std::ops::BitAnd;
use std::ops::BitAndAssign;
use std::ops::Index;
use std::ops::IndexMut;
use std::ops::Range;

use itertools::Itertools;

use crate::asserts::cornet_assert_eq_simple;
use crate::asserts::cornet_assert_simple;
use crate::interval::Interval;

/// A box: a fixed-dimension vector of [`Interval`]s.
///
/// Following the usual set semantics, a box with one empty component is the
/// empty set.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalVector {
    components: Vec<Interval>,
}

impl IntervalVector {
    /// A `dim`-dimensional box of `[-oo, oo]` components.
    pub fn new(dim: usize) -> IntervalVector {
        IntervalVector::constant(dim, Interval::ALL_REALS)
    }

    /// A `dim`-dimensional box with every component equal to `value`.
    pub fn constant(dim: usize, value: Interval) -> IntervalVector {
        cornet_assert_simple!(dim > 0, "a box must have at least one dimension");
        IntervalVector {
            components: vec![value; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.iter().any(Interval::is_empty)
    }

    /// The hyper-volume: the product of the component diameters, 0 for an
    /// empty box.
    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.components.iter().map(Interval::diam).product()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ Interval> {
        self.components.iter()
    }

    /// The box made of the components in `range`.
    pub fn subvector(&self, range: Range<usize>) -> IntervalVector {
        cornet_assert_simple!(!range.is_empty() && range.end <= self.dim());
        IntervalVector {
            components: self.components[range].to_vec(),
        }
    }
}

impl From<Vec<Interval>> for IntervalVector {
    fn from(components: Vec<Interval>) -> Self {
        cornet_assert_simple!(!components.is_empty());
        IntervalVector { components }
    }
}

impl<const N: usize> From<[Interval; N]> for IntervalVector {
    fn from(components: [Interval; N]) -> Self {
        IntervalVector::from(components.to_vec())
    }
}

impl Index<usize> for IntervalVector {
    type Output = Interval;

    fn index(&self, index: usize) -> &Interval {
        &self.components[index]
    }
}

impl IndexMut<usize> for IntervalVector {
    fn index_mut(&mut self, index: usize) -> &mut Interval {
        &mut self.components[index]
    }
}

impl BitAnd for &IntervalVector {
    type Output = IntervalVector;

    fn bitand(self, rhs: &IntervalVector) -> IntervalVector {
        cornet_assert_eq_simple!(self.dim(), rhs.dim());
        IntervalVector {
            components: self
                .components
                .iter()
                .zip_eq(rhs.components.iter())
                .map(|(a, b)| *a & *b)
                .collect(),
        }
    }
}

impl BitAndAssign<&IntervalVector> for IntervalVector {
    fn bitand_assign(&mut self, rhs: &IntervalVector) {
        *self = &*self & rhs;
    }
}

impl fmt::Display for IntervalVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{component}")?;
        }
        write!(f, ")")
    }
}
