use std::fmt;
use std::ops::Index;
use std::ops::IndexMut;

use crate::asserts::cornet_assert_simple;
use crate::interval::Interval;
use crate::interval::IntervalVector;
use crate::tube::Tube;

/// A fixed-size vector of [`Tube`]s sharing one slicing.
#[derive(Clone, Debug, PartialEq)]
pub struct TubeVector {
    tubes: Vec<Tube>,
}

impl TubeVector {
    /// Creates a `dim`-dimensional tube vector over `tdomain`, each
    /// component with the corresponding `codomain` envelope.
    pub fn new(tdomain: Interval, timestep: f64, codomain: &IntervalVector) -> TubeVector {
        TubeVector {
            tubes: (0..codomain.dim())
                .map(|i| Tube::new(tdomain, timestep, codomain[i]))
                .collect(),
        }
    }

    /// Builds a tube vector from components; they must share their slicing.
    pub fn from_tubes(tubes: Vec<Tube>) -> TubeVector {
        cornet_assert_simple!(!tubes.is_empty());
        cornet_assert_simple!(
            tubes.iter().all(|t| t.same_slicing(&tubes[0])),
            "tube vector components must share the same slicing"
        );
        TubeVector { tubes }
    }

    pub fn size(&self) -> usize {
        self.tubes.len()
    }

    pub fn nslices(&self) -> usize {
        self.tubes[0].nslices()
    }

    pub fn tdomain(&self) -> Interval {
        self.tubes[0].tdomain()
    }

    pub fn volume(&self) -> f64 {
        self.tubes.iter().map(Tube::volume).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tubes.iter().any(Tube::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ Tube> {
        self.tubes.iter()
    }
}

impl Index<usize> for TubeVector {
    type Output = Tube;

    fn index(&self, index: usize) -> &Tube {
        &self.tubes[index]
    }
}

impl IndexMut<usize> for TubeVector {
    fn index_mut(&mut self, index: usize) -> &mut Tube {
        &mut self.tubes[index]
    }
}

impl fmt::Display for TubeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TubeVector dim {} over {} ({} slices)",
            self.size(),
            self.tdomain(),
            self.nslices()
        )
    }
}
