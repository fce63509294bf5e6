//! Strongly typed indices of the per-event flow quantities
//!
//! Flow vectors, plane angles and resolutions are all indexed by a selection
//! and a harmonic order (and sometimes a sub-event half). Rather than raw
//! nested arrays, they live in tables indexed by these types, so that an out
//! of range index cannot be expressed in the first place.

use crate::errors::{FlowError, Result};

use std::{
    convert::TryFrom,
    fmt::{self, Display},
    ops::{Index, IndexMut},
};

/// Number of particle selections
pub const NUM_SELECTIONS: usize = 2;

/// Number of supported harmonic orders
pub const NUM_HARMONICS: usize = 4;

/// Particle selection which a flow vector is built from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Selection {
    /// Event-wide selection
    Default,

    /// Selection restricted to the particles of interest
    Poi,
}
//
impl Selection {
    /// All selections, in storage order
    pub const ALL: [Selection; NUM_SELECTIONS] = [Selection::Default, Selection::Poi];

    /// Storage index of this selection
    pub fn index(self) -> usize {
        self as usize
    }
}
//
impl Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Default => write!(f, "default"),
            Selection::Poi => write!(f, "poi"),
        }
    }
}

/// Harmonic order of a flow vector, restricted to 1..=4
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Harmonic {
    First = 1,
    Second = 2,
    Third = 3,
    Fourth = 4,
}
//
impl Harmonic {
    /// All harmonics, in storage order
    pub const ALL: [Harmonic; NUM_HARMONICS] = [
        Harmonic::First,
        Harmonic::Second,
        Harmonic::Third,
        Harmonic::Fourth,
    ];

    /// Harmonic order n
    pub fn order(self) -> u32 {
        self as u32
    }

    /// Storage index of this harmonic
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Truth that this is an odd harmonic
    pub fn is_odd(self) -> bool {
        self.order() % 2 == 1
    }
}
//
impl TryFrom<u32> for Harmonic {
    type Error = FlowError;

    fn try_from(order: u32) -> Result<Self> {
        match order {
            1 => Ok(Harmonic::First),
            2 => Ok(Harmonic::Second),
            3 => Ok(Harmonic::Third),
            4 => Ok(Harmonic::Fourth),
            other => Err(FlowError::InvalidHarmonic(other)),
        }
    }
}
//
impl Display for Harmonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.order())
    }
}

/// One of the two halves of a sub-event partition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SubeventHalf {
    A,
    B,
}
//
impl SubeventHalf {
    /// Both halves, in storage order
    pub const ALL: [SubeventHalf; 2] = [SubeventHalf::A, SubeventHalf::B];

    /// Storage index of this half
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-size table with one entry per (selection, harmonic) pair
#[derive(Clone, Debug, PartialEq)]
pub struct FlowTable<T>([[T; NUM_HARMONICS]; NUM_SELECTIONS]);
//
impl<T> FlowTable<T> {
    /// Build a table by evaluating a function for every slot
    pub fn from_fn(mut f: impl FnMut(Selection, Harmonic) -> T) -> Self {
        Self(Selection::ALL.map(|sel| Harmonic::ALL.map(|har| f(sel, har))))
    }

    /// Iterate over every slot, with its key
    pub fn iter(&self) -> impl Iterator<Item = ((Selection, Harmonic), &T)> {
        Selection::ALL.into_iter().flat_map(move |sel| {
            Harmonic::ALL
                .into_iter()
                .map(move |har| ((sel, har), &self.0[sel.index()][har.index()]))
        })
    }

    /// Combine this table with another one, slot by slot
    pub fn zip_with(&mut self, other: Self, mut f: impl FnMut(&mut T, T)) {
        for (row, other_row) in self.0.iter_mut().zip(other.0) {
            for (slot, other_slot) in row.iter_mut().zip(other_row) {
                f(slot, other_slot);
            }
        }
    }

    /// Transform every slot of the table
    pub fn map<U>(self, mut f: impl FnMut(Selection, Harmonic, T) -> U) -> FlowTable<U> {
        let mut sel_index = 0;
        FlowTable(self.0.map(|row| {
            let sel = Selection::ALL[sel_index];
            sel_index += 1;
            let mut har_index = 0;
            row.map(|slot| {
                let har = Harmonic::ALL[har_index];
                har_index += 1;
                f(sel, har, slot)
            })
        }))
    }
}
//
impl<T: Default> Default for FlowTable<T> {
    fn default() -> Self {
        Self::from_fn(|_, _| T::default())
    }
}
//
impl<T> Index<(Selection, Harmonic)> for FlowTable<T> {
    type Output = T;

    fn index(&self, (sel, har): (Selection, Harmonic)) -> &T {
        &self.0[sel.index()][har.index()]
    }
}
//
impl<T> IndexMut<(Selection, Harmonic)> for FlowTable<T> {
    fn index_mut(&mut self, (sel, har): (Selection, Harmonic)) -> &mut T {
        &mut self.0[sel.index()][har.index()]
    }
}

/// Fixed-size table with one entry per selection
pub type SelectionTable<T> = [T; NUM_SELECTIONS];
