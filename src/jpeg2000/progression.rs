//! Progression orders and progression order changes (A.6.1, A.6.6, B.12).

use std::fmt;
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constants::PROGRESSION_CHANGE_LIST_GROWTH;
use crate::error::T2Error;

/// Packet progression order, with the code used in the COD and POC marker segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProgressionOrder {
    /// Layer-resolution level-component-position
    #[default]
    Lrcp = 0,
    /// Resolution level-layer-component-position
    Rlcp = 1,
    /// Resolution level-position-component-layer
    Rpcl = 2,
    /// Position-component-resolution level-layer
    Pcrl = 3,
    /// Component-position-resolution level-layer
    Cprl = 4,
}

impl ProgressionOrder {
    pub const ALL: [ProgressionOrder; 5] = [
        ProgressionOrder::Lrcp,
        ProgressionOrder::Rlcp,
        ProgressionOrder::Rpcl,
        ProgressionOrder::Pcrl,
        ProgressionOrder::Cprl,
    ];

    pub fn from_code(code: u8) -> Result<Self, T2Error> {
        Self::try_from(code).map_err(|_| T2Error::InvalidProgressionOrder)
    }

    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressionOrder::Lrcp => "LRCP",
            ProgressionOrder::Rlcp => "RLCP",
            ProgressionOrder::Rpcl => "RPCL",
            ProgressionOrder::Pcrl => "PCRL",
            ProgressionOrder::Cprl => "CPRL",
        }
    }
}

impl fmt::Display for ProgressionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressionOrder {
    type Err = T2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|order| order.as_str().eq_ignore_ascii_case(s))
            .ok_or(T2Error::InvalidProgressionOrder)
    }
}

/// One progression volume: a progression order applied to a sub-range of
/// resolution levels, components and layers.
///
/// Starts are inclusive, ends exclusive. Layers always start at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionChange {
    pub order: ProgressionOrder,
    pub resolution_start: usize,
    pub component_start: usize,
    pub layer_end: usize,
    pub resolution_end: usize,
    pub component_end: usize,
}

impl ProgressionChange {
    /// A change covering the whole tile.
    pub fn full(
        order: ProgressionOrder,
        num_layers: usize,
        num_resolutions: usize,
        num_components: usize,
    ) -> Self {
        Self {
            order,
            resolution_start: 0,
            component_start: 0,
            layer_end: num_layers,
            resolution_end: num_resolutions,
            component_end: num_components,
        }
    }
}

impl fmt::Display for ProgressionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.order,
            self.resolution_start,
            self.component_start,
            self.layer_end,
            self.resolution_end,
            self.component_end
        )
    }
}

/// Parses `ORDER:RSpoc:CSpoc:LYEpoc:REpoc:CEpoc`, the field order of a POC entry.
impl FromStr for ProgressionChange {
    type Err = T2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(':').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(T2Error::InvalidProgressionChange);
        }
        let order = fields[0].parse()?;
        let mut numbers = [0usize; 5];
        for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
            *slot = field
                .parse()
                .map_err(|_| T2Error::InvalidProgressionChange)?;
        }
        let [resolution_start, component_start, layer_end, resolution_end, component_end] =
            numbers;
        Ok(Self {
            order,
            resolution_start,
            component_start,
            layer_end,
            resolution_end,
            component_end,
        })
    }
}

/// Ordered list of progression changes, in the order they are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressionChangeList {
    changes: Vec<ProgressionChange>,
}

impl ProgressionChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProgressionChange> {
        self.changes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProgressionChange> {
        self.changes.iter()
    }

    /// Insert `change` before `index`; an index equal to `len()` appends.
    pub fn insert(&mut self, index: usize, change: ProgressionChange) -> Result<(), T2Error> {
        if index > self.changes.len() {
            return Err(T2Error::InvalidIndex);
        }
        if self.changes.len() == self.changes.capacity() {
            self.changes
                .try_reserve_exact(PROGRESSION_CHANGE_LIST_GROWTH)
                .map_err(|_| T2Error::NotEnoughMemory)?;
        }
        self.changes.insert(index, change);
        Ok(())
    }

    pub fn push(&mut self, change: ProgressionChange) -> Result<(), T2Error> {
        self.insert(self.changes.len(), change)
    }

    /// Remove and return the change at `index`.
    pub fn remove(&mut self, index: usize) -> Result<ProgressionChange, T2Error> {
        if index >= self.changes.len() {
            return Err(T2Error::InvalidIndex);
        }
        Ok(self.changes.remove(index))
    }
}

impl<'a> IntoIterator for &'a ProgressionChangeList {
    type Item = &'a ProgressionChange;
    type IntoIter = std::slice::Iter<'a, ProgressionChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
