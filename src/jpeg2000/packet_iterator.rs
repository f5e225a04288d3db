//! Packet progression (B.12).
//!
//! A [`PacketIterator`] walks the (component, resolution, precinct, layer) space of a tile
//! in the order set by the active progression volume. Volumes come from the progression
//! change list first, then a default volume covering the whole tile with the COD order.
//!
//! Each generator keeps its loop indices in the iterator and re-enters its nested loops
//! from them on the next call. Re-entering at the tuple that was just returned is harmless:
//! its precinct layer counter has already moved past that layer.

use log::{debug, trace};

use crate::error::T2Error;
use crate::jpeg2000::image::{J2kTile, Rect};
use crate::jpeg2000::progression::{
    ProgressionChange, ProgressionChangeList, ProgressionOrder,
};

/// Coordinates of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketPosition {
    pub component: usize,
    pub resolution: usize,
    pub precinct: usize,
    pub layer: usize,
}

/// Precinct partition of one resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiResolutionInfo {
    pub precinct_width_exp: u32,
    pub precinct_height_exp: u32,
    pub num_precincts_wide: u32,
    pub num_precincts_high: u32,
}

impl PiResolutionInfo {
    pub fn num_precincts(&self) -> usize {
        self.num_precincts_wide as usize * self.num_precincts_high as usize
    }
}

/// Sub-sampling and resolution levels of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiComponentInfo {
    pub dx: u32,
    pub dy: u32,
    pub resolutions: Vec<PiResolutionInfo>,
}

pub struct PacketIterator {
    tile: Rect,
    num_layers: usize,
    max_resolutions: usize,
    components: Vec<PiComponentInfo>,
    /// Next layer expected by every precinct, indexed [component][resolution][precinct].
    layer_counters: Vec<Vec<Vec<usize>>>,
    default_change: ProgressionChange,
    changes: ProgressionChangeList,

    next_change: usize,
    active: Option<ProgressionChange>,
    first_visit: bool,
    component: usize,
    resolution: usize,
    precinct: usize,
    layer: usize,
    x: u64,
    y: u64,
    x_step: u64,
    y_step: u64,

    position: Option<PacketPosition>,
    packet_number: Option<usize>,
}

impl PacketIterator {
    pub fn new(
        tile: Rect,
        num_layers: usize,
        components: Vec<PiComponentInfo>,
        default_order: ProgressionOrder,
    ) -> Result<Self, T2Error> {
        if tile.is_empty() {
            return Err(T2Error::InvalidParameterTileSize);
        }
        if components.is_empty() {
            return Err(T2Error::InvalidParameterComponentCount);
        }
        if num_layers == 0 {
            return Err(T2Error::InvalidParameterLayerCount);
        }
        if components
            .iter()
            .any(|c| c.dx == 0 || c.dy == 0 || c.resolutions.is_empty())
        {
            return Err(T2Error::InvalidArgument);
        }

        let mut layer_counters = Vec::new();
        layer_counters
            .try_reserve_exact(components.len())
            .map_err(|_| T2Error::NotEnoughMemory)?;
        for comp in &components {
            let mut per_resolution = Vec::new();
            per_resolution
                .try_reserve_exact(comp.resolutions.len())
                .map_err(|_| T2Error::NotEnoughMemory)?;
            for res in &comp.resolutions {
                let mut counters = Vec::new();
                counters
                    .try_reserve_exact(res.num_precincts())
                    .map_err(|_| T2Error::NotEnoughMemory)?;
                counters.resize(res.num_precincts(), 0);
                per_resolution.push(counters);
            }
            layer_counters.push(per_resolution);
        }

        let max_resolutions = components
            .iter()
            .map(|c| c.resolutions.len())
            .max()
            .unwrap_or(0);
        let default_change =
            ProgressionChange::full(default_order, num_layers, max_resolutions, components.len());

        let mut pi = Self {
            tile,
            num_layers,
            max_resolutions,
            components,
            layer_counters,
            default_change,
            changes: ProgressionChangeList::new(),
            next_change: 0,
            active: None,
            first_visit: true,
            component: 0,
            resolution: 0,
            precinct: 0,
            layer: 0,
            x: 0,
            y: 0,
            x_step: 0,
            y_step: 0,
            position: None,
            packet_number: None,
        };
        pi.init();
        Ok(pi)
    }

    /// Iterator over the packets of `tile`, including its progression changes.
    pub fn for_tile(tile: &J2kTile) -> Result<Self, T2Error> {
        let components = tile
            .components
            .iter()
            .map(|comp| PiComponentInfo {
                dx: comp.dx,
                dy: comp.dy,
                resolutions: comp
                    .resolutions
                    .iter()
                    .map(|res| PiResolutionInfo {
                        precinct_width_exp: res.precinct_width_exp,
                        precinct_height_exp: res.precinct_height_exp,
                        num_precincts_wide: res.num_precincts_wide,
                        num_precincts_high: res.num_precincts_high,
                    })
                    .collect(),
            })
            .collect();
        let mut pi = Self::new(
            tile.rect,
            tile.num_layers,
            components,
            tile.progression_order,
        )?;
        pi.set_progression_changes(tile.progression_changes.clone());
        Ok(pi)
    }

    pub fn set_progression_changes(&mut self, changes: ProgressionChangeList) {
        self.changes = changes;
        self.init();
    }

    pub fn add_progression_change(&mut self, change: ProgressionChange) -> Result<(), T2Error> {
        self.changes.push(change)?;
        self.init();
        Ok(())
    }

    /// Rewind to before the first packet and clear every precinct layer counter.
    pub fn init(&mut self) {
        self.packet_number = None;
        self.position = None;
        self.active = None;
        self.next_change = 0;
        for counters in self.layer_counters.iter_mut().flatten() {
            counters.fill(0);
        }
    }

    /// Position of the packet returned last.
    pub fn position(&self) -> Option<PacketPosition> {
        self.position
    }

    /// Sequence number of the packet returned last, counting from zero.
    pub fn packet_number(&self) -> Option<usize> {
        self.packet_number
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    /// Advance to the next packet. `None` once every progression volume is exhausted.
    pub fn next_packet(&mut self) -> Option<PacketPosition> {
        loop {
            let change = match self.active {
                Some(change) => change,
                None => {
                    let change = if self.next_change < self.changes.len() {
                        *self.changes.get(self.next_change)?
                    } else if self.next_change == self.changes.len() {
                        self.default_change
                    } else {
                        return None;
                    };
                    self.next_change += 1;
                    self.first_visit = true;
                    self.component = 0;
                    self.resolution = 0;
                    self.precinct = 0;
                    self.layer = 0;
                    debug!("progression volume {}: {change}", self.next_change - 1);
                    self.active = Some(change);
                    change
                }
            };

            let found = match change.order {
                ProgressionOrder::Lrcp => self.next_lrcp(&change),
                ProgressionOrder::Rlcp => self.next_rlcp(&change),
                ProgressionOrder::Rpcl => self.next_rpcl(&change),
                ProgressionOrder::Pcrl => self.next_pcrl(&change),
                ProgressionOrder::Cprl => self.next_cprl(&change),
            };
            if found {
                let number = self.packet_number.map_or(0, |n| n + 1);
                self.packet_number = Some(number);
                let position = PacketPosition {
                    component: self.component,
                    resolution: self.resolution,
                    precinct: self.precinct,
                    layer: self.layer,
                };
                trace!("packet {number}: {position:?}");
                self.position = Some(position);
                return Some(position);
            }
            self.active = None;
        }
    }

    fn layer_end(&self, change: &ProgressionChange) -> usize {
        self.num_layers.min(change.layer_end)
    }

    fn resolution_end(&self, change: &ProgressionChange) -> usize {
        self.max_resolutions.min(change.resolution_end)
    }

    fn component_end(&self, change: &ProgressionChange) -> usize {
        self.components.len().min(change.component_end)
    }

    /// Claim `layer` of a precinct if it is the next one the precinct expects.
    fn claim(&mut self, component: usize, resolution: usize, precinct: usize, layer: usize) -> bool {
        let counter = &mut self.layer_counters[component][resolution][precinct];
        if *counter <= layer {
            *counter = layer + 1;
            self.component = component;
            self.resolution = resolution;
            self.precinct = precinct;
            self.layer = layer;
            true
        } else {
            false
        }
    }

    fn next_lrcp(&mut self, change: &ProgressionChange) -> bool {
        let mut resume = !std::mem::replace(&mut self.first_visit, false);
        let layer_start = if resume { self.layer } else { 0 };
        for layer in layer_start..self.layer_end(change) {
            let res_start = if resume { self.resolution } else { change.resolution_start };
            for res in res_start..self.resolution_end(change) {
                let comp_start = if resume { self.component } else { change.component_start };
                for comp in comp_start..self.component_end(change) {
                    let prc_start = if std::mem::take(&mut resume) { self.precinct } else { 0 };
                    let Some(info) = self.components[comp].resolutions.get(res) else {
                        continue;
                    };
                    for prc in prc_start..info.num_precincts() {
                        if self.claim(comp, res, prc, layer) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn next_rlcp(&mut self, change: &ProgressionChange) -> bool {
        let mut resume = !std::mem::replace(&mut self.first_visit, false);
        let res_start = if resume { self.resolution } else { change.resolution_start };
        for res in res_start..self.resolution_end(change) {
            let layer_start = if resume { self.layer } else { 0 };
            for layer in layer_start..self.layer_end(change) {
                let comp_start = if resume { self.component } else { change.component_start };
                for comp in comp_start..self.component_end(change) {
                    let prc_start = if std::mem::take(&mut resume) { self.precinct } else { 0 };
                    let Some(info) = self.components[comp].resolutions.get(res) else {
                        continue;
                    };
                    for prc in prc_start..info.num_precincts() {
                        if self.claim(comp, res, prc, layer) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Smallest precinct extent, on the reference grid, over the given components.
    fn steps(&self, components: std::ops::Range<usize>) -> (u64, u64) {
        let mut x_step = 0u64;
        let mut y_step = 0u64;
        for comp in &self.components[components] {
            let levels = comp.resolutions.len() as u32;
            for (r, res) in comp.resolutions.iter().enumerate() {
                let shift_x = res.precinct_width_exp + levels - r as u32 - 1;
                let shift_y = res.precinct_height_exp + levels - r as u32 - 1;
                let xs = (comp.dx as u64) << shift_x;
                let ys = (comp.dy as u64) << shift_y;
                x_step = if x_step == 0 { xs } else { x_step.min(xs) };
                y_step = if y_step == 0 { ys } else { y_step.min(ys) };
            }
        }
        (x_step, y_step)
    }

    /// Precinct of (component, resolution) whose top-left corner maps to reference grid
    /// position (x, y), if any.
    fn precinct_at(&self, component: usize, resolution: usize, x: u64, y: u64) -> Option<usize> {
        let comp = &self.components[component];
        let info = comp.resolutions.get(resolution)?;
        if info.num_precincts() == 0 {
            return None;
        }
        let r = (comp.resolutions.len() - 1 - resolution) as u32;
        let rpx = r + info.precinct_width_exp;
        let rpy = r + info.precinct_height_exp;
        let hsamp = comp.dx as u64;
        let vsamp = comp.dy as u64;
        let x_start = self.tile.x0 as u64;
        let y_start = self.tile.y0 as u64;
        let trx0 = x_start.div_ceil(hsamp << r);
        let try0 = y_start.div_ceil(vsamp << r);

        let on_column = (x == x_start && (trx0 << r) % (1u64 << rpx) != 0)
            || x % (hsamp << rpx) == 0;
        let on_row = (y == y_start && (try0 << r) % (1u64 << rpy) != 0)
            || y % (vsamp << rpy) == 0;
        if !on_column || !on_row {
            return None;
        }

        let prc_x = (x.div_ceil(hsamp << r) >> info.precinct_width_exp)
            - (trx0 >> info.precinct_width_exp);
        let prc_y = (y.div_ceil(vsamp << r) >> info.precinct_height_exp)
            - (try0 >> info.precinct_height_exp);
        if prc_x >= info.num_precincts_wide as u64 || prc_y >= info.num_precincts_high as u64 {
            return None;
        }
        Some((prc_y * info.num_precincts_wide as u64 + prc_x) as usize)
    }

    fn claim_layers(
        &mut self,
        change: &ProgressionChange,
        layer_start: usize,
        component: usize,
        resolution: usize,
        precinct: usize,
    ) -> bool {
        for layer in layer_start..self.layer_end(change) {
            if self.claim(component, resolution, precinct, layer) {
                return true;
            }
        }
        false
    }

    fn next_rpcl(&mut self, change: &ProgressionChange) -> bool {
        let mut resume = !std::mem::replace(&mut self.first_visit, false);
        if !resume {
            (self.x_step, self.y_step) = self.steps(0..self.components.len());
        }
        let (x_step, y_step) = (self.x_step, self.y_step);
        if x_step == 0 || y_step == 0 {
            return false;
        }
        let (x_start, y_start) = (self.tile.x0 as u64, self.tile.y0 as u64);
        let (x_end, y_end) = (self.tile.x1 as u64, self.tile.y1 as u64);

        let res_start = if resume { self.resolution } else { change.resolution_start };
        for res in res_start..self.resolution_end(change) {
            let mut y = if resume { self.y } else { y_start };
            while y < y_end {
                let mut x = if resume { self.x } else { x_start };
                while x < x_end {
                    let comp_start = if resume { self.component } else { change.component_start };
                    for comp in comp_start..self.component_end(change) {
                        let layer_start = if std::mem::take(&mut resume) { self.layer } else { 0 };
                        if let Some(prc) = self.precinct_at(comp, res, x, y) {
                            if self.claim_layers(change, layer_start, comp, res, prc) {
                                (self.x, self.y) = (x, y);
                                return true;
                            }
                        }
                    }
                    x += x_step - x % x_step;
                }
                y += y_step - y % y_step;
            }
        }
        false
    }

    fn next_pcrl(&mut self, change: &ProgressionChange) -> bool {
        let mut resume = !std::mem::replace(&mut self.first_visit, false);
        if !resume {
            (self.x_step, self.y_step) = self.steps(0..self.components.len());
        }
        let (x_step, y_step) = (self.x_step, self.y_step);
        if x_step == 0 || y_step == 0 {
            return false;
        }
        let (x_start, y_start) = (self.tile.x0 as u64, self.tile.y0 as u64);
        let (x_end, y_end) = (self.tile.x1 as u64, self.tile.y1 as u64);

        let mut y = if resume { self.y } else { y_start };
        while y < y_end {
            let mut x = if resume { self.x } else { x_start };
            while x < x_end {
                let comp_start = if resume { self.component } else { change.component_start };
                for comp in comp_start..self.component_end(change) {
                    let res_start = if resume { self.resolution } else { change.resolution_start };
                    let res_end = self.components[comp]
                        .resolutions
                        .len()
                        .min(change.resolution_end);
                    for res in res_start..res_end {
                        let layer_start = if std::mem::take(&mut resume) { self.layer } else { 0 };
                        if let Some(prc) = self.precinct_at(comp, res, x, y) {
                            if self.claim_layers(change, layer_start, comp, res, prc) {
                                (self.x, self.y) = (x, y);
                                return true;
                            }
                        }
                    }
                }
                x += x_step - x % x_step;
            }
            y += y_step - y % y_step;
        }
        false
    }

    fn next_cprl(&mut self, change: &ProgressionChange) -> bool {
        let mut resume = !std::mem::replace(&mut self.first_visit, false);
        let (x_start, y_start) = (self.tile.x0 as u64, self.tile.y0 as u64);
        let (x_end, y_end) = (self.tile.x1 as u64, self.tile.y1 as u64);

        let comp_start = if resume { self.component } else { change.component_start };
        for comp in comp_start..self.component_end(change) {
            // Steps only depend on this component.
            let (x_step, y_step) = self.steps(comp..comp + 1);
            (self.x_step, self.y_step) = (x_step, y_step);
            if x_step == 0 || y_step == 0 {
                resume = false;
                continue;
            }
            let mut y = if resume { self.y } else { y_start };
            while y < y_end {
                let mut x = if resume { self.x } else { x_start };
                while x < x_end {
                    let res_start = if resume { self.resolution } else { change.resolution_start };
                    let res_end = self.components[comp]
                        .resolutions
                        .len()
                        .min(change.resolution_end);
                    for res in res_start..res_end {
                        let layer_start = if std::mem::take(&mut resume) { self.layer } else { 0 };
                        if let Some(prc) = self.precinct_at(comp, res, x, y) {
                            if self.claim_layers(change, layer_start, comp, res, prc) {
                                (self.x, self.y) = (x, y);
                                return true;
                            }
                        }
                    }
                    x += x_step - x % x_step;
                }
                y += y_step - y % y_step;
            }
        }
        false
    }
}

impl Iterator for PacketIterator {
    type Item = PacketPosition;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet()
    }
}
