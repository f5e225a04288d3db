//! Tile structure seen by Tier-2 coding.
//!
//! A tile is split into components, resolution levels, sub-bands, precincts and
//! code-blocks following ISO/IEC 15444-1 Annex B. The geometry is computed once when the
//! tile is built; the Tier-2 encoder and decoder then only mutate the coding state held in
//! precincts (tag trees) and code-blocks (pass cursors, segments).

use log::debug;

use crate::constants::{
    DEFAULT_PRECINCT_EXPONENT, INITIAL_LENGTH_BITS, MAXIMUM_CODEBLOCK_AREA_EXPONENT,
    MAXIMUM_CODEBLOCK_EXPONENT, MAXIMUM_DECOMPOSITION_LEVELS, MAXIMUM_LAYER_COUNT,
    MAXIMUM_PRECINCT_EXPONENT, MAXIMUM_SUBSAMPLING, MINIMUM_CODEBLOCK_EXPONENT,
    MINIMUM_SUBSAMPLING,
};
use crate::error::T2Error;
use crate::jpeg2000::progression::{ProgressionChangeList, ProgressionOrder};
use crate::jpeg2000::tag_tree::TagTree;

/// Scod flags of the COD marker that affect packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodingStyle {
    /// SOP marker segments may precede packets.
    pub use_sop: bool,
    /// EPH markers follow packet headers.
    pub use_eph: bool,
}

impl CodingStyle {
    pub fn from_scod(scod: u8) -> Self {
        Self {
            use_sop: (scod & 0x02) != 0,
            use_eph: (scod & 0x04) != 0,
        }
    }

    pub fn to_scod(self) -> u8 {
        (if self.use_sop { 0x02 } else { 0 }) | (if self.use_eph { 0x04 } else { 0 })
    }
}

/// Code-block style flags (SPcod/SPcoc) that change how passes form codeword segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeBlockStyle {
    /// Selective arithmetic coding bypass.
    pub bypass: bool,
    /// Termination on each coding pass.
    pub terminate_all: bool,
}

impl CodeBlockStyle {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            bypass: (bits & 0x01) != 0,
            terminate_all: (bits & 0x04) != 0,
        }
    }

    pub fn to_bits(self) -> u8 {
        (if self.bypass { 0x01 } else { 0 }) | (if self.terminate_all { 0x04 } else { 0 })
    }
}

/// Per-component coding parameters (SIZ sub-sampling plus COD/COC fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentParams {
    /// Horizontal sub-sampling factor XRsiz.
    pub dx: u32,
    /// Vertical sub-sampling factor YRsiz.
    pub dy: u32,
    pub decomposition_levels: u32,
    /// log2 of the nominal code-block width.
    pub codeblock_width_exp: u32,
    /// log2 of the nominal code-block height.
    pub codeblock_height_exp: u32,
    /// (PPx, PPy) per resolution level, lowest first. Missing entries default to 15.
    pub precinct_exps: Vec<(u32, u32)>,
    pub codeblock_style: CodeBlockStyle,
}

impl Default for ComponentParams {
    fn default() -> Self {
        Self {
            dx: 1,
            dy: 1,
            decomposition_levels: 5,
            codeblock_width_exp: 6,
            codeblock_height_exp: 6,
            precinct_exps: Vec::new(),
            codeblock_style: CodeBlockStyle::default(),
        }
    }
}

impl ComponentParams {
    pub fn precinct_exp(&self, resolution: usize) -> (u32, u32) {
        self.precinct_exps
            .get(resolution)
            .copied()
            .unwrap_or((DEFAULT_PRECINCT_EXPONENT, DEFAULT_PRECINCT_EXPONENT))
    }
}

/// Parameters of one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileParams {
    pub index: u32,
    /// Tile area on the reference grid: [x0, x1) x [y0, y1).
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub num_layers: usize,
    pub progression_order: ProgressionOrder,
    pub progression_changes: ProgressionChangeList,
    pub coding_style: CodingStyle,
    pub components: Vec<ComponentParams>,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            index: 0,
            x0: 0,
            y0: 0,
            x1: 0,
            y1: 0,
            num_layers: 1,
            progression_order: ProgressionOrder::Lrcp,
            progression_changes: ProgressionChangeList::new(),
            coding_style: CodingStyle::default(),
            components: vec![ComponentParams::default()],
        }
    }
}

/// A rectangle [x0, x1) x [y0, y1) in the coordinate system of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }
}

pub(crate) fn ceil_div(a: u32, b: u32) -> u32 {
    a.div_ceil(b)
}

pub(crate) fn ceil_div_pow2(a: u32, e: u32) -> u32 {
    ((a as u64 + (1u64 << e) - 1) >> e) as u32
}

pub(crate) fn floor_div_pow2(a: u32, e: u32) -> u32 {
    ((a as u64) >> e) as u32
}

/// ceil((a - offset) / 2^e) where the numerator may be negative.
fn ceil_div_pow2_offset(a: u32, offset: u64, e: u32) -> u32 {
    let num = a as i64 - offset as i64;
    let d = 1i64 << e;
    (-((-num).div_euclid(d))) as u32
}

/// A single tile with its full decomposition.
#[derive(Debug, Clone)]
pub struct J2kTile {
    pub index: u32,
    /// Tile area on the reference grid.
    pub rect: Rect,
    pub num_layers: usize,
    pub progression_order: ProgressionOrder,
    pub progression_changes: ProgressionChangeList,
    pub coding_style: CodingStyle,
    pub components: Vec<J2kTileComponent>,
}

/// Component data specific to a single tile.
#[derive(Debug, Clone)]
pub struct J2kTileComponent {
    pub component_index: usize,
    pub dx: u32,
    pub dy: u32,
    /// Tile-component area in component coordinates.
    pub rect: Rect,
    pub codeblock_style: CodeBlockStyle,
    /// Resolution levels, lowest (LL only) first.
    pub resolutions: Vec<J2kResolution>,
}

/// A specific resolution level in the DWT decomposition.
#[derive(Debug, Clone)]
pub struct J2kResolution {
    /// Resolution level index r, 0 is the lowest resolution.
    pub level: usize,
    pub rect: Rect,
    pub precinct_width_exp: u32,
    pub precinct_height_exp: u32,
    pub num_precincts_wide: u32,
    pub num_precincts_high: u32,
    /// Sub-bands: LL for level 0, otherwise HL, LH, HH.
    pub subbands: Vec<J2kSubband>,
}

impl J2kResolution {
    pub fn num_precincts(&self) -> usize {
        self.num_precincts_wide as usize * self.num_precincts_high as usize
    }
}

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL,
    /// High-Low (horizontal details)
    HL,
    /// Low-High (vertical details)
    LH,
    /// High-High (diagonal details)
    HH,
}

impl SubbandOrientation {
    /// (xo_b, yo_b) of equation B-15.
    fn offsets(self) -> (u64, u64) {
        match self {
            SubbandOrientation::LL => (0, 0),
            SubbandOrientation::HL => (1, 0),
            SubbandOrientation::LH => (0, 1),
            SubbandOrientation::HH => (1, 1),
        }
    }
}

/// A frequency subband within a resolution level.
#[derive(Debug, Clone)]
pub struct J2kSubband {
    pub orientation: SubbandOrientation,
    pub rect: Rect,
    /// Number of magnitude bit-planes of the sub-band (Mb), set by quantization.
    pub num_bitplanes: u32,
    /// One entry per precinct of the resolution level, in raster order.
    pub precincts: Vec<J2kPrecinct>,
}

/// The part of a sub-band covered by one precinct.
#[derive(Debug, Clone)]
pub struct J2kPrecinct {
    /// Area in sub-band coordinates, clipped to the sub-band.
    pub rect: Rect,
    pub num_codeblocks_wide: u32,
    pub num_codeblocks_high: u32,
    pub codeblocks: Vec<J2kCodeBlock>,
    /// Layer of first inclusion of each code-block.
    pub inclusion_tree: Option<TagTree>,
    /// Number of insignificant most significant bit-planes of each code-block.
    pub imsb_tree: Option<TagTree>,
}

/// One coding pass produced by Tier-1 coding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodingPass {
    /// Byte offset in the code-block data where the pass starts.
    pub start: usize,
    /// Byte offset one past the last byte needed to decode up to this pass.
    pub end: usize,
    /// Whether the codeword segment is terminated after this pass.
    pub terminated: bool,
    /// Layer the pass is assigned to, `None` when not sent.
    pub layer: Option<usize>,
    /// Rate-distortion slope used for layer formation.
    pub rd_slope: f64,
}

/// Kind of codeword segment: arithmetic coded or raw (bypass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentKind {
    #[default]
    Mq,
    Raw,
}

/// A codeword segment recovered by the packet decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBlockSegment {
    /// Absolute number of the first pass in the segment.
    pub first_pass: usize,
    pub num_passes: usize,
    pub max_passes: usize,
    /// Last layer that contributed to the segment.
    pub layer: usize,
    pub kind: SegmentKind,
    pub data: Vec<u8>,
    /// Bytes announced by the current packet header but not read yet.
    pub(crate) pending_len: usize,
}

/// A core unit of compressed data in J2K.
#[derive(Debug, Clone, Default)]
pub struct J2kCodeBlock {
    /// Area in sub-band coordinates.
    pub rect: Rect,

    // Tier-1 output consumed by the encoder.
    /// Compressed bytes of all passes.
    pub data: Vec<u8>,
    pub passes: Vec<CodingPass>,
    /// Number of magnitude bit-planes actually coded.
    pub num_bitplanes: u32,

    /// Number of leading insignificant bit-planes relative to the sub-band.
    pub num_imsbs: u32,
    /// Lblock: base width of the length fields.
    pub num_len_bits: u32,
    /// Passes signalled so far in packets (sent by the encoder, received by the decoder).
    pub num_passes_included: usize,

    // Encoder cursor.
    pub(crate) current_pass: Option<usize>,

    // Decoder output.
    /// Absolute number of the first coded pass (3 * num_imsbs).
    pub first_pass: usize,
    pub segments: Vec<CodeBlockSegment>,
    pub(crate) current_segment: usize,
}

impl J2kCodeBlock {
    fn new(rect: Rect) -> Self {
        Self {
            rect,
            num_len_bits: INITIAL_LENGTH_BITS,
            ..Self::default()
        }
    }

    /// Layer of the next pass waiting to be sent.
    pub fn pending_layer(&self) -> Option<usize> {
        self.current_pass
            .and_then(|i| self.passes.get(i))
            .and_then(|pass| pass.layer)
    }

    /// Concatenated data of all decoded segments.
    pub fn segment_data(&self) -> Vec<u8> {
        self.segments
            .iter()
            .flat_map(|seg| seg.data.iter().copied())
            .collect()
    }
}

fn validate_component(params: &ComponentParams) -> Result<(), T2Error> {
    let sampling = MINIMUM_SUBSAMPLING..=MAXIMUM_SUBSAMPLING;
    if !sampling.contains(&params.dx) || !sampling.contains(&params.dy) {
        return Err(T2Error::InvalidParameterSubsampling);
    }
    if params.decomposition_levels > MAXIMUM_DECOMPOSITION_LEVELS {
        return Err(T2Error::InvalidParameterDecompositionLevels);
    }
    let cb = MINIMUM_CODEBLOCK_EXPONENT..=MAXIMUM_CODEBLOCK_EXPONENT;
    if !cb.contains(&params.codeblock_width_exp)
        || !cb.contains(&params.codeblock_height_exp)
        || params.codeblock_width_exp + params.codeblock_height_exp
            > MAXIMUM_CODEBLOCK_AREA_EXPONENT
    {
        return Err(T2Error::InvalidParameterCodeBlockSize);
    }
    for r in 0..=params.decomposition_levels as usize {
        let (ppx, ppy) = params.precinct_exp(r);
        if ppx > MAXIMUM_PRECINCT_EXPONENT || ppy > MAXIMUM_PRECINCT_EXPONENT {
            return Err(T2Error::InvalidParameterPrecinctSize);
        }
        // Above the lowest level the precinct is split over sub-bands of half its size.
        if r > 0 && (ppx == 0 || ppy == 0) {
            return Err(T2Error::InvalidParameterPrecinctSize);
        }
    }
    Ok(())
}

impl J2kTile {
    pub fn new(params: &TileParams) -> Result<Self, T2Error> {
        let rect = Rect::new(params.x0, params.y0, params.x1, params.y1);
        if rect.is_empty() {
            return Err(T2Error::InvalidParameterTileSize);
        }
        if params.components.is_empty() {
            return Err(T2Error::InvalidParameterComponentCount);
        }
        if params.num_layers == 0 || params.num_layers > MAXIMUM_LAYER_COUNT {
            return Err(T2Error::InvalidParameterLayerCount);
        }

        let mut components = Vec::with_capacity(params.components.len());
        for (component_index, cp) in params.components.iter().enumerate() {
            validate_component(cp)?;
            components.push(Self::build_component(component_index, &rect, cp)?);
        }

        debug!(
            "tile {}: {}x{} at ({}, {}), {} components, {} layers, {}",
            params.index,
            rect.width(),
            rect.height(),
            rect.x0,
            rect.y0,
            components.len(),
            params.num_layers,
            params.progression_order
        );

        Ok(Self {
            index: params.index,
            rect,
            num_layers: params.num_layers,
            progression_order: params.progression_order,
            progression_changes: params.progression_changes.clone(),
            coding_style: params.coding_style,
            components,
        })
    }

    fn build_component(
        component_index: usize,
        tile: &Rect,
        cp: &ComponentParams,
    ) -> Result<J2kTileComponent, T2Error> {
        // B-12: tile-component area.
        let rect = Rect::new(
            ceil_div(tile.x0, cp.dx),
            ceil_div(tile.y0, cp.dy),
            ceil_div(tile.x1, cp.dx),
            ceil_div(tile.y1, cp.dy),
        );
        let nl = cp.decomposition_levels;

        let mut resolutions = Vec::with_capacity(nl as usize + 1);
        for level in 0..=nl {
            resolutions.push(Self::build_resolution(level as usize, nl, &rect, cp)?);
        }

        Ok(J2kTileComponent {
            component_index,
            dx: cp.dx,
            dy: cp.dy,
            rect,
            codeblock_style: cp.codeblock_style,
            resolutions,
        })
    }

    fn build_resolution(
        level: usize,
        nl: u32,
        comp: &Rect,
        cp: &ComponentParams,
    ) -> Result<J2kResolution, T2Error> {
        // B-14: resolution area.
        let shift = nl - level as u32;
        let rect = Rect::new(
            ceil_div_pow2(comp.x0, shift),
            ceil_div_pow2(comp.y0, shift),
            ceil_div_pow2(comp.x1, shift),
            ceil_div_pow2(comp.y1, shift),
        );
        let (ppx, ppy) = cp.precinct_exp(level);

        // B-16: precinct grid of the resolution level.
        let (num_wide, num_high) = if rect.is_empty() {
            (0, 0)
        } else {
            (
                ceil_div_pow2(rect.x1, ppx) - floor_div_pow2(rect.x0, ppx),
                ceil_div_pow2(rect.y1, ppy) - floor_div_pow2(rect.y0, ppy),
            )
        };

        let orientations: &[SubbandOrientation] = if level == 0 {
            &[SubbandOrientation::LL]
        } else {
            &[
                SubbandOrientation::HL,
                SubbandOrientation::LH,
                SubbandOrientation::HH,
            ]
        };

        // Precinct and code-block partition expressed in sub-band coordinates.
        let half = if level == 0 { 0 } else { 1 };
        let grid_x0 = floor_div_pow2(rect.x0, ppx) << ppx;
        let grid_y0 = floor_div_pow2(rect.y0, ppy) << ppy;
        let band_grid_x0 = ceil_div_pow2(grid_x0, half);
        let band_grid_y0 = ceil_div_pow2(grid_y0, half);
        let band_ppx = ppx - half;
        let band_ppy = ppy - half;
        let cbw = cp.codeblock_width_exp.min(band_ppx);
        let cbh = cp.codeblock_height_exp.min(band_ppy);

        let mut subbands = Vec::with_capacity(orientations.len());
        for &orientation in orientations {
            // B-15: sub-band area; nb is the decomposition level of the sub-band.
            let nb = if level == 0 { nl } else { nl - level as u32 + 1 };
            let (xo, yo) = orientation.offsets();
            let band_rect = if nb == 0 {
                *comp
            } else {
                let half_step = 1u64 << (nb - 1);
                Rect::new(
                    ceil_div_pow2_offset(comp.x0, half_step * xo, nb),
                    ceil_div_pow2_offset(comp.y0, half_step * yo, nb),
                    ceil_div_pow2_offset(comp.x1, half_step * xo, nb),
                    ceil_div_pow2_offset(comp.y1, half_step * yo, nb),
                )
            };

            let mut precincts = Vec::new();
            precincts
                .try_reserve_exact(num_wide as usize * num_high as usize)
                .map_err(|_| T2Error::NotEnoughMemory)?;
            for py in 0..num_high {
                for px in 0..num_wide {
                    let x0 = band_grid_x0 as u64 + ((px as u64) << band_ppx);
                    let y0 = band_grid_y0 as u64 + ((py as u64) << band_ppy);
                    let cell = Rect::new(
                        x0.min(u32::MAX as u64) as u32,
                        y0.min(u32::MAX as u64) as u32,
                        (x0 + (1u64 << band_ppx)).min(u32::MAX as u64) as u32,
                        (y0 + (1u64 << band_ppy)).min(u32::MAX as u64) as u32,
                    );
                    precincts.push(Self::build_precinct(cell.intersect(&band_rect), cbw, cbh)?);
                }
            }

            subbands.push(J2kSubband {
                orientation,
                rect: band_rect,
                num_bitplanes: 0,
                precincts,
            });
        }

        Ok(J2kResolution {
            level,
            rect,
            precinct_width_exp: ppx,
            precinct_height_exp: ppy,
            num_precincts_wide: num_wide,
            num_precincts_high: num_high,
            subbands,
        })
    }

    fn build_precinct(rect: Rect, cbw: u32, cbh: u32) -> Result<J2kPrecinct, T2Error> {
        if rect.is_empty() {
            return Ok(J2kPrecinct {
                rect,
                num_codeblocks_wide: 0,
                num_codeblocks_high: 0,
                codeblocks: Vec::new(),
                inclusion_tree: None,
                imsb_tree: None,
            });
        }

        let cb_x0 = floor_div_pow2(rect.x0, cbw) << cbw;
        let cb_y0 = floor_div_pow2(rect.y0, cbh) << cbh;
        let num_wide = ceil_div_pow2(rect.x1, cbw) - floor_div_pow2(rect.x0, cbw);
        let num_high = ceil_div_pow2(rect.y1, cbh) - floor_div_pow2(rect.y0, cbh);

        let mut codeblocks = Vec::new();
        codeblocks
            .try_reserve_exact(num_wide as usize * num_high as usize)
            .map_err(|_| T2Error::NotEnoughMemory)?;
        for j in 0..num_high {
            for i in 0..num_wide {
                let x0 = cb_x0 + (i << cbw);
                let y0 = cb_y0 + (j << cbh);
                let cell = Rect::new(x0, y0, x0 + (1 << cbw), y0 + (1 << cbh));
                codeblocks.push(J2kCodeBlock::new(cell.intersect(&rect)));
            }
        }

        let inclusion_tree = TagTree::new(num_wide as usize, num_high as usize)?;
        let imsb_tree = TagTree::new(num_wide as usize, num_high as usize)?;

        Ok(J2kPrecinct {
            rect,
            num_codeblocks_wide: num_wide,
            num_codeblocks_high: num_high,
            codeblocks,
            inclusion_tree: Some(inclusion_tree),
            imsb_tree: Some(imsb_tree),
        })
    }

    pub fn num_resolutions_max(&self) -> usize {
        self.components
            .iter()
            .map(|c| c.resolutions.len())
            .max()
            .unwrap_or(0)
    }

    /// Number of packets in the tile: precincts x layers summed over all resolution levels.
    pub fn num_packets(&self) -> usize {
        self.components
            .iter()
            .flat_map(|c| c.resolutions.iter())
            .map(|r| r.num_precincts() * self.num_layers)
            .sum()
    }

    pub fn precincts(&self) -> impl Iterator<Item = &J2kPrecinct> + '_ {
        self.components
            .iter()
            .flat_map(|c| c.resolutions.iter())
            .flat_map(|r| r.subbands.iter())
            .flat_map(|b| b.precincts.iter())
    }

    pub fn precincts_mut(&mut self) -> impl Iterator<Item = &mut J2kPrecinct> + '_ {
        self.components
            .iter_mut()
            .flat_map(|c| c.resolutions.iter_mut())
            .flat_map(|r| r.subbands.iter_mut())
            .flat_map(|b| b.precincts.iter_mut())
    }

    pub fn codeblocks(&self) -> impl Iterator<Item = &J2kCodeBlock> + '_ {
        self.components
            .iter()
            .flat_map(|c| c.resolutions.iter())
            .flat_map(|r| r.subbands.iter())
            .flat_map(|b| b.precincts.iter())
            .flat_map(|p| p.codeblocks.iter())
    }

    pub fn codeblocks_mut(&mut self) -> impl Iterator<Item = &mut J2kCodeBlock> + '_ {
        self.components
            .iter_mut()
            .flat_map(|c| c.resolutions.iter_mut())
            .flat_map(|r| r.subbands.iter_mut())
            .flat_map(|b| b.precincts.iter_mut())
            .flat_map(|p| p.codeblocks.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: u32, height: u32, levels: u32, precincts: Vec<(u32, u32)>) -> TileParams {
        TileParams {
            x1: width,
            y1: height,
            components: vec![ComponentParams {
                decomposition_levels: levels,
                codeblock_width_exp: 2,
                codeblock_height_exp: 2,
                precinct_exps: precincts,
                ..ComponentParams::default()
            }],
            ..TileParams::default()
        }
    }

    #[test]
    fn test_resolution_and_subband_sizes() {
        let tile = J2kTile::new(&params(17, 9, 2, Vec::new())).unwrap();
        let comp = &tile.components[0];
        assert_eq!(comp.resolutions.len(), 3);
        assert_eq!(comp.resolutions[0].rect, Rect::new(0, 0, 5, 3));
        assert_eq!(comp.resolutions[1].rect, Rect::new(0, 0, 9, 5));
        assert_eq!(comp.resolutions[2].rect, Rect::new(0, 0, 17, 9));

        // Level 2 bands hold the finest details: HL is floor(17/2) wide.
        let hl = &comp.resolutions[2].subbands[0];
        assert_eq!(hl.orientation, SubbandOrientation::HL);
        assert_eq!(hl.rect, Rect::new(0, 0, 8, 5));
        let lh = &comp.resolutions[2].subbands[1];
        assert_eq!(lh.rect, Rect::new(0, 0, 9, 4));
    }

    #[test]
    fn test_precinct_partition() {
        // 16x16 tile, one level, 8x8 precincts at both levels.
        let tile = J2kTile::new(&params(16, 16, 1, vec![(3, 3), (3, 3)])).unwrap();
        let comp = &tile.components[0];
        let r0 = &comp.resolutions[0];
        assert_eq!((r0.num_precincts_wide, r0.num_precincts_high), (1, 1));
        let r1 = &comp.resolutions[1];
        assert_eq!((r1.num_precincts_wide, r1.num_precincts_high), (2, 2));

        // Each 8x8 precinct of level 1 covers 4x4 of every 8x8 sub-band.
        let hh = &r1.subbands[2];
        assert_eq!(hh.precincts.len(), 4);
        assert_eq!(hh.precincts[3].rect, Rect::new(4, 4, 8, 8));
        assert_eq!(hh.precincts[3].codeblocks.len(), 1);
        assert_eq!(tile.num_packets(), 5);
    }

    #[test]
    fn test_codeblocks_clipped_to_precinct() {
        let tile = J2kTile::new(&params(10, 6, 0, Vec::new())).unwrap();
        let prc = &tile.components[0].resolutions[0].subbands[0].precincts[0];
        assert_eq!((prc.num_codeblocks_wide, prc.num_codeblocks_high), (3, 2));
        assert_eq!(prc.codeblocks[2].rect, Rect::new(8, 0, 10, 4));
        assert_eq!(prc.codeblocks[5].rect, Rect::new(8, 4, 10, 6));
        assert_eq!(prc.inclusion_tree.as_ref().unwrap().num_leaves(), 6);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut p = params(8, 8, 1, vec![(2, 2), (0, 2)]);
        assert_eq!(J2kTile::new(&p).err(), Some(T2Error::InvalidParameterPrecinctSize));
        p.components[0].precinct_exps.clear();
        p.components[0].dx = 0;
        assert_eq!(J2kTile::new(&p).err(), Some(T2Error::InvalidParameterSubsampling));
        p.components[0].dx = 1;
        p.x1 = 0;
        assert_eq!(J2kTile::new(&p).err(), Some(T2Error::InvalidParameterTileSize));
    }

    #[test]
    fn test_style_flags() {
        let style = CodingStyle::from_scod(0x06);
        assert!(style.use_sop && style.use_eph);
        assert_eq!(style.to_scod(), 0x06);
        let cb = CodeBlockStyle::from_bits(0x05);
        assert!(cb.bypass && cb.terminate_all);
        assert_eq!(cb.to_bits(), 0x05);
    }
}
