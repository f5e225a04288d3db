//! Packet encoder (B.9, B.10).
//!
//! Turns the coding passes of every code-block of a tile into packets, in the order given
//! by the tile's progression. Passes are sent in the layer they are assigned to; the layer
//! assignment itself comes from the caller or from [`Tier2Encoder::allocate_layers`].

use log::{debug, trace, warn};

use crate::constants::INITIAL_LENGTH_BITS;
use crate::error::T2Error;
use crate::j2k_marker_code::{J2kMarkerCode, SOP_SEGMENT_LENGTH};
use crate::jpeg2000::bit_io::J2kBitWriter;
use crate::jpeg2000::image::{J2kCodeBlock, J2kPrecinct, J2kTile};
use crate::jpeg2000::packet::{bit_length, floor_log2, write_comma_code, write_num_passes};
use crate::jpeg2000::packet_iterator::{PacketIterator, PacketPosition};
use crate::jpeg2000::tag_tree::TagTree;

/// Coding state of a tile, captured before a trial encoding.
#[derive(Debug, Clone)]
pub struct Tier2Snapshot {
    trees: Vec<Option<(TagTree, TagTree)>>,
    codeblocks: Vec<CodeBlockCursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeBlockCursor {
    current_pass: Option<usize>,
    num_passes_included: usize,
    num_len_bits: u32,
}

pub struct Tier2Encoder {
    pub(crate) tile: J2kTile,
}

impl Tier2Encoder {
    /// Wrap `tile`, whose code-blocks already hold their coding passes, and initialise the
    /// coding state keeping the current pass to layer assignment.
    pub fn new(tile: J2kTile) -> Result<Self, T2Error> {
        let mut encoder = Self { tile };
        encoder.init_state(false)?;
        Ok(encoder)
    }

    pub fn tile(&self) -> &J2kTile {
        &self.tile
    }

    pub fn tile_mut(&mut self) -> &mut J2kTile {
        &mut self.tile
    }

    pub fn into_tile(self) -> J2kTile {
        self.tile
    }

    /// Reset the tag trees and rewind every code-block to its first pass.
    ///
    /// With `reset_layers` every pass is also removed from its layer.
    pub fn init_state(&mut self, reset_layers: bool) -> Result<(), T2Error> {
        let subbands = self
            .tile
            .components
            .iter_mut()
            .flat_map(|c| c.resolutions.iter_mut())
            .flat_map(|r| r.subbands.iter_mut());
        for band in subbands {
            let band_bitplanes = band.num_bitplanes;
            for prc in band.precincts.iter_mut() {
                let J2kPrecinct {
                    codeblocks,
                    inclusion_tree,
                    imsb_tree,
                    ..
                } = prc;
                if let Some(tree) = inclusion_tree.as_mut() {
                    tree.reset();
                }
                if let Some(tree) = imsb_tree.as_mut() {
                    tree.reset();
                }
                for (leaf, cblk) in codeblocks.iter_mut().enumerate() {
                    cblk.current_pass = if cblk.passes.is_empty() { None } else { Some(0) };
                    cblk.num_passes_included = 0;
                    cblk.num_len_bits = INITIAL_LENGTH_BITS;
                    cblk.num_imsbs = band_bitplanes
                        .checked_sub(cblk.num_bitplanes)
                        .ok_or(T2Error::InvalidArgument)?;
                    if let Some(tree) = imsb_tree.as_mut() {
                        tree.set_value(leaf, cblk.num_imsbs)?;
                    }
                    if reset_layers {
                        for pass in cblk.passes.iter_mut() {
                            pass.layer = None;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn save_state(&self) -> Tier2Snapshot {
        let trees = self
            .tile
            .precincts()
            .map(|prc| match (&prc.inclusion_tree, &prc.imsb_tree) {
                (Some(incl), Some(imsb)) => Some((incl.clone(), imsb.clone())),
                _ => None,
            })
            .collect();
        let codeblocks = self
            .tile
            .codeblocks()
            .map(|cblk| CodeBlockCursor {
                current_pass: cblk.current_pass,
                num_passes_included: cblk.num_passes_included,
                num_len_bits: cblk.num_len_bits,
            })
            .collect();
        Tier2Snapshot { trees, codeblocks }
    }

    pub fn restore_state(&mut self, snapshot: &Tier2Snapshot) -> Result<(), T2Error> {
        let mut saved_trees = snapshot.trees.iter();
        for prc in self.tile.precincts_mut() {
            let saved = saved_trees.next().ok_or(T2Error::InvalidArgument)?;
            match (saved, prc.inclusion_tree.as_mut(), prc.imsb_tree.as_mut()) {
                (Some((incl, imsb)), Some(incl_dst), Some(imsb_dst)) => {
                    incl_dst.copy_from(incl)?;
                    imsb_dst.copy_from(imsb)?;
                }
                (None, None, None) => {}
                _ => return Err(T2Error::TagTreeSizeMismatch),
            }
        }

        let mut saved_cursors = snapshot.codeblocks.iter();
        for cblk in self.tile.codeblocks_mut() {
            let cursor = saved_cursors.next().ok_or(T2Error::InvalidArgument)?;
            cblk.current_pass = cursor.current_pass;
            cblk.num_passes_included = cursor.num_passes_included;
            cblk.num_len_bits = cursor.num_len_bits;
        }
        if saved_trees.next().is_some() || saved_cursors.next().is_some() {
            return Err(T2Error::InvalidArgument);
        }
        Ok(())
    }

    /// Encode every packet of the tile in progression order.
    ///
    /// Packet headers go to `headers` when given (packed headers, PPM/PPT), otherwise
    /// they are written in front of their bodies in `out`. Returns the packet count.
    ///
    /// Fails with `InvalidOperation` when a code-block is left with passes assigned to a
    /// layer that no packet carried: a layer beyond `num_layers`, or a precinct that the
    /// position-driven orders never reach with non power-of-two sub-sampling.
    pub fn encode_packets(
        &mut self,
        out: &mut J2kBitWriter,
        mut headers: Option<&mut J2kBitWriter>,
    ) -> Result<usize, T2Error> {
        let mut pi = PacketIterator::for_tile(&self.tile)?;
        let mut count = 0;
        while let Some(position) = pi.next_packet() {
            let sequence = pi.packet_number().unwrap_or(0);
            self.encode_packet(out, headers.as_deref_mut(), position, sequence)?;
            count += 1;
        }
        // Passes the progression never reached would be lost from the code-stream.
        if let Some(index) = self
            .tile
            .codeblocks()
            .position(|cblk| cblk.pending_layer().is_some())
        {
            warn!(
                "tile {}: code-block {index} still holds passes after the last packet",
                self.tile.index
            );
            return Err(T2Error::InvalidOperation);
        }
        debug!(
            "tile {}: {count} packets, {} bytes",
            self.tile.index,
            out.len()
        );
        Ok(count)
    }

    /// Encode the packets of one layer only, in progression order.
    pub(crate) fn encode_layer(&mut self, layer: usize, out: &mut J2kBitWriter) -> Result<(), T2Error> {
        let mut pi = PacketIterator::for_tile(&self.tile)?;
        while let Some(position) = pi.next_packet() {
            if position.layer == layer {
                let sequence = pi.packet_number().unwrap_or(0);
                self.encode_packet(out, None, position, sequence)?;
            }
        }
        Ok(())
    }

    /// Encode the packet at `position`: optional SOP, header, optional EPH, body.
    pub fn encode_packet(
        &mut self,
        out: &mut J2kBitWriter,
        packed: Option<&mut J2kBitWriter>,
        position: PacketPosition,
        sequence: usize,
    ) -> Result<(), T2Error> {
        let style = self.tile.coding_style;
        let layer = position.layer;
        let resolution = self
            .tile
            .components
            .get_mut(position.component)
            .and_then(|c| c.resolutions.get_mut(position.resolution))
            .ok_or(T2Error::InvalidIndex)?;

        let start = out.len();
        if style.use_sop {
            out.write_u16(J2kMarkerCode::StartOfPacket.code())?;
            out.write_u16(SOP_SEGMENT_LENGTH)?;
            out.write_u16((sequence & 0xFFFF) as u16)?;
        }

        let header: &mut J2kBitWriter = match packed {
            Some(writer) => writer,
            None => &mut *out,
        };
        // Packets are never signalled empty; code-blocks simply report no inclusion.
        header.write_bit(1)?;
        for band in resolution.subbands.iter_mut() {
            let prc = band
                .precincts
                .get_mut(position.precinct)
                .ok_or(T2Error::InvalidIndex)?;
            encode_precinct_header(header, prc, layer)?;
        }
        header.align()?;
        if style.use_eph {
            header.write_u16(J2kMarkerCode::EndOfPacketHeader.code())?;
        }

        for band in resolution.subbands.iter_mut() {
            let prc = band
                .precincts
                .get_mut(position.precinct)
                .ok_or(T2Error::InvalidIndex)?;
            for cblk in prc.codeblocks.iter_mut() {
                write_body(out, cblk, layer)?;
            }
        }

        trace!(
            "packet {sequence} {position:?}: {} bytes in body stream",
            out.len() - start
        );
        Ok(())
    }
}

/// Index one past the last pass of `cblk` sent in `layer`, starting from `start`.
fn layer_end(cblk: &J2kCodeBlock, start: usize, layer: usize) -> usize {
    cblk.passes[start..]
        .iter()
        .position(|pass| pass.layer != Some(layer))
        .map_or(cblk.passes.len(), |n| start + n)
}

fn encode_precinct_header(
    header: &mut J2kBitWriter,
    prc: &mut J2kPrecinct,
    layer: usize,
) -> Result<(), T2Error> {
    let J2kPrecinct {
        codeblocks,
        inclusion_tree,
        imsb_tree,
        ..
    } = prc;
    let (Some(incl), Some(imsb)) = (inclusion_tree.as_mut(), imsb_tree.as_mut()) else {
        return Ok(());
    };

    for (leaf, cblk) in codeblocks.iter().enumerate() {
        if layer == 0 {
            imsb.set_value(leaf, cblk.num_imsbs)?;
        }
        if cblk.num_passes_included == 0 && cblk.pending_layer() == Some(layer) {
            incl.set_value(leaf, layer as u32)?;
        }
    }

    for (leaf, cblk) in codeblocks.iter_mut().enumerate() {
        let included = cblk.pending_layer() == Some(layer);
        if cblk.num_passes_included == 0 {
            incl.encode(header, leaf, layer as u32 + 1)?;
        } else {
            header.write_bit(included as u8)?;
        }
        let (true, Some(start)) = (included, cblk.current_pass) else {
            continue;
        };

        if cblk.num_passes_included == 0 {
            let mut threshold = 1;
            while !imsb.encode(header, leaf, threshold)? {
                threshold += 1;
            }
        }

        let end = layer_end(cblk, start, layer);
        write_num_passes(header, end - start)?;

        // Lengths of the terminated runs of passes, plus the run ending the layer.
        let mut runs = Vec::new();
        let mut run_start = start;
        let mut offset = cblk.passes[start].start;
        for k in start..end {
            let pass = &cblk.passes[k];
            if pass.terminated || k + 1 == end {
                let len = pass.end.checked_sub(offset).ok_or(T2Error::InvalidArgument)?;
                runs.push((k + 1 - run_start, len));
                run_start = k + 1;
                offset = pass.end;
            }
        }

        let mut increment = 0;
        for &(count, len) in &runs {
            let available = cblk.num_len_bits + floor_log2(count);
            increment = increment.max(bit_length(len).saturating_sub(available));
        }
        write_comma_code(header, increment)?;
        cblk.num_len_bits += increment;

        for &(count, len) in &runs {
            let width = cblk.num_len_bits + floor_log2(count);
            if width > 32 {
                return Err(T2Error::LengthFieldOverflow);
            }
            header.write_bits(len as u32, width)?;
        }
    }
    Ok(())
}

fn write_body(out: &mut J2kBitWriter, cblk: &mut J2kCodeBlock, layer: usize) -> Result<(), T2Error> {
    let Some(start) = cblk.current_pass else {
        return Ok(());
    };
    if cblk.passes[start].layer != Some(layer) {
        return Ok(());
    }
    let end = layer_end(cblk, start, layer);
    let from = cblk.passes[start].start;
    let to = cblk.passes[end - 1].end;
    let bytes = cblk.data.get(from..to).ok_or(T2Error::InvalidArgument)?;
    out.write_bytes(bytes)?;

    cblk.current_pass = (end < cblk.passes.len()).then_some(end);
    cblk.num_passes_included += end - start;
    Ok(())
}
