//! Packet decoder.
//!
//! Reads packets in progression order and distributes their bodies into codeword segments
//! of the tile's code-blocks. The packet iterator lives across calls to
//! [`Tier2Decoder::decode_packets`], so the packets of one tile may arrive in several
//! tile-parts.

use log::{debug, trace, warn};

use crate::constants::MAXIMUM_MISSING_BITPLANES;
use crate::error::T2Error;
use crate::j2k_marker_code::{J2kMarkerCode, SOP_SEGMENT_LENGTH};
use crate::jpeg2000::bit_io::J2kBitReader;
use crate::jpeg2000::image::{CodeBlockSegment, CodeBlockStyle, J2kPrecinct, J2kTile};
use crate::jpeg2000::packet::{
    floor_log2, read_comma_code, read_num_passes, segment_kind, segment_pass_count,
};
use crate::jpeg2000::packet_iterator::{PacketIterator, PacketPosition};

pub struct Tier2Decoder {
    tile: J2kTile,
    iterator: PacketIterator,
    packed_headers: Vec<u8>,
    packed_header_position: usize,
    max_packets: Option<usize>,
    num_packets: usize,
}

impl Tier2Decoder {
    pub fn new(tile: J2kTile) -> Result<Self, T2Error> {
        let iterator = PacketIterator::for_tile(&tile)?;
        Ok(Self {
            tile,
            iterator,
            packed_headers: Vec::new(),
            packed_header_position: 0,
            max_packets: None,
            num_packets: 0,
        })
    }

    pub fn tile(&self) -> &J2kTile {
        &self.tile
    }

    pub fn into_tile(self) -> J2kTile {
        self.tile
    }

    /// Stop after `max` packets in total.
    pub fn set_max_packets(&mut self, max: Option<usize>) {
        self.max_packets = max;
    }

    /// Number of packets decoded so far.
    pub fn num_packets(&self) -> usize {
        self.num_packets
    }

    /// Append packed packet headers (PPM or PPT contents) for this tile.
    pub fn add_packed_headers(&mut self, headers: &[u8]) -> Result<(), T2Error> {
        self.packed_headers
            .try_reserve(headers.len())
            .map_err(|_| T2Error::NotEnoughMemory)?;
        self.packed_headers.extend_from_slice(headers);
        Ok(())
    }

    fn has_packed_headers(&self) -> bool {
        !self.packed_headers.is_empty()
    }

    /// Decode the packets held in the data of one tile-part. Returns the bytes consumed.
    pub fn decode_packets(&mut self, data: &[u8]) -> Result<usize, T2Error> {
        let packed = self.has_packed_headers();
        let Self {
            tile,
            iterator,
            packed_headers,
            packed_header_position,
            max_packets,
            num_packets,
        } = self;

        let mut body = J2kBitReader::new(data);
        let mut headers = packed.then(|| J2kBitReader::new(&packed_headers[*packed_header_position..]));

        let start = *num_packets;
        loop {
            if max_packets.is_some_and(|max| *num_packets >= max) {
                break;
            }
            let more_headers = headers.as_ref().is_some_and(|h| h.has_data());
            if !body.has_data() && !more_headers {
                break;
            }
            let Some(position) = iterator.next_packet() else {
                break;
            };
            let sequence = iterator.packet_number().unwrap_or(0);
            decode_packet(tile, &mut body, headers.as_mut(), position, sequence)?;
            *num_packets += 1;
        }

        if let Some(reader) = headers {
            *packed_header_position += reader.position();
        }
        debug!(
            "tile {}: {} packets from {} of {} bytes",
            tile.index,
            *num_packets - start,
            body.position(),
            data.len()
        );
        Ok(body.position())
    }

    /// Decode a single packet at `position` from `body`, with its header taken from
    /// `header` when packed headers are in use.
    pub fn decode_packet<'a>(
        &mut self,
        body: &mut J2kBitReader<'a>,
        header: Option<&mut J2kBitReader<'a>>,
        position: PacketPosition,
        sequence: usize,
    ) -> Result<(), T2Error> {
        decode_packet(&mut self.tile, body, header, position, sequence)
    }
}

fn read_sop(body: &mut J2kBitReader, sequence: usize) -> Result<(), T2Error> {
    if body.peek_u16() != Some(J2kMarkerCode::StartOfPacket.code()) {
        return Ok(());
    }
    body.read_u16()?;
    if body.read_u16()? != SOP_SEGMENT_LENGTH {
        return Err(T2Error::StartOfPacketMarkerInvalid);
    }
    let found = body.read_u16()?;
    let expected = (sequence & 0xFFFF) as u16;
    if found != expected {
        warn!("SOP sequence number {found}, expected {expected}");
    }
    Ok(())
}

fn decode_packet<'a>(
    tile: &mut J2kTile,
    body: &mut J2kBitReader<'a>,
    packed: Option<&mut J2kBitReader<'a>>,
    position: PacketPosition,
    sequence: usize,
) -> Result<(), T2Error> {
    let style = tile.coding_style;
    let layer = position.layer;
    let component = tile
        .components
        .get_mut(position.component)
        .ok_or(T2Error::InvalidIndex)?;
    let cblk_style = component.codeblock_style;
    let resolution = component
        .resolutions
        .get_mut(position.resolution)
        .ok_or(T2Error::InvalidIndex)?;

    let start = body.position();
    if style.use_sop {
        read_sop(body, sequence)?;
    }

    let header: &mut J2kBitReader<'a> = match packed {
        Some(reader) => reader,
        None => &mut *body,
    };
    let present = header.read_bit()? == 1;
    if present {
        for band in resolution.subbands.iter_mut() {
            let prc = band
                .precincts
                .get_mut(position.precinct)
                .ok_or(T2Error::InvalidIndex)?;
            decode_precinct_header(header, prc, layer, cblk_style)?;
        }
    }
    header.align()?;
    if style.use_eph && header.read_u16()? != J2kMarkerCode::EndOfPacketHeader.code() {
        return Err(T2Error::EndOfPacketHeaderMarkerNotFound);
    }

    if present {
        for band in resolution.subbands.iter_mut() {
            let prc = band
                .precincts
                .get_mut(position.precinct)
                .ok_or(T2Error::InvalidIndex)?;
            for cblk in prc.codeblocks.iter_mut() {
                for seg in cblk.segments.iter_mut().skip(cblk.current_segment) {
                    if seg.pending_len > 0 {
                        let bytes = body.read_bytes(seg.pending_len)?;
                        seg.data
                            .try_reserve(bytes.len())
                            .map_err(|_| T2Error::NotEnoughMemory)?;
                        seg.data.extend_from_slice(bytes);
                        seg.pending_len = 0;
                    }
                }
                while cblk
                    .segments
                    .get(cblk.current_segment)
                    .is_some_and(|seg| seg.num_passes >= seg.max_passes)
                {
                    cblk.current_segment += 1;
                }
            }
        }
    }

    trace!(
        "packet {sequence} {position:?}: {} bytes in body stream",
        body.position() - start
    );
    Ok(())
}

fn decode_precinct_header(
    header: &mut J2kBitReader,
    prc: &mut J2kPrecinct,
    layer: usize,
    style: CodeBlockStyle,
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

    for (leaf, cblk) in codeblocks.iter_mut().enumerate() {
        let first_inclusion = cblk.num_passes_included == 0;
        let included = if first_inclusion {
            incl.decode(header, leaf, layer as u32 + 1)?
        } else {
            header.read_bit()? == 1
        };
        if !included {
            continue;
        }

        if first_inclusion {
            let mut threshold = 1;
            while !imsb.decode(header, leaf, threshold)? {
                threshold += 1;
                if threshold > MAXIMUM_MISSING_BITPLANES {
                    return Err(T2Error::InvalidData);
                }
            }
            cblk.num_imsbs = threshold - 1;
            cblk.first_pass = cblk.num_imsbs as usize * 3;
        }

        let mut remaining = read_num_passes(header)?;
        cblk.num_len_bits += read_comma_code(header)?;

        while remaining > 0 {
            let passno = cblk.first_pass + cblk.num_passes_included;
            let open = cblk
                .segments
                .last()
                .is_some_and(|seg| seg.num_passes < seg.max_passes);
            if !open {
                cblk.segments
                    .try_reserve(1)
                    .map_err(|_| T2Error::NotEnoughMemory)?;
                cblk.segments.push(CodeBlockSegment {
                    first_pass: passno,
                    max_passes: segment_pass_count(passno, cblk.first_pass, style),
                    kind: segment_kind(passno, cblk.first_pass, style),
                    ..CodeBlockSegment::default()
                });
            }
            let seg = cblk.segments.last_mut().ok_or(T2Error::InvalidOperation)?;
            let n = remaining.min(seg.max_passes - seg.num_passes);
            let width = cblk.num_len_bits + floor_log2(n);
            if width > 32 {
                return Err(T2Error::LengthFieldOverflow);
            }
            let len = header.read_bits(width)? as usize;

            seg.num_passes += n;
            seg.pending_len += len;
            seg.layer = layer;
            cblk.num_passes_included += n;
            remaining -= n;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::image::{CodingStyle, ComponentParams, SegmentKind, TileParams};

    fn single_block_tile(use_eph: bool) -> J2kTile {
        styled_tile(CodingStyle {
            use_sop: false,
            use_eph,
        })
    }

    fn styled_tile(coding_style: CodingStyle) -> J2kTile {
        let params = TileParams {
            x1: 4,
            y1: 4,
            components: vec![ComponentParams {
                decomposition_levels: 0,
                codeblock_width_exp: 2,
                codeblock_height_exp: 2,
                ..ComponentParams::default()
            }],
            coding_style,
            ..TileParams::default()
        };
        J2kTile::new(&params).unwrap()
    }

    #[test]
    fn test_decode_single_codeblock_packet() {
        // present, inclusion, imsb = 1, one pass, comma 0, length 2, body [0, 1]
        let data = [0b1101_0001, 0b0000_0000, 0, 1];
        let mut decoder = Tier2Decoder::new(single_block_tile(false)).unwrap();
        assert_eq!(decoder.decode_packets(&data).unwrap(), 4);

        let cblk = &decoder.tile().components[0].resolutions[0].subbands[0].precincts[0].codeblocks[0];
        assert_eq!(cblk.num_imsbs, 1);
        assert_eq!(cblk.first_pass, 3);
        assert_eq!(cblk.segments.len(), 1);
        assert_eq!(cblk.segments[0].first_pass, 3);
        assert_eq!(cblk.segments[0].num_passes, 1);
        assert_eq!(cblk.segments[0].kind, SegmentKind::Mq);
        assert_eq!(cblk.segments[0].data, vec![0, 1]);
    }

    #[test]
    fn test_decode_packet_with_packed_header() {
        let headers = [0b1101_0001, 0b0000_0000];
        let body = [7u8, 9];
        let mut decoder = Tier2Decoder::new(single_block_tile(false)).unwrap();
        let mut header_reader = J2kBitReader::new(&headers);
        let mut body_reader = J2kBitReader::new(&body);
        let position = PacketPosition {
            component: 0,
            resolution: 0,
            precinct: 0,
            layer: 0,
        };
        decoder
            .decode_packet(&mut body_reader, Some(&mut header_reader), position, 0)
            .unwrap();
        assert_eq!(header_reader.position(), 2);
        assert_eq!(body_reader.position(), 2);

        let cblk = &decoder.tile().components[0].resolutions[0].subbands[0].precincts[0].codeblocks[0];
        assert_eq!(cblk.segment_data(), vec![7, 9]);
    }

    #[test]
    fn test_empty_packet() {
        let data = [0x00];
        let mut decoder = Tier2Decoder::new(single_block_tile(false)).unwrap();
        assert_eq!(decoder.decode_packets(&data).unwrap(), 1);
        assert_eq!(decoder.num_packets(), 1);
        assert!(decoder.tile().codeblocks().all(|c| c.segments.is_empty()));
    }

    #[test]
    fn test_missing_eph() {
        let data = [0x00, 0x12, 0x34];
        let mut decoder = Tier2Decoder::new(single_block_tile(true)).unwrap();
        assert_eq!(
            decoder.decode_packets(&data),
            Err(T2Error::EndOfPacketHeaderMarkerNotFound)
        );
    }

    #[test]
    fn test_truncated_body() {
        let data = [0b1101_0001, 0b0000_0000, 0];
        let mut decoder = Tier2Decoder::new(single_block_tile(false)).unwrap();
        assert_eq!(decoder.decode_packets(&data), Err(T2Error::EndOfStream));
    }

    #[test]
    fn test_sop_sequence_mismatch_is_tolerated() {
        let style = CodingStyle {
            use_sop: true,
            use_eph: false,
        };
        let data = [0xFF, 0x91, 0x00, 0x04, 0x00, 0x07, 0x00];
        let mut decoder = Tier2Decoder::new(styled_tile(style)).unwrap();
        assert_eq!(decoder.decode_packets(&data).unwrap(), 7);

        let bad_length = [0xFF, 0x91, 0x00, 0x05, 0x00, 0x00, 0x00];
        let mut decoder = Tier2Decoder::new(styled_tile(style)).unwrap();
        assert_eq!(
            decoder.decode_packets(&bad_length),
            Err(T2Error::StartOfPacketMarkerInvalid)
        );
    }

    #[test]
    fn test_max_packets() {
        let data = [0x00, 0x00];
        let mut decoder = Tier2Decoder::new(single_block_tile(false)).unwrap();
        decoder.set_max_packets(Some(0));
        assert_eq!(decoder.decode_packets(&data).unwrap(), 0);
    }
}
