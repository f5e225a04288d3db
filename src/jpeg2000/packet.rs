//! Packet header primitives (B.10.5 - B.10.7) and the codeword segment rules shared by
//! the packet encoder and decoder.

use crate::constants::{BYPASS_LEADING_PASSES, MAXIMUM_NEW_PASSES, MAXIMUM_PASSES_PER_SEGMENT};
use crate::error::T2Error;
use crate::jpeg2000::bit_io::{J2kBitReader, J2kBitWriter};
use crate::jpeg2000::image::{CodeBlockStyle, SegmentKind};

/// Write the number of new coding passes (Table B.4).
pub fn write_num_passes(writer: &mut J2kBitWriter, n: usize) -> Result<(), T2Error> {
    match n {
        0 => Err(T2Error::InvalidArgument),
        1 => writer.write_bit(0),
        2 => writer.write_bits(0b10, 2),
        3..=5 => writer.write_bits(0xC | (n as u32 - 3), 4),
        6..=36 => writer.write_bits(0x1E0 | (n as u32 - 6), 9),
        37..=MAXIMUM_NEW_PASSES => writer.write_bits(0xFF80 | (n as u32 - 37), 16),
        _ => Err(T2Error::TooManyPasses),
    }
}

pub fn read_num_passes(reader: &mut J2kBitReader) -> Result<usize, T2Error> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let n = reader.read_bits(2)? as usize;
    if n != 3 {
        return Ok(3 + n);
    }
    let n = reader.read_bits(5)? as usize;
    if n != 31 {
        return Ok(6 + n);
    }
    Ok(37 + reader.read_bits(7)? as usize)
}

/// Lblock increment: `n` ones terminated by a zero.
pub fn write_comma_code(writer: &mut J2kBitWriter, n: u32) -> Result<(), T2Error> {
    for _ in 0..n {
        writer.write_bit(1)?;
    }
    writer.write_bit(0)
}

pub fn read_comma_code(reader: &mut J2kBitReader) -> Result<u32, T2Error> {
    let mut n = 0u32;
    while reader.read_bit()? == 1 {
        n += 1;
        // Lengths are at most 32 bits wide.
        if n > 32 {
            return Err(T2Error::LengthFieldOverflow);
        }
    }
    Ok(n)
}

/// floor(log2(n)) for n >= 1.
pub fn floor_log2(n: usize) -> u32 {
    debug_assert!(n > 0, "floor_log2 of zero");
    usize::BITS - 1 - n.max(1).leading_zeros()
}

/// Number of bits needed to represent `n`.
pub fn bit_length(n: usize) -> u32 {
    usize::BITS - n.leading_zeros()
}

/// Kind of a coding pass within a bit-plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    Significance,
    Refinement,
    Cleanup,
}

/// Type of the absolute pass number `passno`. Coding starts with a cleanup pass.
pub fn pass_type(passno: usize) -> PassType {
    match (passno + 2) % 3 {
        0 => PassType::Significance,
        1 => PassType::Refinement,
        _ => PassType::Cleanup,
    }
}

/// Maximum number of passes in the codeword segment that starts with pass `passno`.
pub fn segment_pass_count(passno: usize, first_pass: usize, style: CodeBlockStyle) -> usize {
    if style.terminate_all {
        return 1;
    }
    if style.bypass {
        let offset = passno.saturating_sub(first_pass);
        if offset < BYPASS_LEADING_PASSES {
            BYPASS_LEADING_PASSES - offset
        } else {
            match pass_type(passno) {
                PassType::Significance => 2,
                PassType::Refinement | PassType::Cleanup => 1,
            }
        }
    } else {
        MAXIMUM_PASSES_PER_SEGMENT
    }
}

/// Whether pass `passno` is arithmetic coded or raw.
pub fn segment_kind(passno: usize, first_pass: usize, style: CodeBlockStyle) -> SegmentKind {
    if style.bypass
        && passno >= first_pass + BYPASS_LEADING_PASSES
        && pass_type(passno) != PassType::Cleanup
    {
        SegmentKind::Raw
    } else {
        SegmentKind::Mq
    }
}

/// Whether the codeword segment is terminated after pass `passno`, for a code-block with
/// `num_passes` passes in total.
pub fn is_terminated(
    passno: usize,
    first_pass: usize,
    num_passes: usize,
    style: CodeBlockStyle,
) -> bool {
    passno + 1 >= first_pass + num_passes || segment_pass_count(passno, first_pass, style) <= 1
}
