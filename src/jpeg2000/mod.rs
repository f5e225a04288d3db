//! JPEG 2000 Tier-2 coding (ISO/IEC 15444-1, Annex B)
//!
//! This module contains the packet layer of the JPEG 2000 codec.
//! It is divided into several sub-modules handling different aspects of it:
//!
//! - `bit_io`: Bit-level reading and writing with bit stuffing.
//! - `tag_tree`: Implementation of Tag Trees (used in packet headers).
//! - `progression`: Progression orders and progression order change lists.
//! - `packet_iterator`: Enumeration of packets in progression order.
//! - `image`: Tile, component, resolution, sub-band, precinct and code-block structure.
//! - `packet`: Packet header codes and codeword segment rules.
//! - `encoder` / `decoder`: Packet assembly and parsing.
//! - `rate`: Layer formation under byte budgets.

pub mod bit_io;
pub mod decoder;
pub mod encoder;
pub mod image;
pub mod packet;
pub mod packet_iterator;
pub mod progression;
pub mod rate;
pub mod tag_tree;
