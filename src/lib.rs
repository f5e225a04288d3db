//! JPEG 2000 Tier-2 coding engine.
//!
//! Tag trees, progression-order packet iteration and the packet header and body coding
//! that carries code-block coding passes in and out of a JPEG 2000 code-stream.

pub mod constants;
pub mod error;
pub mod j2k_marker_code;
pub mod jpeg2000;

pub use error::T2Error;
pub use jpeg2000::bit_io::{J2kBitReader, J2kBitWriter};
pub use jpeg2000::decoder::Tier2Decoder;
pub use jpeg2000::encoder::{Tier2Encoder, Tier2Snapshot};
pub use jpeg2000::image::{
    CodeBlockSegment, CodeBlockStyle, CodingPass, CodingStyle, ComponentParams, J2kTile,
    SegmentKind, TileParams,
};
pub use jpeg2000::packet_iterator::{PacketIterator, PacketPosition, PiComponentInfo, PiResolutionInfo};
pub use jpeg2000::progression::{ProgressionChange, ProgressionChangeList, ProgressionOrder};
pub use jpeg2000::tag_tree::TagTree;
