use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Marker codes that can appear inside the packet data of a JPEG 2000 tile.
///
/// Only the in-bitstream markers matter to Tier-2 coding; the main and
/// tile-part header markers are handled by the code-stream layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum J2kMarkerCode {
    /// SOP: Marks the start of a packet, followed by Lsop and Nsop.
    StartOfPacket = 0xFF91,

    /// EPH: Marks the end of a packet header. No payload.
    EndOfPacketHeader = 0xFF92,
}

impl J2kMarkerCode {
    pub fn code(self) -> u16 {
        self.into()
    }
}

/// Lsop: length of the SOP marker segment, excluding the marker itself.
pub const SOP_SEGMENT_LENGTH: u16 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_codes() {
        assert_eq!(J2kMarkerCode::StartOfPacket.code(), 0xFF91);
        assert_eq!(
            J2kMarkerCode::try_from(0xFF92).ok(),
            Some(J2kMarkerCode::EndOfPacketHeader)
        );
        assert!(J2kMarkerCode::try_from(0xFF4F).is_err());
        assert!(J2kMarkerCode::try_from(0xFF90).is_err());
    }
}
