use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum T2Error {
    #[error("Not enough memory")]
    NotEnoughMemory = 1,
    #[error("End of stream")]
    EndOfStream = 2,
    #[error("Invalid data")]
    InvalidData = 3,
    #[error("Too many coding passes for one packet contribution")]
    TooManyPasses = 4,
    #[error("Invalid progression order")]
    InvalidProgressionOrder = 5,
    #[error("Invalid progression change")]
    InvalidProgressionChange = 6,
    #[error("Tag tree leaf index out of range")]
    InvalidTagTreeLeaf = 7,
    #[error("Tag tree dimensions do not match")]
    TagTreeSizeMismatch = 8,
    #[error("Start of packet marker sequence error")]
    StartOfPacketMarkerInvalid = 9,
    #[error("End of packet header marker not found")]
    EndOfPacketHeaderMarkerNotFound = 10,
    #[error("Packet length field too wide")]
    LengthFieldOverflow = 11,

    // Parameter errors
    #[error("Invalid parameter tile size")]
    InvalidParameterTileSize = 20,
    #[error("Invalid parameter component count")]
    InvalidParameterComponentCount = 21,
    #[error("Invalid parameter sub-sampling")]
    InvalidParameterSubsampling = 22,
    #[error("Invalid parameter decomposition levels")]
    InvalidParameterDecompositionLevels = 23,
    #[error("Invalid parameter precinct size")]
    InvalidParameterPrecinctSize = 24,
    #[error("Invalid parameter code-block size")]
    InvalidParameterCodeBlockSize = 25,
    #[error("Invalid parameter layer count")]
    InvalidParameterLayerCount = 26,

    // Logic errors
    #[error("Invalid operation")]
    InvalidOperation = 100,
    #[error("Invalid argument")]
    InvalidArgument = 101,
    #[error("Invalid index")]
    InvalidIndex = 102,
}
