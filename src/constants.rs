// Limits defined in ISO/IEC 15444-1, Annex A (COD/COC/SIZ) and Annex B (packets).
pub const MINIMUM_SUBSAMPLING: u32 = 1;
pub const MAXIMUM_SUBSAMPLING: u32 = 255;
pub const MAXIMUM_DECOMPOSITION_LEVELS: u32 = 32;
pub const MAXIMUM_PRECINCT_EXPONENT: u32 = 15;
pub const DEFAULT_PRECINCT_EXPONENT: u32 = 15;
pub const MINIMUM_CODEBLOCK_EXPONENT: u32 = 2;
pub const MAXIMUM_CODEBLOCK_EXPONENT: u32 = 10;
pub const MAXIMUM_CODEBLOCK_AREA_EXPONENT: u32 = 12;
pub const MAXIMUM_LAYER_COUNT: usize = 65535;

/// Largest number of new coding passes a single packet can signal for one code-block.
pub const MAXIMUM_NEW_PASSES: usize = 164;

/// Initial value of Lblock, the base width of code-block length fields.
pub const INITIAL_LENGTH_BITS: u32 = 3;

/// Upper bound on coding passes per code-block (3 per bit-plane, 32 bit-planes, minus the two
/// missing passes of the first plane).
pub const MAXIMUM_PASSES_PER_SEGMENT: usize = 32 * 3 - 2;

/// Passes in the leading MQ segment when selective arithmetic coding bypass is on.
pub const BYPASS_LEADING_PASSES: usize = 10;

/// Upper bound on the number of missing bit-planes searched in the MSB tag tree.
pub const MAXIMUM_MISSING_BITPLANES: u32 = 64;

/// Value of a tag tree node that has not been assigned yet.
pub const TAG_TREE_UNKNOWN: u32 = u32::MAX;

/// Growth step of a progression change list.
pub const PROGRESSION_CHANGE_LIST_GROWTH: usize = 128;
