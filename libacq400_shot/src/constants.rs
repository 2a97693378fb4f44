// TAI vernier composite timestamp field
pub const TAI_ROLLOVER_MASK: u32 = 0x7000_0000;
pub const TAI_ROLLOVER_SHIFT: u32 = 28;
pub const TAI_TICK_MASK: u32 = 0x0FFF_FFFF;
/// The rollover counter is 3 bits wide, so it wraps every 8 counts
pub const TAI_ROLLOVER_MODULUS: u32 = 8;

/// Default vernier tick period in seconds (40 MHz clock)
pub const DEFAULT_TICK_PERIOD: f64 = 25e-9;
/// Default period represented by one count of the rollover counter, in seconds
pub const DEFAULT_ROLLOVER_PERIOD: f64 = 1.0;

/// 32 bit ACQ400 samples carry the ADC code in the top 24 bits
pub const WORD4_CODE_SCALE: f64 = 256.0;

// Label templates; the first `{}` is replaced by the 1-based channel number
pub const RAW_LABEL: &str = "CH{} bits";
pub const EGU_LABEL: &str = "CH{} V";
pub const TAI_LABEL: &str = "CH{} TAI";
pub const BITS_LABEL: &str = "CH{}.{}";

/// Config lines shorter than this are ignored
pub const MIN_DIRECTIVE_LEN: usize = 2;
pub const COMMENT_PREFIX: char = '#';

/// Slice used by shot workers when polling for cancellation
pub const WORKER_POLL_MS: u64 = 50;
