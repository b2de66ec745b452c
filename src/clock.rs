//! The clock is an external collaborator: callers supply timestamps,
//! this crate only packs/unpacks the on-disk FAT date/time fields.

/// A FAT timestamp, already split into the fields the directory entry
/// codec packs. Matches the civil calendar `DIR_CrtDate`/`DIR_CrtTime`
/// fields describe: year is an offset from 1980, month/day are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatTimestamp {
    pub years_since_1980: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl FatTimestamp {
    pub const EPOCH: FatTimestamp = FatTimestamp {
        years_since_1980: 0,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };
}

/// Supplies the current time for directory-entry creation/write/access
/// stamps. Mount callers provide an implementation; this crate never
/// reads a hardware or OS clock itself.
pub trait TimeSource {
    fn now(&self) -> FatTimestamp;
}

/// A fixed-epoch clock, useful for tests and for volumes that don't
/// care about timestamps.
pub struct NullClock;

impl TimeSource for NullClock {
    fn now(&self) -> FatTimestamp {
        FatTimestamp::EPOCH
    }
}
