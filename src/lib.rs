//! Counts distinct IPv4 addresses in newline-delimited text files of any size.
//!
//! The default strategy streams the file through a bounded queue to a pool of
//! workers that set bits in a shared 2^32-bit [PresenceSet] with
//! compare-and-swap, then sums the set bits. Memory use is fixed at 512 MiB
//! for the bitmap plus the in-flight chunks, whatever the input size.

use std::{fs::File, path::Path};

pub mod baseline;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapped;
pub mod parse;
pub mod pool;
pub mod presence;
pub mod reader;

pub use baseline::BitsetCounter;
pub use config::ScanConfig;
pub use error::{CountError, Result};
pub use mapped::MmapCounter;
pub use parse::parse_ipv4;
pub use pool::AtomicCounter;
pub use presence::{Bitmap, PresenceSet};

/// Something that can count the distinct addresses in a file
pub trait Counter {
    fn count_unique(&self, path: &Path) -> Result<u64>;
}

/// Available counting strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Reader thread plus worker pool over a lock-free presence set
    #[default]
    Atomic,
    /// Memory-mapped input split between workers over a lock-free presence set
    Mmap,
    /// Single-threaded buffered reads into a plain bitmap
    Bitset,
}

impl Strategy {
    pub fn counter(self, config: ScanConfig) -> Box<dyn Counter> {
        match self {
            Strategy::Atomic => Box::new(AtomicCounter::new(config)),
            Strategy::Mmap => Box::new(MmapCounter::new(config)),
            Strategy::Bitset => Box::new(BitsetCounter::new(config)),
        }
    }
}

/// Counts distinct addresses in the file at `path` with the default strategy
pub fn count_unique_ips(path: impl AsRef<Path>, config: &ScanConfig) -> Result<u64> {
    AtomicCounter::new(*config).count_unique(path.as_ref())
}

pub(crate) fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| CountError::Open {
        path: path.to_path_buf(),
        source,
    })
}
