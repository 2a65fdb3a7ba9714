//! Error type for the counting library.
//!
//! Every variant is terminal for the scan that produced it: a failed scan
//! never yields a partial count and nothing is retried.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountError {
    #[error("could not open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed mid-scan: {source}")]
    Read {
        #[source]
        source: io::Error,
    },

    #[error("could not map '{}' into memory: {source}", .path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line at byte `offset` ran past `limit` bytes without a newline.
    #[error("line starting at byte {offset} is longer than {limit} bytes")]
    LineTooLong { limit: usize, offset: u64 },

    #[error("a worker thread panicked")]
    WorkerPanicked,

    #[error("chunk queue closed before the reader finished")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, CountError>;
