use std::thread;

use log::warn;

/// Tuning knobs for a scan. None of them change the resulting count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of worker threads consuming chunks
    pub workers: usize,
    /// Size of each raw read from the input
    pub read_block_size: usize,
    /// Capacity of the chunk queue between the reader and the workers
    pub queue_depth: usize,
    /// Longest unterminated run of bytes carried across a block boundary
    /// before the scan fails
    pub max_line_len: usize,
}

pub const DEFAULT_READ_BLOCK_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

impl ScanConfig {
    /// Sets the worker count and sizes the queue to match it
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self.queue_depth = self.workers * 2;
        self
    }

    pub fn with_read_block_size(mut self, read_block_size: usize) -> Self {
        self.read_block_size = read_block_size.max(1);
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Returns a copy with every zero-sized knob raised to one
    pub(crate) fn normalized(self) -> Self {
        Self {
            workers: self.workers.max(1),
            read_block_size: self.read_block_size.max(1),
            queue_depth: self.queue_depth.max(1),
            max_line_len: self.max_line_len,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            queue_depth: 2,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
        .with_workers(available_workers())
    }
}

/// Hardware parallelism, or 1 when it can't be queried
pub fn available_workers() -> usize {
    match thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            warn!("couldn't query the available parallelism ({e}), going single-threaded");
            1
        }
    }
}
