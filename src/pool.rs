//! The lock-free counter: one reader feeding a fixed pool of workers through a
//! bounded queue, all of them writing into one shared [PresenceSet].

use std::{fs::File, io::Read, path::Path, thread};

use crossbeam_channel::{bounded, Receiver};
use log::debug;

use crate::{
    config::ScanConfig,
    error::{CountError, Result},
    open_input,
    parse::{for_each_line, parse_ipv4},
    presence::PresenceSet,
    reader::read_chunks_by_line,
    Counter,
};

/// Counts with the shared [PresenceSet] and a reader thread feeding a worker pool.
#[derive(Clone, Copy, Debug)]
pub struct AtomicCounter {
    pub config: ScanConfig,
}

impl AtomicCounter {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }
}

impl Counter for AtomicCounter {
    fn count_unique(&self, path: &Path) -> Result<u64> {
        let file: File = open_input(path)?;
        count_reader(file, &self.config)
    }
}

/// Per-worker totals, only used for logging
#[derive(Clone, Copy, Debug, Default)]
struct WorkerStats {
    chunks: u64,
    lines: u64,
}

/// Marks the address on every line of `chunk` as present. Returns the number of lines.
#[inline]
pub fn process_chunk(chunk: &[u8], presence: &PresenceSet) -> u64 {
    for_each_line(chunk, |line| {
        presence.test_and_set(parse_ipv4(line));
    })
}

/// Counts distinct addresses in `input`.
///
/// The reader runs on the calling thread while `config.workers` scoped threads
/// drain the queue. On a read error the workers still drain and exit, and
/// only the error is returned.
pub fn count_reader<R: Read>(input: R, config: &ScanConfig) -> Result<u64> {
    let config = config.normalized();
    debug!(
        "scanning with {} workers, {} byte blocks, queue depth {}",
        config.workers, config.read_block_size, config.queue_depth
    );

    let mut presence = PresenceSet::new();
    let (tx, rx) = bounded::<Vec<u8>>(config.queue_depth);

    let (read_result, worker_result) = thread::scope(|s| {
        let handles = (0..config.workers)
            .map(|_| {
                let rx = rx.clone();
                let presence = &presence;
                s.spawn(move || drain(rx, presence))
            })
            .collect::<Vec<_>>();
        drop(rx);

        let read_result =
            read_chunks_by_line(input, config.read_block_size, config.max_line_len, &tx);
        // closes the queue, whether the reader finished or failed
        drop(tx);

        let mut totals = WorkerStats::default();
        let mut panicked = false;
        for handle in handles {
            match handle.join() {
                Ok(stats) => {
                    totals.chunks += stats.chunks;
                    totals.lines += stats.lines;
                }
                Err(_) => panicked = true,
            }
        }
        let worker_result = if panicked {
            Err(CountError::WorkerPanicked)
        } else {
            Ok(totals)
        };
        (read_result, worker_result)
    }); // scope ends, all workers were joined

    let totals = worker_result?;
    let read_stats = read_result?;
    debug!(
        "read {} bytes in {} chunks; workers processed {} chunks, {} lines",
        read_stats.bytes, read_stats.chunks, totals.chunks, totals.lines
    );

    Ok(presence.count())
}

fn drain(chunks: Receiver<Vec<u8>>, presence: &PresenceSet) -> WorkerStats {
    let mut stats = WorkerStats::default();
    for chunk in chunks.iter() {
        stats.lines += process_chunk(&chunk, presence);
        stats.chunks += 1;
    }
    stats
}
