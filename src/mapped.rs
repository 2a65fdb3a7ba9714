//! Counting over a memory-mapped input. Workers claim raw ranges of the mapping
//! from a shared cursor and align them to line boundaries themselves, so there
//! is no reader thread and no copying.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    thread,
};

use log::debug;
use memchr::{memchr, memrchr};
use memmap2::MmapOptions;

use crate::{
    config::ScanConfig,
    error::{CountError, Result},
    open_input,
    pool::process_chunk,
    presence::PresenceSet,
    Counter,
};

/// Counts by mapping the whole file and splitting it between workers.
#[derive(Clone, Copy, Debug)]
pub struct MmapCounter {
    pub config: ScanConfig,
}

impl MmapCounter {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }
}

impl Counter for MmapCounter {
    fn count_unique(&self, path: &Path) -> Result<u64> {
        let file = open_input(path)?;
        let len = file
            .metadata()
            .map_err(|source| CountError::Read { source })?
            .len();
        if len == 0 {
            // nothing to map
            return Ok(0);
        }
        // SAFETY: the mapping is only read, and lives until counting returns.
        // Concurrent truncation of the file by another process is not guarded against.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| CountError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        count_slice(&mmap, &self.config)
    }
}

/// Counts distinct addresses in `input`, using up to `config.workers` threads
/// that each claim `config.read_block_size` bytes at a time.
///
/// Stops claiming new ranges some time after any worker hits an error.
pub fn count_slice(input: &[u8], config: &ScanConfig) -> Result<u64> {
    let config = config.normalized();
    let mut presence = PresenceSet::new();
    let processing_error = Mutex::new(None);
    let global_input_idx = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);

    let (lines, panicked) = thread::scope(|s| {
        let handles = (0..config.workers)
            .map(|_| {
                let presence = &presence;
                let pe = &processing_error;
                let gii = &global_input_idx;
                let abort = &abort;
                s.spawn(move || {
                    match claim_and_record(input, presence, gii, abort, &config) {
                        Ok(lines) => lines,
                        Err(e) => {
                            abort.store(true, Ordering::Relaxed);
                            pe.lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .get_or_insert(e);
                            0
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        let mut lines = 0;
        let mut panicked = false;
        for handle in handles {
            match handle.join() {
                Ok(n) => lines += n,
                Err(_) => panicked = true,
            }
        }
        (lines, panicked)
    }); // scope ends, all threads were joined

    if panicked {
        return Err(CountError::WorkerPanicked);
    }
    if let Some(e) = processing_error
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
    {
        return Err(e);
    }
    debug!("mapped scan processed {} bytes, {} lines", input.len(), lines);

    Ok(presence.count())
}

/// Claims ranges from `global_input_offset` until the input is exhausted,
/// marking every line of each aligned range in `presence`.
fn claim_and_record(
    whole_input: &[u8],
    presence: &PresenceSet,
    global_input_offset: &AtomicUsize,
    abort: &AtomicBool,
    config: &ScanConfig,
) -> Result<u64> {
    let chunk_size = config.read_block_size;
    let mut lines = 0;

    while !abort.load(Ordering::Relaxed) {
        let initial_chunk_start = global_input_offset.fetch_add(chunk_size, Ordering::SeqCst);
        if initial_chunk_start >= whole_input.len() {
            // all of input has been claimed, this thread has no further work
            break;
        }
        let initial_chunk_end = initial_chunk_start
            .saturating_add(chunk_size)
            .min(whole_input.len());

        let (chunk_start, chunk_end) = aligned_offsets(
            whole_input,
            initial_chunk_start,
            initial_chunk_end,
            config.max_line_len,
        )?;
        lines += process_chunk(&whole_input[chunk_start..chunk_end], presence);
    }
    Ok(lines)
}

/// Moves both ends of `[start, end)` to one past the next newline at or after
/// them (`start == 0` stays put, and an end with no further newline moves to
/// the end of input). Neighbouring raw ranges therefore align to the same
/// boundary, and every line belongs to exactly one aligned range.
///
/// Searches at most `max_line_len + 1` bytes from each end; if that finds
/// neither a newline nor the end of input, the line is too long.
fn aligned_offsets(
    whole_input: &[u8],
    start: usize,
    end: usize,
    max_line_len: usize,
) -> Result<(usize, usize)> {
    assert!(start < whole_input.len());
    assert!(end <= whole_input.len());
    let window = max_line_len.saturating_add(1);

    let chunk_start = if start == 0 {
        start
    } else {
        match next_line_start(whole_input, start, window) {
            Some(aligned) => aligned,
            // start was inside the last line, which the previous range owns
            None if whole_input.len() - start <= window => return Ok((end, end)),
            None => return Err(line_too_long(whole_input, start, max_line_len)),
        }
    };
    debug_assert!(
        chunk_start == 0 || whole_input[chunk_start - 1] == b'\n',
        "chunk_start should point to either the start, or one after a newline."
    );

    let chunk_end = match next_line_start(whole_input, end, window) {
        Some(aligned) => aligned,
        // our end was inside the last line
        None if whole_input.len() - end <= window => whole_input.len(),
        None => return Err(line_too_long(whole_input, end, max_line_len)),
    };
    debug_assert!(
        chunk_end == whole_input.len() || whole_input[chunk_end - 1] == b'\n',
        "chunk_end should point at the very end or one past a newline"
    );

    Ok((chunk_start.min(chunk_end), chunk_end))
}

/// Offset one past the first newline in `whole_input[from..from + window]`
#[inline]
fn next_line_start(whole_input: &[u8], from: usize, window: usize) -> Option<usize> {
    let search_end = from.saturating_add(window).min(whole_input.len());
    memchr(b'\n', &whole_input[from..search_end]).map(|pos| from + pos + 1)
}

#[cold]
fn line_too_long(whole_input: &[u8], inside: usize, limit: usize) -> CountError {
    let line_start = memrchr(b'\n', &whole_input[..inside]).map_or(0, |pos| pos + 1);
    CountError::LineTooLong {
        limit,
        offset: line_start as u64,
    }
}
