//! Sequential counter: one thread, buffered line reads, a plain [Bitmap].
//! Slow, but simple enough to check the concurrent counters against.

use std::{
    io::{BufRead, BufReader, Read},
    path::Path,
};

use crate::{
    config::ScanConfig,
    error::{CountError, Result},
    open_input,
    parse::parse_ipv4,
    presence::Bitmap,
    Counter,
};

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug)]
pub struct BitsetCounter {
    pub config: ScanConfig,
}

impl BitsetCounter {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }
}

impl Counter for BitsetCounter {
    fn count_unique(&self, path: &Path) -> Result<u64> {
        let file = open_input(path)?;
        count_lines(
            BufReader::with_capacity(READ_BUFFER_SIZE, file),
            self.config.max_line_len,
        )
    }
}

/// Counts distinct addresses in `input`, one line at a time.
/// Fails on any line longer than `max_line_len` bytes.
pub fn count_lines<R: BufRead>(mut input: R, max_line_len: usize) -> Result<u64> {
    let mut bitmap = Bitmap::new();
    let mut line = Vec::with_capacity(64);
    let mut offset = 0u64;
    // a full line plus its newline; anything longer is cut off and rejected
    let read_limit = (max_line_len as u64).saturating_add(1);

    loop {
        line.clear();
        let n = match (&mut input).take(read_limit).read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(source) => return Err(CountError::Read { source }),
        };
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.len() > max_line_len {
            return Err(CountError::LineTooLong {
                limit: max_line_len,
                offset,
            });
        }
        bitmap.insert(parse_ipv4(&line));
        offset += n as u64;
    }

    Ok(bitmap.count())
}
