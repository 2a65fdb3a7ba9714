//! Streams an input as line-aligned chunks into a bounded queue.

use std::{
    io::{self, Read},
    mem,
};

use crossbeam_channel::Sender;
use memchr::memrchr;

use crate::error::{CountError, Result};

/// Totals for one pass of [read_chunks_by_line]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub bytes: u64,
    pub chunks: u64,
}

/// Reads `input` in blocks of `block_size` bytes and sends chunks to `out`.
///
/// Each chunk ends just after a `\n`, except the final chunk of the input,
/// which holds whatever follows the last `\n`. Every byte lands in exactly one
/// chunk, in input order. Bytes not yet terminated by a `\n` are carried into
/// the next block, and the scan fails once they exceed `max_line_len`.
///
/// Blocks while `out` is full. Dropping the sender is what closes the queue,
/// so callers should drop it once this returns, `Ok` or not.
pub fn read_chunks_by_line<R: Read>(
    mut input: R,
    block_size: usize,
    max_line_len: usize,
    out: &Sender<Vec<u8>>,
) -> Result<ReadStats> {
    let mut buf = vec![0u8; block_size.max(1)];
    let mut leftover: Vec<u8> = Vec::new();
    let mut stats = ReadStats::default();

    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(CountError::Read { source }),
        };
        stats.bytes += n as u64;
        let read = &buf[..n];

        if let Some(last_newline) = memrchr(b'\n', read) {
            let mut chunk = mem::take(&mut leftover);
            chunk.extend_from_slice(&read[..=last_newline]);
            leftover.extend_from_slice(&read[last_newline + 1..]);
            send(out, chunk, &mut stats)?;
        } else {
            // no line ends in this block, keep accumulating
            leftover.extend_from_slice(read);
        }

        if leftover.len() > max_line_len {
            return Err(CountError::LineTooLong {
                limit: max_line_len,
                offset: stats.bytes - leftover.len() as u64,
            });
        }
    }

    if !leftover.is_empty() {
        send(out, leftover, &mut stats)?;
    }
    Ok(stats)
}

fn send(out: &Sender<Vec<u8>>, chunk: Vec<u8>, stats: &mut ReadStats) -> Result<()> {
    out.send(chunk).map_err(|_| CountError::QueueClosed)?;
    stats.chunks += 1;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::{self, Read};

    use crossbeam_channel::unbounded;

    use super::{read_chunks_by_line, ReadStats};
    use crate::error::CountError;

    fn collect_chunks(input: &[u8], block_size: usize) -> (Vec<Vec<u8>>, ReadStats) {
        let (tx, rx) = unbounded();
        let stats = match read_chunks_by_line(input, block_size, 1024, &tx) {
            Ok(stats) => stats,
            Err(e) => panic!("unexpected error `{e}` for block size {block_size}"),
        };
        drop(tx);
        (rx.iter().collect(), stats)
    }

    #[test]
    fn chunks_are_line_aligned_and_lossless() {
        let inputs: [&[u8]; 6] = [
            b"",
            b"1.1.1.1",
            b"1.1.1.1\n",
            b"1.1.1.1\n22.22.22.22\n\n3.3.3.3",
            b"10.0.0.1\n192.168.0.1\n192.168.0.1\n255.255.255.255\n",
            b"\n\n\n",
        ];
        for input in inputs {
            for block_size in [1, 2, 3, 7, 8, 16, 64, 4096] {
                let (chunks, stats) = collect_chunks(input, block_size);
                assert_eq!(input, chunks.concat(), "block size {block_size}");
                assert_eq!(stats.bytes, input.len() as u64);
                assert_eq!(stats.chunks, chunks.len() as u64);
                if let Some((_last, rest)) = chunks.split_last() {
                    for chunk in rest {
                        assert_eq!(chunk.last(), Some(&b'\n'), "block size {block_size}");
                    }
                }
                assert!(chunks.iter().all(|c| !c.is_empty()));
            }
        }
    }

    #[test]
    fn short_reads_accumulate_into_one_chunk() {
        let (chunks, _) = collect_chunks(b"123.45.67.89\n", 4);
        assert_eq!(chunks, vec![b"123.45.67.89\n".to_vec()]);
    }

    #[test]
    fn line_longer_than_limit_fails() {
        let (tx, _rx) = unbounded();
        let input = b"1.1.1.1\n2222222222222222222222222222222\n";
        match read_chunks_by_line(&input[..], 4, 16, &tx) {
            Err(CountError::LineTooLong { limit, offset }) => {
                assert_eq!(limit, 16);
                assert_eq!(offset, 8);
            }
            other => panic!("expected LineTooLong, got {other:?}"),
        }
    }

    /// Yields `data` in pieces, then fails with `fail_kind` once, then EOF
    struct FlakyReader {
        data: Vec<u8>,
        pos: usize,
        fail_at: usize,
        fail_kind: Option<io::ErrorKind>,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.fail_at {
                if let Some(kind) = self.fail_kind.take() {
                    return Err(io::Error::new(kind, "injected"));
                }
            }
            let end = (self.pos + buf.len().min(5)).min(self.data.len());
            let n = end - self.pos;
            buf[..n].copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(n)
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let data = b"1.1.1.1\n2.2.2.2\n".to_vec();
        let reader = FlakyReader {
            data: data.clone(),
            pos: 0,
            fail_at: 6,
            fail_kind: Some(io::ErrorKind::Interrupted),
        };
        let (tx, rx) = unbounded();
        let stats = read_chunks_by_line(reader, 64, 1024, &tx).unwrap();
        drop(tx);
        assert_eq!(stats.bytes, data.len() as u64);
        assert_eq!(rx.iter().collect::<Vec<_>>().concat(), data);
    }

    #[test]
    fn read_errors_propagate() {
        let reader = FlakyReader {
            data: b"1.1.1.1\n2.2.2.2\n3.3.3.3\n".to_vec(),
            pos: 0,
            fail_at: 10,
            fail_kind: Some(io::ErrorKind::Other),
        };
        let (tx, _rx) = unbounded();
        match read_chunks_by_line(reader, 64, 1024, &tx) {
            Err(CountError::Read { source }) => assert_eq!(source.kind(), io::ErrorKind::Other),
            other => panic!("expected Read error, got {other:?}"),
        }
    }

    #[test]
    fn closed_queue_is_reported() {
        let (tx, rx) = unbounded();
        drop(rx);
        assert!(matches!(
            read_chunks_by_line(&b"1.1.1.1\n"[..], 64, 1024, &tx),
            Err(CountError::QueueClosed)
        ));
    }
}
