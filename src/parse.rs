//! Dotted-quad parsing and chunk line splitting.
//!
//! Parsing does no validation: non-digit bytes and oversized octets produce
//! an address anyway, using wrapping byte arithmetic.

use memchr::memchr_iter;

/// Parses one line (separator already stripped) into its big-endian address value.
///
/// A trailing `\r` is ignored. Missing octets stay zero, and everything after
/// a fourth `.` is ignored.
#[inline]
pub fn parse_ipv4(line: &[u8]) -> u32 {
    let line = match line.split_last() {
        Some((b'\r', rest)) => rest,
        _ => line,
    };

    let mut octets = [0u8; 4];
    let mut idx = 0;
    for &c in line {
        if c == b'.' {
            if idx == 3 {
                break;
            }
            idx += 1;
            continue;
        }
        octets[idx] = octets[idx]
            .wrapping_mul(10)
            .wrapping_add(c.wrapping_sub(b'0'));
    }
    u32::from_be_bytes(octets)
}

/// Calls `f` with each line in `chunk`, without its `\n`. Returns the number of lines.
///
/// Bytes after the last `\n` form one final line. A chunk ending in `\n` has
/// no trailing empty line.
#[inline]
pub fn for_each_line(chunk: &[u8], mut f: impl FnMut(&[u8])) -> u64 {
    let mut start = 0;
    let mut lines = 0;
    for newline in memchr_iter(b'\n', chunk) {
        f(&chunk[start..newline]);
        start = newline + 1;
        lines += 1;
    }
    if start < chunk.len() {
        f(&chunk[start..]);
        lines += 1;
    }
    lines
}
