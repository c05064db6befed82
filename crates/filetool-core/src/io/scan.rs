//! Chunked substring search over a byte stream

use crate::error::FiletoolError;
use crate::io::eintr;
use memchr::memmem;
use std::io::Read;

/// Default read size for [`find_bytes_offset`] (1 MiB)
pub const DEFAULT_SCAN_CHUNK_SIZE: usize = 1024 * 1024;

/// First index of `needle` in `haystack`, in linear time
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memmem::find(haystack, needle)
}

/// Find the first occurrence of `target` in `stream`.
///
/// The stream is read `chunk_size` bytes at a time. Only the trailing
/// `target.len() - 1` bytes of the previous read are carried over, so a match
/// straddling two reads is still found without holding more than one chunk.
///
/// Returns the byte offset of the match relative to the stream position at
/// entry, or `None` if the stream ends without a match.
///
/// # Errors
///
/// `EmptyScanTarget` if `target` is empty, `InvalidChunkSize` if `chunk_size`
/// is zero, `Stream` if a read fails.
pub fn find_bytes_offset<R: Read + ?Sized>(
    stream: &mut R,
    target: &[u8],
    chunk_size: usize,
) -> Result<Option<u64>, FiletoolError> {
    if target.is_empty() {
        return Err(FiletoolError::EmptyScanTarget);
    }
    if chunk_size == 0 {
        return Err(FiletoolError::InvalidChunkSize);
    }

    let finder = memmem::Finder::new(target);
    let overlap = target.len() - 1;
    let mut chunk = vec![0u8; chunk_size];
    let mut haystack: Vec<u8> = Vec::with_capacity(chunk_size + overlap);
    // Bytes consumed from the stream before the current haystack's first byte
    let mut base: u64 = 0;

    loop {
        let n = eintr::read(stream, &mut chunk).map_err(|source| FiletoolError::Stream { source })?;
        if n == 0 {
            return Ok(None);
        }

        haystack.extend_from_slice(&chunk[..n]);
        if let Some(pos) = finder.find(&haystack) {
            return Ok(Some(base + pos as u64));
        }

        let keep = overlap.min(haystack.len());
        let drop = haystack.len() - keep;
        haystack.drain(..drop);
        base += drop as u64;
    }
}
