//! Delimiter-based segment splitting for byte buffers and streams
//!
//! Unlike `[u8]::split`, segments keep their delimiter, so concatenating every
//! segment reproduces the input when no comment or whitespace handling is
//! requested. Comment markers cut a segment short at the first marker;
//! whitespace trimming applies to the segment content, never to the
//! delimiter, which is re-appended afterwards.
//!
//! ```
//! use filetool_core::io::split::{split_bytes, SplitOptions};
//!
//! let opts = SplitOptions::new(b"\n").with_comment_marker(b"#");
//! let lines: Vec<Vec<u8>> = split_bytes(b"a=1 # one\n#only\nb=2", &opts)
//!     .unwrap()
//!     .collect();
//! assert_eq!(lines, vec![b"a=1 \n".to_vec(), b"\n".to_vec(), b"b=2".to_vec()]);
//! ```

use crate::error::FiletoolError;
use crate::io::eintr;
use crate::io::scan::find_subslice;
use std::io::Read;

/// Default read size for [`split`] (8 KiB)
pub const DEFAULT_SPLIT_CHUNK_SIZE: usize = 8192;

/// Bytes trimmed by the whitespace options
const WHITESPACE: &[u8] = b" \t\n\r\x0b\x0c";

fn is_whitespace(b: &u8) -> bool {
    WHITESPACE.contains(b)
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !is_whitespace(b))
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !is_whitespace(b))
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Options controlling how input is cut into segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    pub delimiter: Vec<u8>,
    pub comment_marker: Option<Vec<u8>>,
    pub strip_leading: bool,
    pub strip_trailing: bool,
    pub chunk_size: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::new(b"\n")
    }
}

impl SplitOptions {
    pub fn new(delimiter: impl AsRef<[u8]>) -> Self {
        Self {
            delimiter: delimiter.as_ref().to_vec(),
            comment_marker: None,
            strip_leading: false,
            strip_trailing: false,
            chunk_size: DEFAULT_SPLIT_CHUNK_SIZE,
        }
    }

    pub fn with_comment_marker(mut self, marker: impl AsRef<[u8]>) -> Self {
        self.comment_marker = Some(marker.as_ref().to_vec());
        self
    }

    pub fn with_strip_leading(mut self, strip: bool) -> Self {
        self.strip_leading = strip;
        self
    }

    pub fn with_strip_trailing(mut self, strip: bool) -> Self {
        self.strip_trailing = strip;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Reject option combinations that would silently change behaviour
    pub fn validate(&self) -> Result<(), FiletoolError> {
        validate_markers(&self.delimiter, self.comment_marker.as_deref())?;
        if self.chunk_size == 0 {
            return Err(FiletoolError::InvalidChunkSize);
        }
        Ok(())
    }

    fn filter(&self) -> SegmentFilter {
        SegmentFilter {
            delimiter: self.delimiter.clone(),
            comment_marker: self.comment_marker.clone(),
            strip_leading: self.strip_leading,
            strip_trailing: self.strip_trailing,
        }
    }
}

/// Delimiter / comment marker constraints shared with append option validation
pub(crate) fn validate_markers(
    delimiter: &[u8],
    comment_marker: Option<&[u8]>,
) -> Result<(), FiletoolError> {
    if delimiter.is_empty() {
        return Err(FiletoolError::EmptyDelimiter);
    }
    if let Some(marker) = comment_marker {
        if marker.is_empty() {
            return Err(FiletoolError::EmptyCommentMarker);
        }
        if marker == delimiter {
            return Err(FiletoolError::CommentMarkerEqualsDelimiter);
        }
        if find_subslice(marker, delimiter).is_some() {
            return Err(FiletoolError::DelimiterInCommentMarker);
        }
    }
    Ok(())
}

/// Per-segment comment and whitespace processing
#[derive(Debug, Clone)]
struct SegmentFilter {
    delimiter: Vec<u8>,
    comment_marker: Option<Vec<u8>>,
    strip_leading: bool,
    strip_trailing: bool,
}

impl SegmentFilter {
    /// Turn one raw segment (at most one delimiter, at its end) into output.
    /// `None` means the segment collapsed to nothing and is dropped.
    fn apply(&self, raw: &[u8]) -> Option<Vec<u8>> {
        let terminated = raw.ends_with(&self.delimiter);
        let content_len = if terminated {
            raw.len() - self.delimiter.len()
        } else {
            raw.len()
        };

        // A marker overlapping the delimiter still ends the content there.
        let cut = self
            .comment_marker
            .as_deref()
            .and_then(|marker| find_subslice(raw, marker))
            .map_or(content_len, |idx| idx.min(content_len));

        let mut content = &raw[..cut];
        if self.strip_leading {
            content = trim_start(content);
        }
        if self.strip_trailing {
            content = trim_end(content);
        }

        if content.is_empty() && !terminated {
            return None;
        }

        let mut out = Vec::with_capacity(content.len() + self.delimiter.len());
        out.extend_from_slice(content);
        if terminated {
            out.extend_from_slice(&self.delimiter);
        }
        Some(out)
    }
}

/// Lazy segments of an in-memory buffer, see [`split_bytes`]
#[derive(Debug)]
pub struct ByteSegments<'a> {
    data: &'a [u8],
    start: usize,
    filter: SegmentFilter,
}

impl Iterator for ByteSegments<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.start < self.data.len() {
            let rest = &self.data[self.start..];
            let end = match find_subslice(rest, &self.filter.delimiter) {
                Some(idx) => self.start + idx + self.filter.delimiter.len(),
                None => self.data.len(),
            };
            let raw = &self.data[self.start..end];
            self.start = end;
            if let Some(segment) = self.filter.apply(raw) {
                return Some(segment);
            }
        }
        None
    }
}

/// Split an in-memory buffer into delimiter-terminated segments.
///
/// # Errors
///
/// Configuration errors from [`SplitOptions::validate`]; nothing is read
/// before validation passes.
pub fn split_bytes<'a>(
    data: &'a [u8],
    options: &SplitOptions,
) -> Result<ByteSegments<'a>, FiletoolError> {
    options.validate()?;
    Ok(ByteSegments {
        data,
        start: 0,
        filter: options.filter(),
    })
}

/// Lazy segments of a reader, see [`split`]
///
/// Holds at most the unconsumed remainder of the current segment plus one
/// chunk. After a read error the iterator yields the error once and then ends.
#[derive(Debug)]
pub struct Segments<R> {
    reader: R,
    filter: SegmentFilter,
    chunk: Vec<u8>,
    buffer: Vec<u8>,
    /// Start of the unconsumed remainder in `buffer`
    pos: usize,
    /// No delimiter starts before this index (other than ones already consumed)
    scan_from: usize,
    eof: bool,
    failed: bool,
}

impl<R: Read> Segments<R> {
    fn next_segment(&mut self) -> Option<Result<Vec<u8>, FiletoolError>> {
        let delim_len = self.filter.delimiter.len();
        loop {
            if let Some(idx) = find_subslice(&self.buffer[self.scan_from..], &self.filter.delimiter) {
                let start = self.pos;
                let end = self.scan_from + idx + delim_len;
                self.pos = end;
                self.scan_from = end;
                match self.filter.apply(&self.buffer[start..end]) {
                    Some(segment) => return Some(Ok(segment)),
                    None => continue,
                }
            }

            if self.eof {
                if self.pos < self.buffer.len() {
                    let start = self.pos;
                    self.pos = self.buffer.len();
                    if let Some(segment) = self.filter.apply(&self.buffer[start..]) {
                        return Some(Ok(segment));
                    }
                }
                return None;
            }

            // A delimiter may still start in the last delim_len - 1 bytes.
            self.scan_from = self
                .pos
                .max(self.buffer.len().saturating_sub(delim_len - 1));
            if self.pos > 0 {
                self.buffer.drain(..self.pos);
                self.scan_from -= self.pos;
                self.pos = 0;
            }

            match eintr::read(&mut self.reader, &mut self.chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.buffer.extend_from_slice(&self.chunk[..n]),
                Err(source) => {
                    self.failed = true;
                    return Some(Err(FiletoolError::Stream { source }));
                }
            }
        }
    }
}

impl<R: Read> Iterator for Segments<R> {
    type Item = Result<Vec<u8>, FiletoolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.next_segment()
    }
}

/// Split a readable stream into delimiter-terminated segments, reading
/// `options.chunk_size` bytes at a time.
///
/// # Errors
///
/// Configuration errors are returned up front; read errors surface as a
/// `FiletoolError::Stream` item from the iterator.
pub fn split<R: Read>(reader: R, options: &SplitOptions) -> Result<Segments<R>, FiletoolError> {
    options.validate()?;
    Ok(Segments {
        reader,
        filter: options.filter(),
        chunk: vec![0u8; options.chunk_size],
        buffer: Vec::new(),
        pos: 0,
        scan_from: 0,
        eof: false,
        failed: false,
    })
}
