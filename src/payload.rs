//! Synthetic upload payload source
//!
//! Upload probes only need to move bytes, never meaningful bytes. One
//! fixed-size buffer is filled with pseudorandom data once and then shared
//! zero-copy across every concurrent upload probe; a requested total length
//! is streamed by repeatedly yielding the buffer with a truncated final
//! slice for the remainder. The total is declared upfront so the transport
//! can set a content-length.

use bytes::Bytes;
use futures::stream::Stream;
use rand::Rng;
use std::convert::Infallible;

/// Default size of the reusable transfer buffer
pub const DEFAULT_BUFFER_BYTES: usize = 5 * 1024 * 1024;

/// Constant-memory source of filler bytes for upload probes
#[derive(Debug, Clone)]
pub struct SyntheticPayloadSource {
    buffer: Bytes,
}

impl Default for SyntheticPayloadSource {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_BYTES)
    }
}

impl SyntheticPayloadSource {
    /// Create a source backed by a buffer of the given size, filled once
    /// with pseudorandom bytes
    pub fn new(buffer_bytes: usize) -> Self {
        let mut filler = vec![0u8; buffer_bytes];
        rand::thread_rng().fill(&mut filler[..]);
        Self {
            buffer: Bytes::from(filler),
        }
    }

    /// Size of the underlying buffer
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Stream exactly `total_bytes` of filler, chunked by the buffer size.
    /// Slices are zero-copy views of the shared buffer.
    pub fn stream(&self, total_bytes: u64) -> impl Stream<Item = Result<Bytes, Infallible>> {
        let buffer = self.buffer.clone();
        futures::stream::unfold(total_bytes, move |left| {
            let buffer = buffer.clone();
            async move {
                if left == 0 {
                    return None;
                }
                let take = (buffer.len() as u64).min(left) as usize;
                Some((Ok(buffer.slice(..take)), left - take as u64))
            }
        })
    }

    /// Wrap a filler stream of the declared length as a request body
    pub fn body(&self, total_bytes: u64) -> reqwest::Body {
        reqwest::Body::wrap_stream(self.stream(total_bytes))
    }
}
