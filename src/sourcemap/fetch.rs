//! Bounded, cancellable source-map fetching.
//!
//! Large maps (framework bundles routinely ship 50+ MiB of
//! `sourcesContent`) are consumed as a byte stream with a running size
//! check instead of being buffered blindly. UTF-8 sequences split across
//! chunk boundaries are reassembled incrementally.

use futures_util::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::discovery::acceptable_map_content_type;
use crate::error::SourceMapError;
use crate::utils::constants::SOURCEMAP_STREAMING_THRESHOLD;

/// Size and time budgets for one fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub max_size: usize,
    pub timeout: Duration,
}

/// Incremental UTF-8 decoder tolerating multi-byte splits across chunks.
///
/// Bytes that end a chunk mid-sequence are carried into the next push; any
/// other invalid byte is a hard error.
#[derive(Debug, Default)]
pub struct Utf8Assembler {
    carry: Vec<u8>,
    out: String,
}

impl Utf8Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of raw bytes
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), SourceMapError> {
        let bytes: Vec<u8> = if self.carry.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(chunk);
            joined
        };

        match std::str::from_utf8(&bytes) {
            Ok(s) => {
                self.out.push_str(s);
                Ok(())
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete trailing sequence: keep it for the next chunk
                let valid = e.valid_up_to();
                // Safety of the unwrap-free path: valid_up_to is a char boundary
                self.out.push_str(std::str::from_utf8(&bytes[..valid]).map_err(|_| {
                    SourceMapError::InvalidJson("UTF-8 boundary accounting failed".to_string())
                })?);
                self.carry = bytes[valid..].to_vec();
                Ok(())
            }
            Err(e) => Err(SourceMapError::InvalidJson(format!(
                "invalid UTF-8 at byte {}",
                e.valid_up_to()
            ))),
        }
    }

    /// Finish decoding; trailing partial sequences are an error
    pub fn finish(self) -> Result<String, SourceMapError> {
        if self.carry.is_empty() {
            Ok(self.out)
        } else {
            Err(SourceMapError::InvalidJson(
                "response ended mid UTF-8 sequence".to_string(),
            ))
        }
    }
}

/// Fetch a source map as text, honoring the byte budget and cancellation.
///
/// Responses with a known small `Content-Length` are buffered in one read;
/// anything larger (or of unknown length) streams through the assembler
/// with a running byte counter. Exactly `max_size` bytes is accepted; one
/// more is a size error.
pub async fn fetch_map_text(
    client: &reqwest::Client,
    url: &str,
    limits: FetchLimits,
    cancel: &CancellationToken,
) -> Result<String, SourceMapError> {
    let fetch = async {
        let response = client.get(url).send().await.map_err(|e| SourceMapError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceMapError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        acceptable_map_content_type(content_type.as_deref())?;

        if let Some(len) = response.content_length() {
            let len = len as usize;
            if len > limits.max_size {
                return Err(SourceMapError::TooLarge {
                    actual: len,
                    limit: limits.max_size,
                });
            }
            if len <= SOURCEMAP_STREAMING_THRESHOLD {
                let bytes = response.bytes().await.map_err(|e| SourceMapError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
                if bytes.len() > limits.max_size {
                    return Err(SourceMapError::TooLarge {
                        actual: bytes.len(),
                        limit: limits.max_size,
                    });
                }
                return String::from_utf8(bytes.to_vec())
                    .map_err(|e| SourceMapError::InvalidJson(format!("invalid UTF-8: {e}")));
            }
        }

        let mut stream = response.bytes_stream();
        let mut assembler = Utf8Assembler::new();
        let mut total = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SourceMapError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            total += chunk.len();
            if total > limits.max_size {
                return Err(SourceMapError::TooLarge {
                    actual: total,
                    limit: limits.max_size,
                });
            }
            assembler.push(&chunk)?;
        }

        assembler.finish()
    };

    tokio::select! {
        () = cancel.cancelled() => Err(SourceMapError::Cancelled),
        result = tokio::time::timeout(limits.timeout, fetch) => match result {
            Ok(inner) => inner,
            Err(_) => Err(SourceMapError::Timeout(limits.timeout.as_millis() as u64)),
        },
    }
}
