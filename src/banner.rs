//! Banner capture for freshly connected TCP streams.
//!
//! A banner is whatever a service sends unprompted right after the
//! handshake. We read it exactly once, bounded in both size and time.

use crate::error::AttemptError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Maximum bytes to read for a banner.
pub const MAX_BANNER_SIZE: usize = 1024;

/// Read a banner from a connected stream.
///
/// Performs a single read of up to [`MAX_BANNER_SIZE`] bytes within
/// `read_timeout`. The bytes must be valid UTF-8; the result is sanitized
/// for single-line display.
pub async fn read_banner<S>(stream: &mut S, read_timeout: Duration) -> Result<String, AttemptError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; MAX_BANNER_SIZE];

    let n = match timeout(read_timeout, stream.read(&mut buffer)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(AttemptError::Io(e)),
        Err(_) => return Err(AttemptError::ReadTimeout),
    };
    if n == 0 {
        return Err(AttemptError::EmptyBanner);
    }

    let text = std::str::from_utf8(&buffer[..n]).map_err(|_| AttemptError::DecodeFailure)?;
    let banner = sanitize_banner(text);
    if banner.is_empty() {
        return Err(AttemptError::EmptyBanner);
    }
    Ok(banner)
}

/// Flatten a banner onto one line: line breaks and tabs become spaces,
/// other control characters become dots, runs of whitespace collapse.
fn sanitize_banner(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_space = false;

    for c in text.chars() {
        let c = if c.is_whitespace() {
            ' '
        } else if c.is_control() {
            '.'
        } else {
            c
        };

        if c == ' ' {
            if !prev_space {
                result.push(c);
            }
            prev_space = true;
        } else {
            result.push(c);
            prev_space = false;
        }
    }

    result.trim().to_string()
}
