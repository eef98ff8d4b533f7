//! Pluggable remote fetch with retry.

use std::io;
use std::time::Duration;

/// Downloads a URL and returns its raw (gzip-encoded) bytes.
///
/// The engine never talks to the network itself; callers supply whatever
/// transport they have. Implementations are free to block.
pub trait Fetch {
    /// Fetches `url`, returning the response body.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] describing the transport failure.
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> io::Result<Vec<u8>>,
{
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>> {
        self(url)
    }
}

/// Fetches `url`, retrying with exponential backoff for up to `retry_secs`.
///
/// The first attempt is immediate; failed attempts sleep 1, 2, 4, … seconds
/// until the accumulated sleep would exceed the budget. A zero budget means a
/// single attempt.
///
/// # Errors
///
/// Returns the final transport error once the budget is exhausted.
pub fn fetch_with_retry(fetcher: &dyn Fetch, url: &str, retry_secs: u64) -> io::Result<Vec<u8>> {
    let mut slept = 0u64;
    let mut backoff = 1u64;
    loop {
        match fetcher.fetch(url) {
            Ok(bytes) => return Ok(bytes),
            Err(error) => {
                if slept + backoff > retry_secs {
                    return Err(error);
                }
                tracing::warn!(url, backoff, error = %error, "fetch failed, retrying");
                std::thread::sleep(Duration::from_secs(backoff));
                slept += backoff;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}
