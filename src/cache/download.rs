//! Streamed HTTP fetching for model assets.

use std::io::Read;
use std::time::Duration;

use serde::Serialize;

use super::AssetDownloadError;

/// Per-chunk download progress. `percent` is 0 while the server has not
/// reported a content length.
#[derive(Clone, Debug, Serialize)]
pub struct DownloadProgress {
    pub loaded_bytes: u64,
    pub total_bytes: u64,
    pub percent: u8,
}

impl DownloadProgress {
    pub(crate) fn new(loaded_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes > 0 {
            ((loaded_bytes * 100) / total_bytes).min(100) as u8
        } else {
            0
        };
        Self {
            loaded_bytes,
            total_bytes,
            percent,
        }
    }
}

/// Transport seam for asset downloads. The production implementation goes
/// through ureq; tests substitute scripted fetchers so network activity can
/// be counted and failed on demand.
///
/// `on_chunk` is invoked once per received chunk with the chunk bytes and
/// the total content length the server reported (0 when unknown). A fetch
/// that returns an error may already have delivered some chunks; callers must
/// treat the delivered prefix as garbage.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        on_chunk: &mut dyn FnMut(&[u8], u64),
    ) -> Result<(), AssetDownloadError>;
}

pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::config::Config::builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Fetcher for UreqFetcher {
    fn fetch(
        &self,
        url: &str,
        on_chunk: &mut dyn FnMut(&[u8], u64),
    ) -> Result<(), AssetDownloadError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| AssetDownloadError::Network {
                url: url.to_string(),
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !(200..300).contains(&status.as_u16()) {
            return Err(AssetDownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let mut reader = response.into_body().into_reader();
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| AssetDownloadError::Network {
                    url: url.to_string(),
                    message: format!("read failed: {e}"),
                })?;
            if bytes_read == 0 {
                break;
            }
            on_chunk(&buffer[..bytes_read], total);
        }

        Ok(())
    }
}
