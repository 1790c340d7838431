//! Contract retrieval.
//!
//! Pure I/O boundary: a fetcher reads the document and decodes it into a
//! [`Contract`], nothing else. No retries and no store access.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use contract_sync_core::config::FetchSettings;
use contract_sync_core::types::{DocumentFormat, SourceLocation};

use crate::contract::Contract;
use crate::error::FetchError;

const ACCEPT: &str = "application/json, application/yaml;q=0.9, application/x-yaml;q=0.9, */*;q=0.1";

/// Retrieves a contract document from a location.
pub trait ContractFetcher {
    fn fetch(&self, source: &SourceLocation) -> Result<Contract, FetchError>;
}

/// Fetches `http(s)://` locations with `ureq` and file locations from disk.
#[derive(Clone)]
pub struct LocationFetcher {
    agent: ureq::Agent,
    format: DocumentFormat,
    max_bytes: u64,
    headers: Vec<(String, String)>,
}

impl LocationFetcher {
    pub fn new(settings: &FetchSettings, format: DocumentFormat) -> Self {
        Self::with_timeout(settings.timeout(), settings.max_bytes, format).with_headers(
            settings
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        )
    }

    pub fn with_timeout(timeout: Duration, max_bytes: u64, format: DocumentFormat) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("contract-sync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            format,
            max_bytes,
            headers: Vec::new(),
        }
    }

    /// Extra headers sent with every HTTP request.
    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = self
            .headers
            .iter()
            .fold(self.agent.get(url).set("Accept", ACCEPT), |req, (name, value)| {
                req.set(name, value)
            });
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    message: transport.to_string(),
                })
            }
        };

        tracing::debug!(
            "GET {url} -> {} ({})",
            response.status(),
            response.content_type()
        );

        let mut body = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: format!("reading body: {e}"),
            })?;
        self.check_size(url, body.len())?;
        Ok(body)
    }

    fn fetch_file(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        let io = |source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut body = Vec::new();
        File::open(path)
            .map_err(io)?
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(io)?;
        self.check_size(&path.display().to_string(), body.len())?;
        Ok(body)
    }

    fn check_size(&self, location: &str, len: usize) -> Result<(), FetchError> {
        if len as u64 > self.max_bytes {
            return Err(FetchError::TooLarge {
                location: location.to_string(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl ContractFetcher for LocationFetcher {
    fn fetch(&self, source: &SourceLocation) -> Result<Contract, FetchError> {
        let raw = match source {
            SourceLocation::Http(url) => self.fetch_http(url)?,
            SourceLocation::File(path) => self.fetch_file(path)?,
        };
        tracing::debug!("fetched {} bytes from {source}", raw.len());
        Contract::parse(raw, self.format, source.clone())
    }
}
