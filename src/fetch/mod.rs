// src/fetch/mod.rs

use reqwest::blocking::Client;
use std::{fs, path::PathBuf};
use tracing::debug;
use url::Url;

use crate::error::{PipelineError, Result};

/// Anything that can hand over the full source document as text.
/// One blocking call per run; no retries.
pub trait DocumentSource {
    fn fetch(&self) -> Result<String>;
}

/// Plain HTTP(S) GET.
pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    fn fetch_error(&self, e: impl std::fmt::Display) -> PipelineError {
        PipelineError::Fetch {
            url: self.url.to_string(),
            message: e.to_string(),
        }
    }
}

impl DocumentSource for HttpSource {
    fn fetch(&self) -> Result<String> {
        debug!("Fetching text from {}", self.url);
        self.client
            .get(self.url.clone())
            .send()
            .map_err(|e| self.fetch_error(e))?
            .error_for_status()
            .map_err(|e| self.fetch_error(e))?
            .text()
            .map_err(|e| self.fetch_error(e))
    }
}

/// A page saved to disk, addressed by a `file://` URL.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    fn fetch(&self) -> Result<String> {
        debug!("Reading document from {}", self.path.display());
        fs::read_to_string(&self.path).map_err(|e| PipelineError::Fetch {
            url: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// An in-memory document.
pub struct StaticSource(pub String);

impl DocumentSource for StaticSource {
    fn fetch(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

impl<T: DocumentSource + ?Sized> DocumentSource for Box<T> {
    fn fetch(&self) -> Result<String> {
        (**self).fetch()
    }
}

/// Pick a source by URL scheme: `file` reads from disk, everything else goes over HTTP.
pub fn source_for_url(url: &Url) -> Result<Box<dyn DocumentSource>> {
    match url.scheme() {
        "file" => {
            let path = url.to_file_path().map_err(|_| {
                PipelineError::Config(format!("{} is not a usable file path", url))
            })?;
            Ok(Box::new(FileSource::new(path)))
        }
        "http" | "https" => Ok(Box::new(HttpSource::new(url.clone()))),
        other => Err(PipelineError::Config(format!(
            "unsupported source scheme `{}`",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_file_source_reads_document() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("page.html");
        fs::write(&path, "<html><body>hi</body></html>").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let source = source_for_url(&url).unwrap();
        assert!(source.fetch().unwrap().contains("hi"));
    }

    #[test]
    fn test_missing_file_is_fetch_error() {
        let tmp = tempdir().unwrap();
        let source = FileSource::new(tmp.path().join("nope.html"));
        assert!(matches!(source.fetch(), Err(PipelineError::Fetch { .. })));
    }

    #[test]
    fn test_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/banks.html").unwrap();
        assert!(matches!(
            source_for_url(&url),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_unreachable_host_is_fetch_error() {
        // port 9 (discard) on localhost is closed in test environments
        let url = Url::parse("http://127.0.0.1:9/banks").unwrap();
        let source = HttpSource::new(url);
        assert!(matches!(source.fetch(), Err(PipelineError::Fetch { .. })));
    }
}
