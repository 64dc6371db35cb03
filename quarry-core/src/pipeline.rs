use std::{sync::Arc, time::Instant};

use anyhow::Context;
use reqwest::Client;
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::{
    entities::{DocumentMetadata, ExtractedDocument},
    error::ExtractError,
    fetch::{probe_pdf_url, ChunkedFetcher},
    ocr::OcrEngine,
    parse::document::Extractor,
};

/// Composes validator, chunked fetcher and page orchestrator into the
/// one externally invoked operation. A single instance serves all
/// requests; every job stages into its own temp file.
#[derive(Clone)]
pub struct QuarryPipeline {
    client: Client,
    fetcher: ChunkedFetcher,
    extractor: Extractor,
}

impl QuarryPipeline {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        let client = Client::new();
        Self {
            fetcher: ChunkedFetcher::new(client.clone()),
            extractor: Extractor::new(engine),
            client,
        }
    }

    pub fn with_fetch_concurrency(mut self, max_concurrent: usize) -> Self {
        self.fetcher = self.fetcher.with_concurrency(max_concurrent);
        self
    }

    /// Validates the url, downloads the document into a job-scoped
    /// staging file and extracts every page. The staging file is
    /// deleted on every exit path when the handle drops.
    #[instrument(skip(self, page_callback))]
    pub async fn run<F>(
        &self,
        url: &str,
        page_callback: Option<F>,
    ) -> Result<ExtractedDocument, ExtractError>
    where
        F: Fn(usize) + Send + 'static,
    {
        let start_time = Instant::now();
        if !probe_pdf_url(&self.client, url).await {
            return Err(ExtractError::Validation);
        }

        let staging = NamedTempFile::new().context("can't create staging file")?;
        self.fetcher.fetch(url, staging.path()).await?;
        let pages = self.extractor.extract(staging.path(), page_callback).await?;

        Ok(ExtractedDocument {
            source: url.to_owned(),
            pages,
            metadata: DocumentMetadata::new(start_time.elapsed()),
        })
    }
}
