use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context};
use tokio::sync::mpsc;
use tracing::instrument;

use super::native::{ExtractQueue, ExtractRequest, PageEvent};
use crate::{entities::PageText, error::ExtractError, ocr::OcrEngine};

/// Largest staged file admitted for extraction, inclusive.
pub const MAX_DOC_BYTES: u64 = 50 * 1024 * 1024;
/// Largest page count admitted for extraction, inclusive.
pub const MAX_DOC_PAGES: usize = 2000;

fn within_size_guard(bytes: u64) -> bool {
    bytes <= MAX_DOC_BYTES
}

fn within_page_guard(pages: usize) -> bool {
    pages <= MAX_DOC_PAGES
}

/// Page orchestrator. Owns the queue to the pdfium worker thread and
/// turns a staged file into ordered per-page results.
#[derive(Clone)]
pub struct Extractor {
    queue: ExtractQueue,
}

impl Extractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            queue: ExtractQueue::new(engine),
        }
    }

    /// Total page count of a staged document, without extracting anything.
    pub async fn page_count(&self, path: &Path) -> Result<usize, ExtractError> {
        let (event_tx, mut event_rx) = mpsc::channel(1);
        self.queue
            .push(ExtractRequest::new_count_only(path, event_tx))
            .await?;
        match event_rx.recv().await {
            Some(Ok(PageEvent::Opened { page_count })) => Ok(page_count),
            Some(Ok(PageEvent::Page(_))) => {
                Err(anyhow!("worker answered a count request with a page").into())
            }
            Some(Err(e)) => Err(ExtractError::Internal(e)),
            None => Err(anyhow!("pdf worker dropped the document before opening it").into()),
        }
    }

    /// Extracts every admitted page of the staged document, in page
    /// order. The optional callback fires once per finished page.
    #[instrument(skip(self, page_callback), fields(path = %path.display()))]
    pub async fn extract<F>(
        &self,
        path: &Path,
        page_callback: Option<F>,
    ) -> Result<Vec<PageText>, ExtractError>
    where
        F: Fn(usize) + Send + 'static,
    {
        let staged_bytes = tokio::fs::metadata(path)
            .await
            .context("can't stat staged file")?
            .len();
        if !within_size_guard(staged_bytes) {
            tracing::info!(staged_bytes, "rejecting document: staged file too large");
            return Err(ExtractError::GuardRejected);
        }

        let (event_tx, mut event_rx) = mpsc::channel(32);
        self.queue
            .push(ExtractRequest::new(path, MAX_DOC_PAGES, event_tx))
            .await?;

        let mut pages = Vec::new();
        let mut opened = false;
        while let Some(event) = event_rx.recv().await {
            match event {
                Ok(PageEvent::Opened { page_count }) => {
                    opened = true;
                    if !within_page_guard(page_count) {
                        tracing::info!(page_count, "rejecting document: too many pages");
                        return Err(ExtractError::GuardRejected);
                    }
                    pages.reserve(page_count);
                }
                Ok(PageEvent::Page(page)) => {
                    if let Some(callback) = &page_callback {
                        callback(page.page());
                    }
                    pages.push(page);
                }
                Err(e) => return Err(ExtractError::Internal(e)),
            }
        }
        if !opened {
            return Err(anyhow!("pdf worker dropped the document before opening it").into());
        }
        pages.sort_by_key(|p| p.page());
        Ok(pages)
    }
}
