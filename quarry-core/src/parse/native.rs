use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::Context;
use pdfium_render::prelude::{PdfPage, PdfPageTextChar, PdfRenderConfig, Pdfium};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{instrument, Span};

use crate::{
    entities::{BBox, PageText, Word},
    ocr::{flatten_lines, OcrEngine},
};

use super::page::text_layer_spans;

const MAX_CONCURRENT_EXTRACT_REQS: usize = 10;

/// Splits the pdfium character stream into words at whitespace, merging
/// per-char tight bounds into one word bbox.
pub(crate) fn parse_page_words<'a>(
    chars: impl Iterator<Item = PdfPageTextChar<'a>>,
    page_height: f32,
) -> anyhow::Result<Vec<Word>> {
    let mut words: Vec<Word> = Vec::new();
    let mut current: Option<Word> = None;
    for char in chars {
        let unicode = char.unicode_char().unwrap_or_default();
        if unicode.is_whitespace() {
            if let Some(word) = current.take() {
                words.push(word);
            }
            continue;
        }
        let bbox = BBox::from_pdfrect(
            char.tight_bounds().context("char has no tight bounds")?,
            page_height,
        );
        match current.as_mut() {
            Some(word) => {
                word.text.push(unicode);
                word.bbox.merge(&bbox);
            }
            None => {
                current = Some(Word {
                    text: unicode.into(),
                    bbox,
                });
            }
        }
    }
    words.extend(current);
    Ok(words)
}

pub(crate) enum PageEvent {
    Opened { page_count: usize },
    Page(PageText),
}

pub(crate) struct ExtractRequest {
    pub(crate) path: PathBuf,
    pub(crate) max_pages: Option<usize>,
    pub(crate) count_only: bool,
    pub(crate) sender_tx: Sender<anyhow::Result<PageEvent>>,
}

impl ExtractRequest {
    pub(crate) fn new(
        path: &Path,
        max_pages: usize,
        sender_tx: Sender<anyhow::Result<PageEvent>>,
    ) -> Self {
        Self {
            path: path.to_owned(),
            max_pages: Some(max_pages),
            count_only: false,
            sender_tx,
        }
    }

    pub(crate) fn new_count_only(path: &Path, sender_tx: Sender<anyhow::Result<PageEvent>>) -> Self {
        Self {
            path: path.to_owned(),
            max_pages: None,
            count_only: true,
            sender_tx,
        }
    }
}

/// Handle to the dedicated pdfium worker thread. The pdfium instance and
/// the OCR engine live on that thread for the whole process lifetime;
/// requests from concurrent jobs are serialized through the queue.
#[derive(Clone)]
pub(crate) struct ExtractQueue {
    queue: Sender<(ExtractRequest, Span)>,
}

impl ExtractQueue {
    pub(crate) fn new(engine: Arc<dyn OcrEngine>) -> Self {
        let (queue_sender, queue_receiver) = mpsc::channel(MAX_CONCURRENT_EXTRACT_REQS);

        tokio::task::spawn_blocking(move || start_extract_worker(queue_receiver, engine));
        Self {
            queue: queue_sender,
        }
    }

    pub(crate) async fn push(&self, req: ExtractRequest) -> anyhow::Result<()> {
        let span = Span::current();
        self.queue
            .send((req, span))
            .await
            .context("error sending extract request")
    }
}

#[instrument(skip(page, engine))]
fn extract_page(
    page_number: usize,
    page: &PdfPage,
    engine: &dyn OcrEngine,
) -> anyhow::Result<PageText> {
    let start_time = Instant::now();
    let page_height = page.height().value;
    let words = parse_page_words(page.text()?.chars().iter(), page_height)?;

    let page_text = if words.is_empty() {
        let image = page
            .render_with_config(&PdfRenderConfig::default().scale_page_by_factor(1f32))
            .map(|bitmap| bitmap.as_image())?;
        let mut buffer: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png)?;
        let lines = engine.recognize(buffer.get_ref())?;
        PageText::Ocr {
            page: page_number,
            spans: flatten_lines(lines),
        }
    } else {
        PageText::TextLayer {
            page: page_number,
            spans: text_layer_spans(words),
        }
    };
    tracing::debug!(
        "extracting page {} took {}ms",
        page_number,
        start_time.elapsed().as_millis()
    );
    Ok(page_text)
}

fn handle_extract_req(
    pdfium: &Pdfium,
    engine: &dyn OcrEngine,
    req: ExtractRequest,
    parent_span: Span,
) -> anyhow::Result<()> {
    let _guard = parent_span.enter();
    let ExtractRequest {
        path,
        max_pages,
        count_only,
        sender_tx,
    } = req;

    let document = pdfium.load_pdf_from_file(&path, None)?;
    let page_count = document.pages().len() as usize;
    sender_tx.blocking_send(Ok(PageEvent::Opened { page_count }))?;
    if count_only {
        return Ok(());
    }
    // Admission is decided on the receiving side from the Opened event;
    // a document past the limit gets no page events.
    if max_pages.is_some_and(|max| page_count > max) {
        return Ok(());
    }

    for (index, page) in document.pages().iter().enumerate() {
        let event = extract_page(index + 1, &page, engine).map(PageEvent::Page);
        sender_tx.blocking_send(event)?;
    }
    Ok(())
}

fn start_extract_worker(mut input_rx: Receiver<(ExtractRequest, Span)>, engine: Arc<dyn OcrEngine>) {
    let pdfium = Pdfium::default();
    while let Some((req, parent_span)) = input_rx.blocking_recv() {
        if let Err(e) = handle_extract_req(&pdfium, engine.as_ref(), req, parent_span) {
            tracing::error!("error handling extract request: {e:?}");
        }
    }
}
