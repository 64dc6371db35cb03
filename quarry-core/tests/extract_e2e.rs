//! Live end-to-end extraction. Needs a system pdfium library and the
//! tesseract binary; run with
//! `QUARRY_E2E_URL=https://…/doc.pdf cargo test -- --ignored`.

use std::sync::Arc;

use quarry_core::{ocr::TesseractEngine, QuarryPipeline};

#[tokio::test]
#[ignore]
async fn extracts_document_from_live_url() {
    let url = std::env::var("QUARRY_E2E_URL").expect("set QUARRY_E2E_URL to a reachable pdf");

    let engine = Arc::new(TesseractEngine::default());
    assert!(engine.is_available(), "tesseract binary not found");

    let pipeline = QuarryPipeline::new(engine);
    let doc = pipeline
        .run(&url, Some(|_: usize| {}))
        .await
        .expect("extraction failed");

    assert!(!doc.pages.is_empty());
    for (idx, page) in doc.pages.iter().enumerate() {
        assert_eq!(page.page(), idx + 1);
    }
}
