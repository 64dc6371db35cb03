use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use quarry_core::{
    entities::{DocumentMetadata, ExtractedDocument},
    fetch::{probe_pdf_url, ChunkedFetcher},
    ocr::TesseractEngine,
    utils::save_extracted_document,
    Extractor,
};
use reqwest::Client;
use std::{fmt::Write, path::PathBuf, sync::Arc, time::Instant};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Quarry - PDF text extraction from a URL",
    long_about = "Quarry downloads a remote PDF with concurrent ranged requests and extracts its text, page by page, falling back to OCR for pages without a text layer."
)]
struct Args {
    /// URL of the PDF document to extract
    url: String,

    /// Specifies the target directory where the extraction result is saved
    ///
    /// If not specified, defaults to the current working directory.
    #[arg(
        long,
        env = "QUARRY_OUTPUT_DIR",
        help = "Specify the directory to store the extraction result"
    )]
    output_dir: Option<PathBuf>,

    /// Tesseract binary used for pages without a text layer
    #[arg(long, env = "QUARRY_TESSERACT_PATH", default_value = "tesseract")]
    tesseract_path: String,

    /// Number of chunk downloads in flight
    #[arg(long, default_value = "8")]
    fetch_concurrency: usize,
}

fn setup_progress_bar(length_pages: usize) -> ProgressBar {
    let pb = ProgressBar::new(length_pages as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}",
        )
        .unwrap()
        .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
            write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap()
        })
        .progress_chars("#>-"),
    );
    pb
}

fn doc_name_from_url(url: &str) -> String {
    url.rsplit('/')
        .next()
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .map(|stem| stem.to_owned())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let client = Client::new();
    if !probe_pdf_url(&client, &args.url).await {
        eprintln!(
            "{} {} does not answer as a PDF",
            "✗".red().bold(),
            args.url
        );
        std::process::exit(1);
    }

    let staging = NamedTempFile::new().unwrap();
    let fetcher = ChunkedFetcher::new(client).with_concurrency(args.fetch_concurrency);
    if let Err(e) = fetcher.fetch(&args.url, staging.path()).await {
        eprintln!("{} download failed: {e}", "✗".red().bold());
        std::process::exit(1);
    }

    let engine = Arc::new(TesseractEngine::new(&args.tesseract_path));
    let extractor = Extractor::new(engine);

    let start_time = Instant::now();
    let length_pages = match extractor.page_count(staging.path()).await {
        Ok(count) => count,
        Err(e) => {
            eprintln!("{} can't open document: {e}", "✗".red().bold());
            std::process::exit(1);
        }
    };
    let pb = setup_progress_bar(length_pages);
    let pbc = pb.clone();

    let pages = match extractor
        .extract(
            staging.path(),
            Some(move |page_number: usize| {
                pbc.set_message(format!("Page #{page_number}"));
                pbc.inc(1u64);
            }),
        )
        .await
    {
        Ok(pages) => pages,
        Err(e) => {
            pb.abandon();
            eprintln!("{} extraction failed: {e}", "✗".red().bold());
            std::process::exit(1);
        }
    };

    let doc = ExtractedDocument {
        source: args.url.clone(),
        pages,
        metadata: DocumentMetadata::new(start_time.elapsed()),
    };
    pb.finish_with_message(format!(
        "Extracted document in {}ms",
        doc.metadata.extraction_duration.as_millis()
    ));

    let doc_name = doc_name_from_url(&args.url);
    save_extracted_document(&doc, args.output_dir.as_deref(), &doc_name).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_name_comes_from_last_url_segment() {
        assert_eq!(doc_name_from_url("https://host/papers/report.pdf"), "report");
        assert_eq!(doc_name_from_url("https://host/doc.pdf?token=abc"), "doc");
    }

    #[test]
    fn unnameable_urls_fall_back_to_a_generated_name() {
        let name = doc_name_from_url("https://host/papers/");
        assert_eq!(name.len(), 36);
    }
}
