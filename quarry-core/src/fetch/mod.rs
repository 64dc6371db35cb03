use std::{io::SeekFrom, ops::Range, path::Path};

use futures::StreamExt;
use reqwest::{header, Client};
use tokio::{
    fs::OpenOptions,
    io::{AsyncSeekExt, AsyncWriteExt},
};
use tracing::instrument;

use crate::error::FetchError;

pub const CHUNK_SIZE: u64 = 1024 * 1024;
const MAX_CONCURRENT_CHUNKS: usize = 8;

/// Metadata-only probe: true iff the URL answers with a pdf content type.
/// Transport failures count as "not a pdf", never as errors.
#[instrument(skip(client))]
pub async fn probe_pdf_url(client: &Client, url: &str) -> bool {
    let response = match client.head(url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("probe failed for {url}: {e}");
            return false;
        }
    };
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(media_type_is_pdf)
        .unwrap_or(false)
}

fn media_type_is_pdf(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .eq_ignore_ascii_case("application/pdf")
}

/// Tile `[0, total)` with fixed-size ranges, last one truncated.
pub(crate) fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<Range<u64>> {
    (0..total)
        .step_by(chunk_size as usize)
        .map(|start| start..(start + chunk_size).min(total))
        .collect()
}

/// Downloads a file of known total size with concurrent byte-range requests
/// into a pre-sized destination file.
#[derive(Debug, Clone)]
pub struct ChunkedFetcher {
    client: Client,
    chunk_size: u64,
    max_concurrent: usize,
}

impl ChunkedFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            chunk_size: CHUNK_SIZE,
            max_concurrent: MAX_CONCURRENT_CHUNKS,
        }
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fetches `url` into `dest`. The destination is sized to the declared
    /// content length up front so chunk writes never extend the file, then
    /// every range is downloaded on a bounded pool. Returns only once every
    /// chunk task has finished; any failed chunk fails the whole fetch.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length().ok_or(FetchError::MissingLength)?;
        // Only the metadata of this response is used; chunks re-request
        // their own ranges below.
        drop(response);

        let file = tokio::fs::File::create(dest).await?;
        file.set_len(total).await?;
        drop(file);

        let ranges = chunk_ranges(total, self.chunk_size);
        let total_chunks = ranges.len();
        let outcomes: Vec<Result<(), FetchError>> =
            futures::stream::iter(ranges.into_iter().map(|range| {
                let client = self.client.clone();
                let url = url.to_owned();
                let dest = dest.to_owned();
                async move { fetch_chunk(&client, &url, &dest, range).await }
            }))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            if let Some(Err(first)) = outcomes.iter().find(|outcome| outcome.is_err()) {
                tracing::warn!("chunk download failed: {first}");
            }
            return Err(FetchError::ChunkFailure {
                failed,
                total: total_chunks,
            });
        }
        Ok(())
    }
}

async fn fetch_chunk(
    client: &Client,
    url: &str,
    dest: &Path,
    range: Range<u64>,
) -> Result<(), FetchError> {
    let response = client
        .get(url)
        .header(
            header::RANGE,
            format!("bytes={}-{}", range.start, range.end - 1),
        )
        .send()
        .await?
        .error_for_status()?;
    let body = response.bytes().await?;
    let want = range.end - range.start;
    if body.len() as u64 != want {
        return Err(FetchError::BadChunk {
            want,
            got: body.len() as u64,
        });
    }
    // Tasks own disjoint ranges, so positional writes need no locking. Each
    // task opens its own handle rather than sharing one.
    let mut file = OpenOptions::new().write(true).open(dest).await?;
    file.seek(SeekFrom::Start(range.start)).await?;
    file.write_all(&body).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::State,
        http::{header, HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Router,
    };
    use std::sync::Arc;

    #[derive(Clone)]
    struct Fixture {
        blob: Arc<Vec<u8>>,
        // Ranges starting at or past this offset answer 500.
        fail_from: Option<u64>,
    }

    async fn blob_handler(State(fixture): State<Fixture>, headers: HeaderMap) -> Response {
        let Some(range) = headers.get(header::RANGE) else {
            return (
                [(header::CONTENT_TYPE, "application/pdf")],
                fixture.blob.to_vec(),
            )
                .into_response();
        };
        let value = range.to_str().unwrap();
        let (start, end) = value
            .strip_prefix("bytes=")
            .unwrap()
            .split_once('-')
            .unwrap();
        let start: usize = start.parse().unwrap();
        let end: usize = end.parse().unwrap();
        if fixture
            .fail_from
            .is_some_and(|offset| start as u64 >= offset)
        {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let end = end.min(fixture.blob.len() - 1);
        (
            StatusCode::PARTIAL_CONTENT,
            fixture.blob[start..=end].to_vec(),
        )
            .into_response()
    }

    async fn spawn_fixture(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn spawn_blob_fixture(blob: Vec<u8>, fail_from: Option<u64>) -> String {
        let fixture = Fixture {
            blob: Arc::new(blob),
            fail_from,
        };
        let app = Router::new()
            .route("/doc.pdf", get(blob_handler))
            .with_state(fixture);
        spawn_fixture(app).await
    }

    fn test_blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn chunk_ranges_tile_exactly() {
        for total in [0u64, 1, 17, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1] {
            let ranges = chunk_ranges(total, CHUNK_SIZE);
            let mut covered = 0;
            for range in &ranges {
                assert_eq!(range.start, covered, "gap or overlap at {covered}");
                assert!(range.end - range.start <= CHUNK_SIZE);
                assert!(range.start < range.end);
                covered = range.end;
            }
            assert_eq!(covered, total);
        }

        let ranges = chunk_ranges(3 * CHUNK_SIZE + 7, CHUNK_SIZE);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[3].end - ranges[3].start, 7);
    }

    #[tokio::test]
    async fn fetch_reassembles_byte_identical() {
        let blob = test_blob(300_000);
        let base = spawn_blob_fixture(blob.clone(), None).await;

        let dest = tempfile::NamedTempFile::new().unwrap();
        let fetcher = ChunkedFetcher::new(Client::new()).with_chunk_size(64 * 1024);
        fetcher
            .fetch(&format!("{base}/doc.pdf"), dest.path())
            .await
            .unwrap();

        let downloaded = std::fs::read(dest.path()).unwrap();
        assert_eq!(downloaded, blob);
    }

    #[tokio::test]
    async fn fetch_fails_loud_when_any_chunk_fails() {
        let blob = test_blob(300_000);
        let base = spawn_blob_fixture(blob, Some(128 * 1024)).await;

        let dest = tempfile::NamedTempFile::new().unwrap();
        let fetcher = ChunkedFetcher::new(Client::new()).with_chunk_size(64 * 1024);
        let result = fetcher.fetch(&format!("{base}/doc.pdf"), dest.path()).await;

        match result {
            Err(FetchError::ChunkFailure { failed, total }) => {
                assert_eq!(total, 5);
                assert_eq!(failed, 3);
            }
            other => panic!("expected ChunkFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_requires_content_length() {
        async fn chunked_handler() -> Response {
            let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(
                axum::body::Bytes::from_static(b"%PDF-1.4"),
            )]);
            Response::builder()
                .header(header::CONTENT_TYPE, "application/pdf")
                .body(Body::from_stream(stream))
                .unwrap()
        }

        let app = Router::new().route("/doc.pdf", get(chunked_handler));
        let base = spawn_fixture(app).await;

        let dest = tempfile::NamedTempFile::new().unwrap();
        let fetcher = ChunkedFetcher::new(Client::new());
        let result = fetcher.fetch(&format!("{base}/doc.pdf"), dest.path()).await;
        assert!(matches!(result, Err(FetchError::MissingLength)));
    }

    #[tokio::test]
    async fn probe_accepts_pdf_media_type_only() {
        async fn pdf() -> impl IntoResponse {
            [(header::CONTENT_TYPE, "application/pdf")]
        }
        async fn pdf_with_params() -> impl IntoResponse {
            [(header::CONTENT_TYPE, "Application/PDF; charset=binary")]
        }
        async fn html() -> impl IntoResponse {
            [(header::CONTENT_TYPE, "text/html")]
        }

        let app = Router::new()
            .route("/pdf", get(pdf))
            .route("/pdf-params", get(pdf_with_params))
            .route("/html", get(html));
        let base = spawn_fixture(app).await;
        let client = Client::new();

        assert!(probe_pdf_url(&client, &format!("{base}/pdf")).await);
        assert!(probe_pdf_url(&client, &format!("{base}/pdf-params")).await);
        assert!(!probe_pdf_url(&client, &format!("{base}/html")).await);
    }

    #[tokio::test]
    async fn probe_treats_network_failure_as_invalid() {
        let client = Client::new();
        assert!(!probe_pdf_url(&client, "http://127.0.0.1:1/doc.pdf").await);
    }
}
