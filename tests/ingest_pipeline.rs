use std::{
    fs,
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use course_index::{
    config::BatchConfig,
    embedding::{EmbeddingClient, EmbeddingClientError, HashEmbeddingClient},
    ingest::{IngestError, RetryPolicy, VectorStoreCreator},
    processing::{DocumentProcessor, SplitterConfig, tables::TABLE_START},
    retrieval::VectorStoreLoader,
    store::{LocalStore, MetadataFilter, MetadataValue, VectorStore},
};

const DIMENSION: usize = 32;
const VIDEO_ID: &str = "dQw4w9WgXcQ";

/// Hash embeddings that reject the chosen calls (1-based) with a rate-limit error.
struct FlakyEmbedder {
    inner: HashEmbeddingClient,
    calls: Mutex<usize>,
    throttled_calls: Vec<usize>,
}

impl FlakyEmbedder {
    fn new(throttled_calls: Vec<usize>) -> Self {
        Self {
            inner: HashEmbeddingClient::new(DIMENSION),
            calls: Mutex::new(0),
            throttled_calls,
        }
    }
}

#[async_trait]
impl EmbeddingClient for FlakyEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let call = {
            let mut calls = self.calls.lock().expect("lock");
            *calls += 1;
            *calls
        };
        if self.throttled_calls.contains(&call) {
            return Err(EmbeddingClientError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            });
        }
        self.inner.generate_embeddings(texts).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

fn write_docx(path: &Path, paragraphs: &[&str], rows: &[(&str, &str)]) {
    let paragraph = |text: &str| format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>");
    let cell = |text: &str| format!("<w:tc>{}</w:tc>", paragraph(text));
    let table: String = rows
        .iter()
        .map(|&(left, right)| format!("<w:tr>{}{}</w:tr>", cell(left), cell(right)))
        .collect();
    let body: String = paragraphs.iter().map(|&text| paragraph(text)).collect();
    let xml = format!("<w:document><w:body>{body}<w:tbl>{table}</w:tbl></w:body></w:document>");

    let file = fs::File::create(path).expect("create docx");
    let mut archive = zip::ZipWriter::new(file);
    archive
        .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .expect("start entry");
    archive.write_all(xml.as_bytes()).expect("write entry");
    archive.finish().expect("finish archive");
}

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    fs::write(path, body).expect("write file");
}

fn build_corpus(root: &Path) {
    fs::create_dir_all(root.join("Session 1")).expect("session dir");
    write_docx(
        &root.join("Session 1/Session 1 Image Creation - Priya Sharma.docx"),
        &[
            "SECTION 1: First Impressions",
            "Executive presence starts before the first word is spoken.",
        ],
        &[("Trait", "Signal"), ("Posture", "Confidence")],
    );
    write(
        root,
        "Session 2/Session 2 4T Notes.md",
        &format!(
            "## SECTION 2: Time\n\nProtect the calendar before anything else.\n\n\
             Watch the recap: https://www.youtube.com/watch?v={VIDEO_ID}\n"
        ),
    );
    write(
        root,
        "100 BM Community/Community Call.md",
        "Members shared how they negotiate board seats.\n",
    );
    write(root, ".drafts/Session 3 Plan.md", "hidden draft\n");
    write(root, "Session 2/~$Session 2 4T Notes.md", "lock file\n");
    write(root, "Session 2/agenda.txt", "unsupported\n");
}

fn creator(embedder: Arc<FlakyEmbedder>, store: Arc<LocalStore>) -> VectorStoreCreator {
    VectorStoreCreator::new(
        DocumentProcessor::new(SplitterConfig::default(), SplitterConfig::table_default()),
        embedder,
        store,
        "course",
        BatchConfig {
            batch_size: 1,
            max_batch_tokens: 300_000,
            retry: RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                multiplier: 2,
                batch_pause: Duration::ZERO,
            },
        },
    )
}

#[tokio::test]
async fn corpus_is_indexed_and_filtered_retrieval_works() {
    let content = tempfile::tempdir().expect("content dir");
    let persist = tempfile::tempdir().expect("persist dir");
    build_corpus(content.path());

    let store = Arc::new(LocalStore::new(persist.path()));
    let embedder = Arc::new(FlakyEmbedder::new(vec![2]));
    let report = creator(embedder.clone(), store.clone())
        .run(content.path())
        .await
        .expect("ingestion succeeds");

    let statistics = &report.statistics;
    assert_eq!(statistics.files_discovered, 3);
    assert_eq!(statistics.documents_loaded, 3);
    assert_eq!(statistics.files_skipped, 0);
    assert_eq!(statistics.files_with_tables, 1);
    assert!(statistics.facilitators.contains("Priya Sharma"));
    assert_eq!(statistics.by_category.get("community"), Some(&1));
    let links = &statistics.youtube_links["Session 2/Session 2 4T Notes.md"];
    assert!(links.iter().all(|link| link.contains(VIDEO_ID)));

    assert_eq!(report.index.records, statistics.total_chunks);
    assert_eq!(report.index.batches, statistics.total_chunks);
    assert_eq!(report.index.retries, 1);

    let stored = store.records("course").await.expect("records");
    assert_eq!(stored.len(), statistics.total_chunks);
    for record in &stored {
        assert!(!record.content.contains(TABLE_START));
        assert!(matches!(record.metadata.get("source_file"), Some(MetadataValue::Str(_))));
    }
    let docx_chunk = stored
        .iter()
        .find(|record| record.metadata["file_format"] == MetadataValue::from("docx"))
        .expect("docx chunk stored");
    assert_eq!(docx_chunk.metadata["facilitator"], MetadataValue::from("Priya Sharma"));
    assert_eq!(docx_chunk.metadata["contains_tables"], MetadataValue::Bool(true));
    assert!(docx_chunk.content.contains("| Posture | Confidence |"));

    let index = VectorStoreLoader::new(
        store.clone(),
        Arc::new(HashEmbeddingClient::new(DIMENSION)),
        "course",
    )
    .load()
    .await
    .expect("index loads");

    let hits = index
        .search_by_session("executive presence", 2, 10)
        .await
        .expect("session search");
    assert!(!hits.is_empty());
    assert!(
        hits.iter()
            .all(|hit| hit.metadata["session_number"] == MetadataValue::Int(2))
    );

    let mut community = MetadataFilter::new();
    community.insert("category".into(), "community".into());
    let hits = index
        .search("board seats", 10, &community)
        .await
        .expect("filtered search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata["session_number"], MetadataValue::Null);

    let overview = index.statistics().await.expect("statistics");
    assert_eq!(overview.total_vectors, statistics.total_chunks);
    assert!(overview.sessions.contains(&1) && overview.sessions.contains(&2));
}

#[tokio::test]
async fn empty_root_reports_no_files() {
    let content = tempfile::tempdir().expect("content dir");
    let persist = tempfile::tempdir().expect("persist dir");
    let store = Arc::new(LocalStore::new(persist.path()));

    let result = creator(Arc::new(FlakyEmbedder::new(vec![])), store.clone())
        .run(content.path())
        .await;

    assert!(matches!(result, Err(IngestError::NoFilesFound(_))));
    assert!(store.manifest("course").await.expect("manifest").is_none());
}

#[tokio::test]
async fn reset_clears_a_previous_run() {
    let content = tempfile::tempdir().expect("content dir");
    let persist = tempfile::tempdir().expect("persist dir");
    build_corpus(content.path());
    let store = Arc::new(LocalStore::new(persist.path()));

    let first = creator(Arc::new(FlakyEmbedder::new(vec![])), store.clone());
    let report = first.run(content.path()).await.expect("first run");

    let second = creator(Arc::new(FlakyEmbedder::new(vec![])), store.clone());
    second.reset().await.expect("reset");
    second.run(content.path()).await.expect("second run");

    let stored = store.records("course").await.expect("records");
    assert_eq!(stored.len(), report.statistics.total_chunks);
}

#[tokio::test]
async fn malformed_pdf_is_skipped_and_the_run_continues() {
    let content = tempfile::tempdir().expect("content dir");
    let persist = tempfile::tempdir().expect("persist dir");
    write(
        content.path(),
        "Session 4/Session 4 Pitch Notes.md",
        "Lead with the problem, not the product.\n",
    );
    fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/broken_type3_font.pdf"),
        content.path().join("Session 4/Session 4 Slides.pdf"),
    )
    .expect("copy fixture");
    let store = Arc::new(LocalStore::new(persist.path()));

    let report = creator(Arc::new(FlakyEmbedder::new(vec![])), store.clone())
        .run(content.path())
        .await
        .expect("run survives the bad pdf");

    assert_eq!(report.statistics.files_discovered, 2);
    assert_eq!(report.statistics.documents_loaded, 1);
    assert_eq!(report.statistics.files_skipped, 1);
    assert_eq!(report.statistics.by_format.get("pdf"), None);
    let stored = store.records("course").await.expect("records");
    assert!(!stored.is_empty());
    assert!(
        stored
            .iter()
            .all(|record| record.metadata["file_format"] == MetadataValue::from("markdown"))
    );
}
