//! Shared fakes and fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;

use atlas_common::{AtlasError, SiteComplexity, WorkItem};
use model_client::{Completion, Prompt, TextModel};

use crate::assembler::{PageArtifact, WordTarget, SCHEMA_VERSION};
use crate::budget::BudgetLedger;
use crate::checkpoint::CheckpointStore;
use crate::extractor::{CategoryCount, DataExtractor, MetricsStore, MonthCount};
use crate::generator::{ContentGenerator, DEFAULT_SECTIONS};
use crate::pipeline::ItemPipeline;
use crate::retry::RetryPolicy;
use crate::run_log::RunLog;
use crate::scraper::{ContentScraper, PageFetcher};
use crate::seo::SeoMetadata;
use crate::store::{ArtifactSink, FileArtifactStore};

// --- Work item fixtures ---

pub fn work_item(id: &str, tags: &[&str]) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        name: id.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        estimated_records: 100,
        complexity: SiteComplexity::Simple,
        website: None,
    }
}

pub fn work_item_sized(id: &str, tags: &[&str], estimated_records: u64) -> WorkItem {
    WorkItem {
        estimated_records,
        ..work_item(id, tags)
    }
}

pub fn work_item_with_site(id: &str, url: &str) -> WorkItem {
    WorkItem {
        website: Some(url.to_string()),
        ..work_item(id, &["unitary"])
    }
}

pub fn complex_item(id: &str, url: &str) -> WorkItem {
    WorkItem {
        complexity: SiteComplexity::Complex,
        ..work_item_with_site(id, url)
    }
}

pub fn sample_artifact(id: &str) -> PageArtifact {
    PageArtifact {
        schema_version: SCHEMA_VERSION,
        item_id: id.to_string(),
        item_name: id.to_string(),
        sections: vec![crate::generator::GeneratedSection {
            name: "overview".to_string(),
            text: "Sample overview text.".to_string(),
            word_count: 3,
            cost_cents: 2,
        }],
        missing_sections: Vec::new(),
        seo: SeoMetadata {
            title: format!("{id} planning applications"),
            description: "Sample description.".to_string(),
            structured_data: serde_json::json!({}),
            related: Vec::new(),
        },
        total_words: 3,
        total_cost_cents: 2,
        generation_ms: 10,
        scrape_strategy: None,
        complete: true,
        below_word_target: false,
        above_word_target: false,
        generated_at: Utc::now(),
    }
}

// --- Fake metrics store ---

pub struct FakeMetricsStore {
    pub items: Vec<WorkItem>,
    pub totals: HashMap<String, u64>,
    pub decisions: HashMap<String, (u64, u64)>,
    pub monthly: HashMap<String, Vec<MonthCount>>,
    pub categories: HashMap<String, Vec<CategoryCount>>,
    pub unreachable: bool,
}

impl FakeMetricsStore {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            totals: HashMap::new(),
            decisions: HashMap::new(),
            monthly: HashMap::new(),
            categories: HashMap::new(),
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::empty()
        }
    }

    fn check(&self) -> Result<()> {
        if self.unreachable {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for FakeMetricsStore {
    async fn roster(&self) -> Result<Vec<WorkItem>> {
        self.check()?;
        Ok(self.items.clone())
    }

    async fn total_applications(&self, item_id: &str) -> Result<u64> {
        self.check()?;
        Ok(self.totals.get(item_id).copied().unwrap_or(0))
    }

    async fn decision_counts(&self, item_id: &str) -> Result<(u64, u64)> {
        self.check()?;
        Ok(self.decisions.get(item_id).copied().unwrap_or((0, 0)))
    }

    async fn monthly_counts(&self, item_id: &str, _months: u32) -> Result<Vec<MonthCount>> {
        self.check()?;
        Ok(self.monthly.get(item_id).cloned().unwrap_or_default())
    }

    async fn top_categories(&self, item_id: &str, _limit: i64) -> Result<Vec<CategoryCount>> {
        self.check()?;
        Ok(self.categories.get(item_id).cloned().unwrap_or_default())
    }
}

// --- Scripted page fetcher ---

pub struct ScriptedFetcher {
    queue: std::sync::Mutex<VecDeque<Result<String, String>>>,
    default: Option<String>,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    /// Pops scripted responses in order; exhausted queue yields empty.
    pub fn returning(responses: Vec<Result<String, String>>) -> Self {
        Self {
            queue: std::sync::Mutex::new(responses.into()),
            default: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Always returns the same content.
    pub fn always(text: &str) -> Self {
        Self {
            queue: std::sync::Mutex::new(VecDeque::new()),
            default: Some(text.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next.map_err(|e| anyhow::anyhow!(e));
        }
        Ok(self.default.clone().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    // Charged like the real rendering fetcher so billing paths are
    // exercised.
    fn metered(&self) -> bool {
        true
    }
}

// --- Scripted text model ---

pub struct ScriptedModel {
    text: String,
    cost_cents: u64,
    /// (user-prompt substring, failures remaining)
    fail_markers: std::sync::Mutex<Vec<(String, u32)>>,
    /// (user-prompt substring, blank completions remaining)
    blank_markers: std::sync::Mutex<Vec<(String, u32)>>,
    /// Flag flipped on every call, simulating an operator cancelling
    /// while generation is in flight.
    trip: Option<Arc<AtomicBool>>,
    calls: AtomicU32,
}

impl ScriptedModel {
    pub fn ok(text: &str, cost_cents: u64) -> Self {
        Self {
            text: text.to_string(),
            cost_cents,
            fail_markers: std::sync::Mutex::new(Vec::new()),
            blank_markers: std::sync::Mutex::new(Vec::new()),
            trip: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `times` calls whose user prompt contains `marker`.
    pub fn failing_for(self, marker: &str, times: u32) -> Self {
        self.fail_markers
            .lock()
            .unwrap()
            .push((marker.to_string(), times));
        self
    }

    /// Return a billed-but-empty completion for the next `times` calls
    /// whose user prompt contains `marker`.
    pub fn blank_for(self, marker: &str, times: u32) -> Self {
        self.blank_markers
            .lock()
            .unwrap()
            .push((marker.to_string(), times));
        self
    }

    /// Set `flag` whenever a call lands.
    pub fn tripping(mut self, flag: Arc<AtomicBool>) -> Self {
        self.trip = Some(flag);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_marker(markers: &std::sync::Mutex<Vec<(String, u32)>>, user: &str) -> bool {
        let mut markers = markers.lock().unwrap();
        for (marker, remaining) in markers.iter_mut() {
            if *remaining > 0 && user.contains(marker.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, prompt: &Prompt, _max_tokens: u32) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref flag) = self.trip {
            flag.store(true, Ordering::Relaxed);
        }
        if Self::take_marker(&self.fail_markers, &prompt.user) {
            anyhow::bail!("scripted provider failure");
        }
        let text = if Self::take_marker(&self.blank_markers, &prompt.user) {
            String::new()
        } else {
            self.text.clone()
        };
        Ok(Completion {
            text,
            input_tokens: 100,
            output_tokens: 200,
            cost_cents: self.cost_cents,
        })
    }
}

// --- Recording artifact sink ---

pub struct RecordingSink {
    artifacts: std::sync::Mutex<Vec<PageArtifact>>,
    fail: bool,
    files: Option<Arc<FileArtifactStore>>,
}

impl RecordingSink {
    pub fn new(fail: bool, files: Option<Arc<FileArtifactStore>>) -> Self {
        Self {
            artifacts: std::sync::Mutex::new(Vec::new()),
            fail,
            files,
        }
    }

    pub fn artifacts(&self) -> Vec<PageArtifact> {
        self.artifacts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactSink for RecordingSink {
    async fn persist(&self, artifact: &PageArtifact) -> Result<(), AtlasError> {
        if self.fail {
            return Err(AtlasError::PersistenceFailed("disk full".to_string()));
        }
        if let Some(ref files) = self.files {
            files.persist(artifact).await?;
        }
        self.artifacts.lock().unwrap().push(artifact.clone());
        Ok(())
    }
}

// --- Full test environment ---

/// Everything a pipeline/orchestrator test needs, wired with fakes.
pub struct TestEnv {
    pub pipeline: Arc<ItemPipeline>,
    pub checkpoints: Arc<CheckpointStore>,
    pub ledger: Arc<BudgetLedger>,
    pub run_log: Arc<AsyncMutex<RunLog>>,
    pub sink: Arc<RecordingSink>,
    pub files: Arc<FileArtifactStore>,
    pub cancel: Arc<AtomicBool>,
    _tmp: Option<tempfile::TempDir>,
}

pub struct TestEnvBuilder {
    unreachable_store: bool,
    fail_markers: Vec<(String, u32)>,
    failing_sink: bool,
    cancel_mid_generation: bool,
    budget_cents: u64,
    data_dir: Option<PathBuf>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder {
            unreachable_store: false,
            fail_markers: Vec::new(),
            failing_sink: false,
            cancel_mid_generation: false,
            budget_cents: 0,
            data_dir: None,
        }
    }
}

impl TestEnvBuilder {
    pub fn unreachable_store(mut self) -> Self {
        self.unreachable_store = true;
        self
    }

    pub fn model_failing_for(mut self, marker: &str, times: u32) -> Self {
        self.fail_markers.push((marker.to_string(), times));
        self
    }

    pub fn failing_sink(mut self) -> Self {
        self.failing_sink = true;
        self
    }

    /// Request cancellation from inside the first model call, as if an
    /// operator hit ctrl-c while an item was generating.
    pub fn cancel_mid_generation(mut self) -> Self {
        self.cancel_mid_generation = true;
        self
    }

    pub fn budget_cents(mut self, cents: u64) -> Self {
        self.budget_cents = cents;
        self
    }

    pub fn data_dir(mut self, dir: &Path) -> Self {
        self.data_dir = Some(dir.to_path_buf());
        self
    }

    pub async fn build(self) -> TestEnv {
        let (root, tmp) = match self.data_dir {
            Some(dir) => (dir, None),
            None => {
                let tmp = tempfile::tempdir().unwrap();
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        let store = if self.unreachable_store {
            Arc::new(FakeMetricsStore::unreachable())
        } else {
            Arc::new(FakeMetricsStore::empty())
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let mut model = ScriptedModel::ok(
            "Generated copy for the page, grounded in the supplied figures.",
            10,
        );
        for (marker, times) in self.fail_markers {
            model = model.failing_for(&marker, times);
        }
        if self.cancel_mid_generation {
            model = model.tripping(cancel.clone());
        }

        let ledger = Arc::new(BudgetLedger::new(self.budget_cents));
        let checkpoints = Arc::new(CheckpointStore::open(root.join("checkpoints")).unwrap());
        let files = Arc::new(FileArtifactStore::open(root.join("pages"), None).unwrap());
        let sink = Arc::new(RecordingSink::new(self.failing_sink, Some(files.clone())));
        let run_log = Arc::new(AsyncMutex::new(RunLog::new("test-run".to_string())));

        let generator = ContentGenerator::new(
            Arc::new(model),
            ledger.clone(),
            checkpoints.clone(),
            RetryPolicy::immediate(3),
            DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect(),
            vec![
                "overview".to_string(),
                "trend-narrative".to_string(),
                "policy-summary".to_string(),
            ],
        );
        let scraper = ContentScraper::new(
            Arc::new(ScriptedFetcher::always(&page_paragraphs())),
            Arc::new(ScriptedFetcher::returning(Vec::new())),
            ledger.clone(),
            RetryPolicy::immediate(1),
        );
        let pipeline = Arc::new(ItemPipeline::new(
            DataExtractor::new(store),
            scraper,
            generator,
            sink.clone(),
            checkpoints.clone(),
            run_log.clone(),
            Vec::new(),
            WordTarget { min: 1, max: 2500 },
        ));

        TestEnv {
            pipeline,
            checkpoints,
            ledger,
            run_log,
            sink,
            files,
            cancel,
            _tmp: tmp,
        }
    }
}

fn page_paragraphs() -> String {
    (0..3)
        .map(|i| {
            format!(
                "Planning paragraph {i} describing the authority's published guidance in \
                 enough words to clear the usable-content threshold for a scrape."
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
