/// Scoring session: photos, last report, charts and the single-flight phase machine.
///
/// `Idle -> InFlight -> Done | Failed`. Only one scoring call runs at a time; the state lock
/// is never held across an await.
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use niptuck_common::credential::{validate_credential, Credential, CredentialStore};
use niptuck_common::gemini::{GeminiClient, GeminiClientError, GenerateContentRequest};
use niptuck_common::mcp_api::{PhotoSelectionResponse, PhotoSummary, ScoreParams};

use crate::error::{ErrorPanel, ScoringError};
use crate::normalize::normalize;
use crate::photos::{Photo, PhotoIntake};
use crate::prompt::{PromptAssembler, ScoringParams};
use crate::render::charts::{Chart, ChartId, ChartRegistry};
use crate::render::{self, protocol, table, ScoreReport};
use crate::rubric::Rubric;

/// The remote generation call, as seen by the session.
pub trait ModelBackend: Send + Sync + 'static {
    fn generate(
        &self,
        credential: &Credential,
        request: GenerateContentRequest,
    ) -> impl Future<Output = Result<Value, GeminiClientError>> + Send;
}

impl ModelBackend for GeminiClient {
    fn generate(
        &self,
        credential: &Credential,
        request: GenerateContentRequest,
    ) -> impl Future<Output = Result<Value, GeminiClientError>> + Send {
        self.generate_json(credential, request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPhase {
    Idle,
    InFlight,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SessionStatus {
    pub phase: ScoringPhase,
    /// The one error panel currently shown, if any.
    pub panel: Option<ErrorPanel>,
    pub message: Option<String>,
    pub photos: usize,
    pub placeholder_visible: bool,
    pub has_report: bool,
}

struct LastScore {
    report: ScoreReport,
    copy_protocol: String,
}

struct SessionState {
    phase: ScoringPhase,
    panel: Option<ErrorPanel>,
    photos: PhotoIntake,
    last: Option<LastScore>,
    charts: ChartRegistry,
    tips: table::TipsView,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: ScoringPhase::Idle,
            panel: None,
            photos: PhotoIntake::new(),
            last: None,
            charts: ChartRegistry::new(),
            tips: table::TipsView::new(),
        }
    }
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts the session back to `Failed` if a scoring future is dropped mid-flight.
struct InFlightGuard {
    state: SharedState,
    armed: bool,
}

impl InFlightGuard {
    fn new(state: SharedState) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("scoring call dropped while in flight");
            lock(&self.state).phase = ScoringPhase::Failed;
        }
    }
}

pub struct ScoringSession<B = GeminiClient> {
    state: SharedState,
    credentials: CredentialStore,
    backend: Arc<B>,
    assembler: PromptAssembler,
    rubric: Rubric,
}

impl<B> Clone for ScoringSession<B> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            credentials: self.credentials.clone(),
            backend: Arc::clone(&self.backend),
            assembler: self.assembler,
            rubric: self.rubric,
        }
    }
}

impl<B: ModelBackend> ScoringSession<B> {
    pub fn new(credentials: CredentialStore, backend: Arc<B>, temperature: f64) -> Self {
        let rubric = Rubric::unified();
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            credentials,
            backend,
            assembler: PromptAssembler::new(rubric, temperature),
            rubric,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Replace the photo selection. Files are read before the swap, so an in-flight call
    /// keeps the photos it started with.
    pub async fn select_photos<P: AsRef<Path>>(&self, paths: &[P]) -> PhotoSelectionResponse {
        let mut intake = PhotoIntake::new();
        let outcome = intake.select_files(paths).await;
        let response = PhotoSelectionResponse {
            photos: intake.summaries(),
            discarded: outcome.discarded,
            unreadable: outcome.unreadable,
            placeholder_visible: intake.placeholder_visible(),
        };
        lock(&self.state).photos = intake;
        response
    }

    pub fn reset_photos(&self) {
        lock(&self.state).photos.reset();
    }

    pub fn list_photos(&self) -> Vec<PhotoSummary> {
        lock(&self.state).photos.summaries()
    }

    pub fn status(&self) -> SessionStatus {
        let state = lock(&self.state);
        SessionStatus {
            phase: state.phase,
            panel: state.panel,
            message: state.panel.map(|p| p.message().to_string()),
            photos: state.photos.len(),
            placeholder_visible: state.photos.placeholder_visible(),
            has_report: state.last.is_some(),
        }
    }

    /// Run one scoring attempt end to end and install its report.
    pub async fn score(&self, params: &ScoreParams) -> Result<ScoreReport, ScoringError> {
        let photos = {
            let mut state = lock(&self.state);
            if state.phase == ScoringPhase::InFlight {
                return Err(ScoringError::InFlight);
            }
            state.panel = None;
            if state.photos.is_empty() {
                state.phase = ScoringPhase::Failed;
                state.panel = Some(ErrorPanel::NoPhotos);
                return Err(ScoringError::NoPhotosSelected);
            }
            state.phase = ScoringPhase::InFlight;
            state.photos.photos().to_vec()
        };

        let mut guard = InFlightGuard::new(Arc::clone(&self.state));
        let outcome = self.call_model(&photos, params).await;
        guard.disarm();

        let mut state = lock(&self.state);
        match outcome {
            Ok(raw) => {
                let result = normalize(&raw);
                let state = &mut *state;
                let report = render::render(&result, &self.rubric, &mut state.charts);
                info!(
                    total = result.total_weighted,
                    source = ?result.total_source,
                    criteria = result.per_criterion.len(),
                    images = result.per_image.len(),
                    "scoring complete"
                );
                state.tips.collapse_all();
                state.last = Some(LastScore {
                    copy_protocol: protocol::copy_protocol(&result.protocol),
                    report: report.clone(),
                });
                state.phase = ScoringPhase::Done;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, panel = ?e.panel(), "scoring failed");
                state.phase = ScoringPhase::Failed;
                state.panel = Some(e.panel());
                Err(e)
            }
        }
    }

    async fn call_model(
        &self,
        photos: &[Photo],
        params: &ScoreParams,
    ) -> Result<Value, ScoringError> {
        let override_key = params
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string);
        let raw_key = match override_key {
            Some(key) => key,
            None => self
                .credentials
                .get()
                .await
                .ok_or(ScoringError::MissingCredential)?,
        };
        let credential = validate_credential(&raw_key)?;

        let request = self
            .assembler
            .build(photos, &ScoringParams::from_tool(params))?;
        info!(
            images = photos.len().min(crate::photos::MAX_PHOTOS),
            parts = request.part_count(),
            "sending scoring request"
        );
        Ok(self.backend.generate(&credential, request).await?)
    }

    pub fn report(&self) -> Option<ScoreReport> {
        lock(&self.state).last.as_ref().map(|l| l.report.clone())
    }

    pub fn chart(&self, id: ChartId) -> Option<Chart> {
        lock(&self.state).charts.get(id).cloned()
    }

    /// Flip one tip panel. `None` when there is no report or no such row.
    pub fn toggle_tips(&self, code: &str) -> Option<Vec<String>> {
        let mut state = lock(&self.state);
        let state = &mut *state;
        let rows = &state.last.as_ref()?.report.rows;
        state.tips.toggle(rows, code)?;
        Some(state.tips.expanded_codes(rows))
    }

    pub fn expand_all_tips(&self) -> Option<Vec<String>> {
        let mut state = lock(&self.state);
        let state = &mut *state;
        let rows = &state.last.as_ref()?.report.rows;
        state.tips.expand_all(rows);
        Some(state.tips.expanded_codes(rows))
    }

    pub fn collapse_all_tips(&self) -> Option<Vec<String>> {
        let mut state = lock(&self.state);
        state.last.as_ref()?;
        state.tips.collapse_all();
        Some(Vec::new())
    }

    pub fn copy_all(&self) -> Option<String> {
        lock(&self.state)
            .last
            .as_ref()
            .map(|l| table::copy_all(&l.report.rows))
    }

    pub fn copy_protocol(&self) -> Option<String> {
        lock(&self.state)
            .last
            .as_ref()
            .map(|l| l.copy_protocol.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use niptuck_common::kv::{FileStore, KeyValueStore};
    use niptuck_common::mcp_api::Sex;
    use serde_json::json;
    use tokio::sync::Notify;

    const KEY: &str = "AIzaSyA1234567890abcdefghij_-XYZ";

    #[derive(Default)]
    struct StubBackend {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    impl ModelBackend for StubBackend {
        fn generate(
            &self,
            _credential: &Credential,
            request: GenerateContentRequest,
        ) -> impl Future<Output = Result<Value, GeminiClientError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.clone();
            let fail = self.fail;
            async move {
                assert!(request.part_count() >= 2);
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if fail {
                    return Err(GeminiClientError::NoJson { text_len: 0 });
                }
                Ok(json!({
                    "aggregate": { "total_weighted": 74.0 },
                    "per_criterion": {
                        "P1": { "score": 4.0, "rationale_140": "Balanced thirds. Keep posture tall." },
                        "S10": 3.5
                    },
                    "protocol": { "weeks_1_4": ["SPF daily"] },
                    "data_needed": ["smile_clip"]
                }))
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        session: ScoringSession<StubBackend>,
        backend: Arc<StubBackend>,
        photo: std::path::PathBuf,
    }

    fn fixture(backend: StubBackend) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(KeyValueStore::File(FileStore::new(
            dir.path().join("credentials.json"),
        )));
        let photo = dir.path().join("front.jpg");
        std::fs::write(&photo, b"jpeg bytes").expect("write photo");
        let backend = Arc::new(backend);
        Fixture {
            session: ScoringSession::new(store, Arc::clone(&backend), 0.2),
            backend,
            photo,
            _dir: dir,
        }
    }

    fn params() -> ScoreParams {
        ScoreParams {
            sex: Sex::Female,
            age: None,
            ethnicity: None,
            region_standard: None,
            goals: None,
            api_key: None,
        }
    }

    #[tokio::test]
    async fn no_photos_fails_before_any_network_call() {
        let f = fixture(StubBackend::default());
        f.session.credentials().set(KEY).await.expect("store key");

        let err = f.session.score(&params()).await.unwrap_err();
        assert!(matches!(err, ScoringError::NoPhotosSelected));
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 0);

        let status = f.session.status();
        assert_eq!(status.phase, ScoringPhase::Failed);
        assert_eq!(status.panel, Some(ErrorPanel::NoPhotos));
        assert!(status.placeholder_visible);
    }

    #[tokio::test]
    async fn credential_checks_run_after_photos() {
        let f = fixture(StubBackend::default());
        f.session.select_photos(&[&f.photo]).await;

        let err = f.session.score(&params()).await.unwrap_err();
        assert!(matches!(err, ScoringError::MissingCredential));
        assert_eq!(f.session.status().panel, Some(ErrorPanel::KeyMissing));

        f.session
            .credentials()
            .set("https://example.com/?key=AIza")
            .await
            .expect("store key");
        let err = f.session.score(&params()).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidCredentialShape));
        assert_eq!(f.session.status().panel, Some(ErrorPanel::KeyInvalid));
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_score_installs_report_and_clears_panel() {
        let f = fixture(StubBackend::default());
        f.session.select_photos(&[&f.photo]).await;
        assert!(f.session.score(&params()).await.is_err());

        let mut with_key = params();
        with_key.api_key = Some(format!(" {KEY} "));
        let report = f.session.score(&with_key).await.expect("report");
        assert_eq!(report.headline.total, "74.0");
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 1);

        let status = f.session.status();
        assert_eq!(status.phase, ScoringPhase::Done);
        assert_eq!(status.panel, None);
        assert!(status.has_report);

        assert!(f.session.chart(ChartId::Bell).is_some());
        assert_eq!(f.session.toggle_tips("P1"), Some(vec!["P1".to_string()]));
        assert_eq!(f.session.toggle_tips("Z9"), None);
        assert_eq!(
            f.session.expand_all_tips(),
            Some(vec!["P1".to_string(), "S10".to_string()])
        );
        assert_eq!(f.session.collapse_all_tips(), Some(Vec::new()));
        assert!(f
            .session
            .copy_all()
            .unwrap()
            .starts_with("P1 Facial thirds balance\nScore: 4.00\nWhy: Balanced thirds."));
        assert!(f
            .session
            .copy_protocol()
            .unwrap()
            .starts_with("Weeks 1-4\n- SPF daily"));
    }

    #[tokio::test]
    async fn unreadable_model_output_shows_model_panel() {
        let f = fixture(StubBackend {
            fail: true,
            ..StubBackend::default()
        });
        f.session.credentials().set(KEY).await.expect("store key");
        f.session.select_photos(&[&f.photo]).await;

        let err = f.session.score(&params()).await.unwrap_err();
        assert!(matches!(err, ScoringError::ModelOutput(_)));
        let status = f.session.status();
        assert_eq!(status.phase, ScoringPhase::Failed);
        assert_eq!(status.panel, Some(ErrorPanel::Model));
        assert!(!status.has_report);
        assert_eq!(f.session.copy_all(), None);
    }

    #[tokio::test]
    async fn second_score_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let f = fixture(StubBackend {
            gate: Some(Arc::clone(&gate)),
            ..StubBackend::default()
        });
        f.session.credentials().set(KEY).await.expect("store key");
        f.session.select_photos(&[&f.photo]).await;

        let first = {
            let session = f.session.clone();
            tokio::spawn(async move { session.score(&params()).await })
        };
        while f.session.status().phase != ScoringPhase::InFlight {
            tokio::task::yield_now().await;
        }

        let err = f.session.score(&params()).await.unwrap_err();
        assert!(matches!(err, ScoringError::InFlight));
        assert_eq!(err.panel(), ErrorPanel::Busy);

        gate.notify_one();
        first.await.expect("join").expect("first score");
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.session.status().phase, ScoringPhase::Done);
    }

    #[tokio::test]
    async fn dropping_an_in_flight_call_marks_the_session_failed() {
        let f = fixture(StubBackend {
            gate: Some(Arc::new(Notify::new())),
            ..StubBackend::default()
        });
        f.session.credentials().set(KEY).await.expect("store key");
        f.session.select_photos(&[&f.photo]).await;

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), f.session.score(&params())).await;
        assert!(timed_out.is_err());
        assert_eq!(f.session.status().phase, ScoringPhase::Failed);

        // A new attempt is allowed again.
        let again = tokio::time::timeout(Duration::from_millis(50), f.session.score(&params())).await;
        assert!(again.is_err());
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reselection_replaces_photos() {
        let f = fixture(StubBackend::default());
        let response = f.session.select_photos(&[&f.photo, &f.photo]).await;
        assert_eq!(response.photos.len(), 2);
        assert_eq!(f.session.list_photos().len(), 2);
        f.session.reset_photos();
        assert!(f.session.list_photos().is_empty());
        assert!(f.session.status().placeholder_visible);
    }
}
