use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::info;

use niptuck_common::credential::{mask, validate_credential};
use niptuck_common::mcp_api::{
    ApiKeyStatus, ChartResponse, CriterionInfo, GetChartParams, PhotoSelectionResponse,
    RubricResponse, ScoreParams, SelectPhotosParams, SetApiKeyParams, TextResponse,
    TipsStateResponse, ToggleTipsParams,
};

use crate::render::charts::ChartId;
use crate::render::ScoreReport;
use crate::session::{ScoringSession, SessionStatus};

const NO_REPORT: &str = "no report yet; run score first";

#[derive(Clone)]
pub struct NipTuckServer {
    session: ScoringSession,
    tool_router: ToolRouter<NipTuckServer>,
}

impl NipTuckServer {
    pub fn new(session: ScoringSession) -> Self {
        Self {
            session,
            tool_router: Self::tool_router(),
        }
    }

    async fn api_key_status(&self) -> ApiKeyStatus {
        let credentials = self.session.credentials();
        let stored = credentials.get().await;
        ApiKeyStatus {
            configured: stored.is_some(),
            masked: stored.as_deref().map(mask),
            valid_shape: stored
                .as_deref()
                .is_some_and(|raw| validate_credential(raw).is_ok()),
            backend: credentials.backend_name().to_string(),
        }
    }

    fn photo_listing(&self) -> PhotoSelectionResponse {
        let photos = self.session.list_photos();
        PhotoSelectionResponse {
            placeholder_visible: photos.is_empty(),
            photos,
            discarded: 0,
            unreadable: Vec::new(),
        }
    }
}

#[tool_router]
impl NipTuckServer {
    #[tool(description = "List the 20 rubric criteria (code, friendly name, bucket letter) in the order they are sent to the model.")]
    async fn get_rubric(&self) -> Result<Json<RubricResponse>, String> {
        let criteria = self
            .session
            .rubric()
            .criteria()
            .iter()
            .map(|c| CriterionInfo {
                code: c.code.to_string(),
                name: c.name.to_string(),
                bucket: c.bucket().to_string(),
            })
            .collect();
        Ok(Json(RubricResponse { criteria }))
    }

    #[tool(description = "Store the Gemini API key exactly as given (validated only when scoring). An empty string clears it.")]
    async fn set_api_key(
        &self,
        Parameters(params): Parameters<SetApiKeyParams>,
    ) -> Result<Json<ApiKeyStatus>, String> {
        self.session
            .credentials()
            .set(&params.api_key)
            .await
            .map_err(|e| format!("failed to store API key: {e}"))?;
        let status = self.api_key_status().await;
        info!(configured = status.configured, valid_shape = status.valid_shape, "API key updated");
        Ok(Json(status))
    }

    #[tool(description = "Report whether an API key is stored, its masked form, and whether it looks like a Gemini key.")]
    async fn get_api_key(&self) -> Result<Json<ApiKeyStatus>, String> {
        Ok(Json(self.api_key_status().await))
    }

    #[tool(description = "Select photos by file path. Replaces any previous selection; only the first 5 are kept, in order.")]
    async fn select_photos(
        &self,
        Parameters(params): Parameters<SelectPhotosParams>,
    ) -> Result<Json<PhotoSelectionResponse>, String> {
        Ok(Json(self.session.select_photos(&params.paths).await))
    }

    #[tool(description = "Clear the photo selection.")]
    async fn reset_photos(&self) -> Result<Json<PhotoSelectionResponse>, String> {
        self.session.reset_photos();
        Ok(Json(self.photo_listing()))
    }

    #[tool(description = "List the currently selected photos.")]
    async fn list_photos(&self) -> Result<Json<PhotoSelectionResponse>, String> {
        Ok(Json(self.photo_listing()))
    }

    #[tool(description = "Score the selected photos with Gemini and return the report (headline, bucket averages, detail rows, protocol). Only one scoring call runs at a time.")]
    async fn score(
        &self,
        Parameters(params): Parameters<ScoreParams>,
    ) -> Result<Json<ScoreReport>, String> {
        self.session
            .score(&params)
            .await
            .map(Json)
            .map_err(|e| format!("{}\n{e}", e.panel().message()))
    }

    #[tool(description = "Current scoring phase (idle, in_flight, done, failed), the visible error panel, and photo count.")]
    async fn get_status(&self) -> Result<Json<SessionStatus>, String> {
        Ok(Json(self.session.status()))
    }

    #[tool(description = "Return the report from the last successful scoring call.")]
    async fn get_report(&self) -> Result<Json<ScoreReport>, String> {
        self.session
            .report()
            .map(Json)
            .ok_or_else(|| NO_REPORT.to_string())
    }

    #[tool(description = "Return one chart as SVG. chart_id is \"bell\", \"buckets\", or a bucket letter (P, D, S, Y, O).")]
    async fn get_chart(
        &self,
        Parameters(params): Parameters<GetChartParams>,
    ) -> Result<Json<ChartResponse>, String> {
        let id: ChartId = params.chart_id.parse()?;
        let chart = self.session.chart(id).ok_or_else(|| NO_REPORT.to_string())?;
        Ok(Json(ChartResponse {
            chart_id: chart.id.to_string(),
            svg: chart.svg,
        }))
    }

    #[tool(description = "Expand or collapse the expert tips for one criterion row. Returns the expanded codes.")]
    async fn toggle_tips(
        &self,
        Parameters(params): Parameters<ToggleTipsParams>,
    ) -> Result<Json<TipsStateResponse>, String> {
        let code = params.code.trim();
        if self.session.report().is_none() {
            return Err(NO_REPORT.to_string());
        }
        let expanded = self
            .session
            .toggle_tips(code)
            .ok_or_else(|| format!("no row for criterion: {code}"))?;
        Ok(Json(TipsStateResponse { expanded }))
    }

    #[tool(description = "Expand the expert tips for every row.")]
    async fn expand_all_tips(&self) -> Result<Json<TipsStateResponse>, String> {
        let expanded = self
            .session
            .expand_all_tips()
            .ok_or_else(|| NO_REPORT.to_string())?;
        Ok(Json(TipsStateResponse { expanded }))
    }

    #[tool(description = "Collapse the expert tips for every row.")]
    async fn collapse_all_tips(&self) -> Result<Json<TipsStateResponse>, String> {
        let expanded = self
            .session
            .collapse_all_tips()
            .ok_or_else(|| NO_REPORT.to_string())?;
        Ok(Json(TipsStateResponse { expanded }))
    }

    #[tool(description = "Plain-text copy of every criterion row: code, name, score, rationale and the four expert tips.")]
    async fn copy_all(&self) -> Result<Json<TextResponse>, String> {
        let text = self.session.copy_all().ok_or_else(|| NO_REPORT.to_string())?;
        Ok(Json(TextResponse { text }))
    }

    #[tool(description = "Plain-text copy of the 12-week protocol, phase by phase.")]
    async fn copy_protocol(&self) -> Result<Json<TextResponse>, String> {
        let text = self
            .session
            .copy_protocol()
            .ok_or_else(|| NO_REPORT.to_string())?;
        Ok(Json(TextResponse { text }))
    }
}

#[tool_handler]
impl ServerHandler for NipTuckServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "niptuck-scorer".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Facial-aesthetics scorer backed by Gemini. Store a key with set_api_key, pick \
3-5 photos with select_photos, then call score with sex/age/ethnicity/region. Afterwards use \
get_chart, toggle_tips, copy_all and copy_protocol against the last report; get_status shows \
the scoring phase and any error panel."
                    .to_string(),
            ),
        }
    }
}
