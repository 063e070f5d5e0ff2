//! HTTP API over the app registry.
//!
//! Reads take the index read lock directly. Mutations block on fsync, so
//! they run on the blocking pool.

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::{ErrorKind, StoreError};
use crate::registry::{App, AppRegistry};
use crate::security::{authorize_admin, Credentials, IdentityProvider};
use crate::store::{
    Edit, LanguageInfo, ReviewItem, StringId, SyncReport, TranslationStore, RECENT_EDITS_LIMIT,
};

pub const UPLOAD_SECRET_HEADER: &str = "X-Upload-Secret";

const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ApiState {
    registry: Arc<AppRegistry>,
    identity: Arc<dyn IdentityProvider>,
}

pub fn build_router(registry: Arc<AppRegistry>, identity: Arc<dyn IdentityProvider>) -> Router {
    Router::new()
        .route("/api/apps", get(handle_list_apps))
        .route("/api/apps/:app", get(handle_app))
        .route("/api/apps/:app/untranslated/:lang", get(handle_untranslated))
        .route("/api/apps/:app/review/:lang", get(handle_review))
        .route("/api/apps/:app/edits", get(handle_edits))
        .route("/api/apps/:app/contributors", get(handle_contributors))
        .route("/api/apps/:app/export/:lang", get(handle_export))
        .route(
            "/api/apps/:app/strings",
            post(handle_add_strings).put(handle_sync_strings),
        )
        .route("/api/apps/:app/strings/:id", delete(handle_delete_string))
        .route("/api/apps/:app/translations", post(handle_set_translation))
        .layer(middleware::from_fn(log_slow_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { registry, identity })
}

async fn log_slow_requests(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();
    if elapsed > SLOW_REQUEST_THRESHOLD {
        warn!("Slow request {} took {:?}", path, elapsed);
    }
    response
}

// ==================== Errors ====================

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Configuration | ErrorKind::Corruption | ErrorKind::Storage => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Store(e) => e.to_string(),
            ApiError::Internal(message) => message,
        };
        if status.is_server_error() {
            error!("Request failed: {}", message);
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ==================== Request / Response Types ====================

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppSummary {
    pub name: String,
    pub url: String,
    pub strings_count: usize,
    pub untranslated_count: usize,
    pub edits_count: usize,
    pub languages_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AppDetails {
    #[serde(flatten)]
    pub summary: AppSummary,
    pub languages: Vec<LanguageInfo>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceString {
    pub id: StringId,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contributor {
    pub name: String,
    pub edits: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportRow {
    pub string_id: StringId,
    pub source: String,
    pub translation: String,
}

#[derive(Debug, Deserialize)]
pub struct EditsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StringsRequest {
    pub strings: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddStringsResponse {
    pub ids: Vec<StringId>,
    pub skipped_deleted: Vec<StringId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub string_id: StringId,
    pub lang: String,
    pub text: String,
}

// ==================== Helpers ====================

fn loaded_store(app: &App) -> ApiResult<Arc<TranslationStore>> {
    Ok(Arc::clone(app.store()?))
}

fn credentials(state: &ApiState, headers: &HeaderMap) -> Credentials {
    Credentials {
        user: state.identity.identify(headers),
        upload_secret: headers
            .get(UPLOAD_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

fn require_language(app: &App, lang: &str) -> ApiResult<()> {
    if app.languages().iter().any(|l| l == lang) {
        Ok(())
    } else {
        Err(StoreError::InvalidInput(format!(
            "language {:?} is not enabled for {}",
            lang,
            app.name()
        ))
        .into())
    }
}

fn summary(app: &App, store: &TranslationStore) -> AppSummary {
    let index = store.read();
    AppSummary {
        name: app.name().to_string(),
        url: app.config().url.clone(),
        strings_count: index.strings_count(),
        untranslated_count: index.untranslated_count(),
        edits_count: index.edits_count(),
        languages_count: index.languages_count(),
    }
}

// ==================== Query Handlers ====================

async fn handle_list_apps(State(state): State<ApiState>) -> ApiResult<Json<Vec<AppSummary>>> {
    let mut apps = Vec::with_capacity(state.registry.len());
    for app in state.registry.apps() {
        let store = loaded_store(app)?;
        apps.push(summary(app, &store));
    }
    Ok(Json(apps))
}

async fn handle_app(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<AppDetails>> {
    let app = state.registry.resolve(&name)?;
    let store = loaded_store(app)?;
    let languages = store.read().language_infos();
    Ok(Json(AppDetails {
        summary: summary(app, &store),
        languages,
    }))
}

async fn handle_untranslated(
    State(state): State<ApiState>,
    Path((name, lang)): Path<(String, String)>,
) -> ApiResult<Json<Vec<SourceString>>> {
    let app = state.registry.resolve(&name)?;
    require_language(app, &lang)?;
    let store = loaded_store(app)?;
    let strings = store
        .read()
        .untranslated_strings(&lang)
        .into_iter()
        .map(|entry| SourceString {
            id: entry.id.clone(),
            text: entry.text.clone(),
        })
        .collect();
    Ok(Json(strings))
}

async fn handle_review(
    State(state): State<ApiState>,
    Path((name, lang)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ReviewItem>>> {
    let app = state.registry.resolve(&name)?;
    require_language(app, &lang)?;
    let store = loaded_store(app)?;
    let review = store.read().strings_needing_review(&lang);
    Ok(Json(review))
}

async fn handle_edits(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<EditsQuery>,
) -> ApiResult<Json<Vec<Edit>>> {
    let app = state.registry.resolve(&name)?;
    let store = loaded_store(app)?;
    let limit = query.limit.unwrap_or(RECENT_EDITS_LIMIT);
    let edits = store.read().recent_edits(limit);
    Ok(Json(edits))
}

async fn handle_contributors(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<Contributor>>> {
    let app = state.registry.resolve(&name)?;
    let store = loaded_store(app)?;
    let contributors = store
        .read()
        .contributors()
        .into_iter()
        .map(|(name, edits)| Contributor { name, edits })
        .collect();
    Ok(Json(contributors))
}

async fn handle_export(
    State(state): State<ApiState>,
    Path((name, lang)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ExportRow>>> {
    let app = state.registry.resolve(&name)?;
    require_language(app, &lang)?;
    let store = loaded_store(app)?;
    let rows = store
        .read()
        .translations_for(&lang)
        .into_iter()
        .map(|(entry, translation)| ExportRow {
            string_id: entry.id.clone(),
            source: entry.text.clone(),
            translation: translation.text.clone(),
        })
        .collect();
    Ok(Json(rows))
}

// ==================== Ingestion Handlers ====================

async fn handle_add_strings(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<StringsRequest>,
) -> ApiResult<Json<AddStringsResponse>> {
    let app = state.registry.resolve(&name)?;
    let actor = authorize_admin(
        &credentials(&state, &headers),
        &app.admins(),
        &app.config().upload_secret,
    )?;
    let store = loaded_store(app)?;

    let response = tokio::task::spawn_blocking(move || -> ApiResult<AddStringsResponse> {
        let mut response = AddStringsResponse::default();
        for text in &body.strings {
            match store.add_string(text, &actor) {
                Ok(id) => response.ids.push(id),
                Err(StoreError::StringDeleted(id)) => response.skipped_deleted.push(id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(response)
    })
    .await??;
    Ok(Json(response))
}

async fn handle_sync_strings(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<StringsRequest>,
) -> ApiResult<Json<SyncReport>> {
    let app = state.registry.resolve(&name)?;
    let actor = authorize_admin(
        &credentials(&state, &headers),
        &app.admins(),
        &app.config().upload_secret,
    )?;
    let store = loaded_store(app)?;

    let report = tokio::task::spawn_blocking(move || store.sync_strings(&body.strings, &actor))
        .await??;
    Ok(Json(report))
}

async fn handle_delete_string(
    State(state): State<ApiState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let app = state.registry.resolve(&name)?;
    let actor = authorize_admin(
        &credentials(&state, &headers),
        &app.admins(),
        &app.config().upload_secret,
    )?;
    let store = loaded_store(app)?;

    let id = StringId::from(id);
    tokio::task::spawn_blocking(move || store.delete_string(&id, &actor)).await??;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_set_translation(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TranslationRequest>,
) -> ApiResult<StatusCode> {
    let app = state.registry.resolve(&name)?;
    let actor = authorize_admin(
        &credentials(&state, &headers),
        &app.admins(),
        &app.config().upload_secret,
    )?;
    let store = loaded_store(app)?;

    tokio::task::spawn_blocking(move || {
        store.set_translation(&body.string_id, &body.lang, &body.text, &actor)
    })
    .await??;
    Ok(StatusCode::NO_CONTENT)
}
