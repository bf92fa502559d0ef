use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::pages;
use super::AppState;
use crate::daemon::scheduler::{Clock, SystemClock};
use crate::daemon::tracker::Job;
use crate::errors::ArchiverError;
use crate::models::watch::format_timestamp;
use crate::models::{JobSnapshot, WatchForm, WatchView};
use crate::storage::find_watch;

/// Look up a job by the raw path segment. Malformed ids are simply unknown.
pub(crate) async fn find_job(state: &AppState, raw_id: &str) -> Option<Arc<Job>> {
    let id = Uuid::parse_str(raw_id).ok()?;
    state.tracker.get(id).await
}

fn to_watches() -> Response {
    Redirect::to("/watches").into_response()
}

// ---------------------------------------------------------------------------
// Ad-hoc downloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub url: String,
}

/// GET /
pub async fn download_form() -> Html<String> {
    Html(pages::download_page())
}

/// POST /
pub async fn start_download(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DownloadForm>,
) -> Result<Response, ArchiverError> {
    let url = form.url.trim().to_string();
    if url.is_empty() {
        return Err(ArchiverError::Validation("url is required".to_string()));
    }

    let job = state.tracker.create().await;
    let job_id = job.id();
    tracing::info!("Queued download job {} for {}", job_id, url);

    let downloader = Arc::clone(&state.downloader);
    tokio::spawn(async move {
        downloader.run_job(job, url).await;
    });

    Ok(Redirect::to(&format!("/progress/{}", job_id)).into_response())
}

/// GET /progress/{job_id}
pub async fn progress(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match find_job(&state, &job_id).await {
        Some(job) => Html(pages::progress_page(job.id())).into_response(),
        None => Redirect::to("/").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Watches
// ---------------------------------------------------------------------------

/// GET /watches
pub async fn list_watches(State(state): State<Arc<AppState>>) -> Html<String> {
    let today = SystemClock.today();
    let views: Vec<WatchView> = state
        .store
        .load()
        .await
        .into_iter()
        .map(|w| WatchView::new(w, today))
        .collect();
    Html(pages::watches_page(&views))
}

/// GET /watches/add
pub async fn add_watch_form() -> Html<String> {
    Html(pages::watch_form_page(None, SystemClock.today()))
}

/// POST /watches/add
pub async fn add_watch(
    State(state): State<Arc<AppState>>,
    Form(form): Form<WatchForm>,
) -> Result<Response, ArchiverError> {
    let watch = form.into_watch()?;
    tracing::info!("Adding watch '{}' ({})", watch.name, watch.id);
    state.store.insert(watch).await?;
    Ok(to_watches())
}

/// GET /watches/{id}/edit
pub async fn edit_watch_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let watches = state.store.load().await;
    match find_watch(&watches, &id) {
        Some(watch) => Html(pages::watch_form_page(Some(watch), SystemClock.today())).into_response(),
        None => to_watches(),
    }
}

/// POST /watches/{id}/edit
pub async fn edit_watch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<WatchForm>,
) -> Result<Response, ArchiverError> {
    if find_watch(&state.store.load().await, &id).is_none() {
        tracing::debug!("Edit for unknown watch {}", id);
        return Ok(to_watches());
    }

    let updated = form.into_watch()?;
    if state.store.replace(&id, updated).await? {
        tracing::info!("Updated watch {}", id);
    } else {
        tracing::debug!("Watch {} was deleted before the edit landed", id);
    }
    Ok(to_watches())
}

/// POST /watches/{id}/delete
pub async fn delete_watch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ArchiverError> {
    if state.store.remove(&id).await? {
        tracing::info!("Deleted watch {}", id);
    }
    Ok(to_watches())
}

/// POST /watches/{id}/run
///
/// Runs the watch to completion before redirecting, whether or not it is
/// enabled or inside its window.
pub async fn run_watch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ArchiverError> {
    let watches = state.store.load().await;
    let Some(watch) = find_watch(&watches, &id) else {
        return Ok(to_watches());
    };

    state.downloader.run_watch(watch).await;
    state
        .store
        .record_runs(&[(watch.id.clone(), format_timestamp(Utc::now()))])
        .await?;
    Ok(to_watches())
}

// ---------------------------------------------------------------------------
// JSON API
// ---------------------------------------------------------------------------

/// GET /api/watches
pub async fn api_list_watches(State(state): State<Arc<AppState>>) -> Json<Vec<WatchView>> {
    let today = SystemClock.today();
    Json(
        state
            .store
            .load()
            .await
            .into_iter()
            .map(|w| WatchView::new(w, today))
            .collect(),
    )
}

/// GET /api/jobs/{id}
pub async fn api_get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ArchiverError> {
    let job = find_job(&state, &id)
        .await
        .ok_or_else(|| ArchiverError::NotFound(format!("Job with id '{}' not found", id)))?;
    Ok(Json(job.snapshot(None).await))
}
