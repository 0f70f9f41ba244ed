use axum::body::Body;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use serde::Deserialize;

use crate::data::filter::SearchTerms;
use crate::data::model::{short_id, Id, Pixel, PixelSet};
use crate::error::{AppError, StoreError};
use crate::export::ExportPlan;
use crate::state::{Level, SelectionContext};

use super::charts::{self, Measure};
use super::form::{FilterForm, FormErrors};
use super::session::Session;
use super::views::{DetailPage, FormView, ListPage};
use super::AppState;

pub const LIST_PATH: &str = "/pixelsets/";
pub const CLEARED_MESSAGE: &str = "Pixel Set selection has been cleared.";

fn detail_path(id: &Id) -> String {
    format!("/pixelsets/{id}")
}

/// Parse a path id; anything that is not a known Pixel Set is a 404.
fn lookup<'a>(state: &'a AppState, raw: &str) -> Result<&'a PixelSet, AppError> {
    let not_found = || AppError::NotFound(format!("No Pixel Set matches '{raw}'."));
    let id = Id::parse_str(raw).map_err(|_| not_found())?;
    state.store.pixel_set(&id).ok_or_else(not_found)
}

/// Parse the pixel files of `ids` on a blocking worker, in order.
async fn read_pixels(state: &AppState, ids: Vec<Id>) -> Result<Vec<(Id, Vec<Pixel>)>, AppError> {
    let store = state.store.clone();
    let sets = tokio::task::spawn_blocking(move || {
        ids.into_iter()
            .map(|id| -> Result<(Id, Vec<Pixel>), StoreError> {
                let ps = store.pixel_set(&id).ok_or(StoreError::NotFound(id))?;
                Ok((id, store.read_pixels(ps)?))
            })
            .collect::<Result<Vec<_>, _>>()
    })
    .await??;
    Ok(sets)
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

pub async fn index() -> Redirect {
    Redirect::to(LIST_PATH)
}

pub async fn healthz() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn list_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let form = FilterForm::parse(query.as_deref().unwrap_or(""));
    list(&state, &headers, &form, false)
}

pub async fn list_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let form = FilterForm::parse(&body);
    list(&state, &headers, &form, true)
}

fn list(
    state: &AppState,
    headers: &HeaderMap,
    form: &FilterForm,
    is_post: bool,
) -> Result<Response, AppError> {
    let mut session = Session::load(state.sessions.as_ref(), headers);
    let options = state.store.filter_options();

    let mut rejected = None;
    if form.is_submission() {
        match form.validate(&options) {
            Ok(terms) => {
                session.data.set(SelectionContext::Selection, &terms)?;
                if is_post {
                    let redirect = Redirect::to(LIST_PATH).into_response();
                    return Ok(session.save(state.sessions.as_ref(), redirect));
                }
            }
            Err(errors) => rejected = Some(FormView::from_submission(&options, form, errors)),
        }
    }

    let stored = session.data.get(SelectionContext::Selection);
    // a rejected submission shows the unfiltered list
    let filter = match rejected {
        Some(_) => None,
        None => stored.as_ref().map(|t| &t.filter),
    };
    let page = state.store.query(filter, form.page(), state.page_size);
    let form_view =
        rejected.unwrap_or_else(|| FormView::from_terms(&options, stored.as_ref()));
    let view = ListPage::build(
        &state.store,
        &page,
        form_view,
        stored.is_some(),
        session.data.take_messages(),
    );

    let response = Html(view.to_string()).into_response();
    Ok(session.save(state.sessions.as_ref(), response))
}

pub async fn clear_selection(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let mut session = Session::load(state.sessions.as_ref(), &headers);
    session.data.clear(SelectionContext::Selection);
    session.data.push_message(Level::Success, CLEARED_MESSAGE);
    let redirect = Redirect::to(LIST_PATH).into_response();
    Ok(session.save(state.sessions.as_ref(), redirect))
}

// ---------------------------------------------------------------------------
// Detail
// ---------------------------------------------------------------------------

pub async fn detail_get(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ps = lookup(&state, &raw)?;
    let session = Session::load(state.sessions.as_ref(), &headers);
    detail(&state, session, ps, FormErrors::default(), None).await
}

pub async fn detail_post(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let ps = lookup(&state, &raw)?;
    let mut session = Session::load(state.sessions.as_ref(), &headers);
    let ctx = SelectionContext::Detail(ps.id);

    let form = FilterForm::parse(&body);
    match form.omics_units() {
        Ok(units) if units.is_empty() => {
            session.data.clear(ctx);
        }
        Ok(units) => session.data.set(ctx, &SearchTerms::omics_units(units))?,
        Err(errors) => {
            return detail(&state, session, ps, errors, Some(form.omics_units_text())).await
        }
    }
    let redirect = Redirect::to(&detail_path(&ps.id)).into_response();
    Ok(session.save(state.sessions.as_ref(), redirect))
}

async fn detail(
    state: &AppState,
    mut session: Session,
    ps: &PixelSet,
    errors: FormErrors,
    submitted: Option<String>,
) -> Result<Response, AppError> {
    let terms = session.data.get(SelectionContext::Detail(ps.id));
    let pixels = read_pixels(state, vec![ps.id])
        .await?
        .pop()
        .map(|(_, pixels)| pixels)
        .unwrap_or_default();
    let mut view = DetailPage::build(
        &state.store,
        ps,
        &pixels,
        terms.as_ref(),
        state.preview_limit,
        errors,
        session.data.take_messages(),
    );
    if let Some(text) = submitted {
        view = view.with_submitted_omics_units(text);
    }
    let response = Html(view.to_string()).into_response();
    Ok(session.save(state.sessions.as_ref(), response))
}

pub async fn clear_detail(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ps = lookup(&state, &raw)?;
    let mut session = Session::load(state.sessions.as_ref(), &headers);
    session.data.clear(SelectionContext::Detail(ps.id));
    session.data.push_message(Level::Success, CLEARED_MESSAGE);
    let redirect = Redirect::to(&detail_path(&ps.id)).into_response();
    Ok(session.save(state.sessions.as_ref(), redirect))
}

// ---------------------------------------------------------------------------
// Chart data
// ---------------------------------------------------------------------------

/// Chart tables are only served to in-page scripts.
fn require_xhr(headers: &HeaderMap) -> Result<(), AppError> {
    let xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    if xhr {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "This resource is only available to XMLHttpRequest clients.".to_string(),
        ))
    }
}

pub async fn detail_values(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    detail_chart(&state, &raw, &headers, Measure::Value).await
}

pub async fn detail_quality_scores(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    detail_chart(&state, &raw, &headers, Measure::QualityScore).await
}

async fn detail_chart(
    state: &AppState,
    raw: &str,
    headers: &HeaderMap,
    measure: Measure,
) -> Result<Response, AppError> {
    require_xhr(headers)?;
    let ps = lookup(state, raw)?;
    let session = Session::load(state.sessions.as_ref(), headers);
    let wanted = session
        .data
        .get(SelectionContext::Detail(ps.id))
        .and_then(|t| t.omics_unit_set());
    let pixels = read_pixels(state, vec![ps.id])
        .await?
        .pop()
        .map(|(_, pixels)| pixels)
        .unwrap_or_default();
    let table = charts::pixel_set_table(&pixels, measure, wanted.as_ref());
    Ok(session.save(state.sessions.as_ref(), Json(table).into_response()))
}

#[derive(Debug, Clone, Copy)]
enum SelectionChart {
    PerPixelSet,
    Cumulative,
}

pub async fn selection_values(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    selection_chart(&state, &headers, Measure::Value, SelectionChart::PerPixelSet).await
}

pub async fn selection_quality_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    selection_chart(&state, &headers, Measure::QualityScore, SelectionChart::PerPixelSet).await
}

pub async fn selection_cumulative_values(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    selection_chart(&state, &headers, Measure::Value, SelectionChart::Cumulative).await
}

pub async fn selection_cumulative_quality_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    selection_chart(&state, &headers, Measure::QualityScore, SelectionChart::Cumulative).await
}

/// Tables over the Pixel Sets matching the stored selection.
async fn selection_chart(
    state: &AppState,
    headers: &HeaderMap,
    measure: Measure,
    chart: SelectionChart,
) -> Result<Response, AppError> {
    require_xhr(headers)?;
    let session = Session::load(state.sessions.as_ref(), headers);
    let terms = session.data.get(SelectionContext::Selection);
    let ids = state
        .store
        .select(terms.as_ref().map(|t| &t.filter))
        .iter()
        .map(|ps| ps.id)
        .collect();
    let wanted = terms.as_ref().and_then(SearchTerms::omics_unit_set);

    let sets: Vec<(String, Vec<Pixel>)> = read_pixels(state, ids)
        .await?
        .into_iter()
        .map(|(id, pixels)| (short_id(&id), pixels))
        .collect();
    let table = match chart {
        SelectionChart::PerPixelSet => charts::selection_table(&sets, measure, wanted.as_ref()),
        SelectionChart::Cumulative => charts::cumulative_table(&sets, measure, wanted.as_ref()),
    };
    Ok(session.save(state.sessions.as_ref(), Json(table).into_response()))
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(rename = "only-subset")]
    only_subset: Option<String>,
}

impl ExportQuery {
    pub fn only_subset(&self) -> bool {
        self.only_subset.as_deref().is_some_and(|v| !v.is_empty())
    }
}

pub async fn export_selection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let session = Session::load(state.sessions.as_ref(), &headers);
    let plan = if query.only_subset() {
        let terms = session.data.get(SelectionContext::Selection);
        let ids = state
            .store
            .select(terms.as_ref().map(|t| &t.filter))
            .iter()
            .map(|ps| ps.id)
            .collect();
        ExportPlan::selection(
            state.store.clone(),
            ids,
            terms.as_ref().and_then(SearchTerms::omics_unit_set),
        )
    } else {
        let ids = state.store.pixel_sets().iter().map(|ps| ps.id).collect();
        ExportPlan::selection(state.store.clone(), ids, None)
    };
    log::info!(
        "exporting {} Pixel Sets (only-subset: {})",
        plan.len(),
        query.only_subset()
    );
    let response = stream_export(plan)?;
    Ok(session.save(state.sessions.as_ref(), response))
}

pub async fn export_single(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let ps = lookup(&state, &raw)?;
    let session = Session::load(state.sessions.as_ref(), &headers);
    let omics_units = if query.only_subset() {
        session
            .data
            .get(SelectionContext::Detail(ps.id))
            .and_then(|t| t.omics_unit_set())
    } else {
        None
    };
    let plan = ExportPlan::single(state.store.clone(), ps.id, omics_units);
    let response = stream_export(plan)?;
    Ok(session.save(state.sessions.as_ref(), response))
}

/// Check every pixel file, then stream the CSV from a blocking worker.
fn stream_export(plan: ExportPlan) -> Result<Response, AppError> {
    plan.preflight()?;

    let filename = plan.kind().filename(chrono::Local::now().naive_local());
    let rx = plan.spawn_stream();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
