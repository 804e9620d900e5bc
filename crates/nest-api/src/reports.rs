use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use nest_db::models::{ReportRow, ReportTransition};
use nest_types::api::{
    CreateReportRequest, CreateReportResponse, ModerationQuery, ReportResponse, ReportedListing, ReportsResponse,
    TransitionOutcome, TransitionReportsRequest, TransitionReportsResponse, UserSummary,
};
use nest_types::models::{ReportKind, ReportStatus};

use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Query};
use crate::listings::listing_not_found;
use crate::middleware::{Caller, RequestContext};
use crate::state::{AppState, AppStateInner, blocking};

/// Builds the wire view. Reporter and admin notes are only shown to moderators.
pub fn report_response(row: ReportRow, moderator_view: bool) -> ReportResponse {
    ReportResponse {
        id: row.id,
        report_type: row.report_type,
        report_type_display: row.report_type.label(),
        description: row.description,
        status: row.status,
        status_display: row.status.label(),
        reviewed_at: row.reviewed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
        listing: row.listing.map(|l| ReportedListing {
            id: l.id,
            title: l.title,
            location: l.location,
            price_pence: l.price_pence,
        }),
        reporter: moderator_view.then(|| UserSummary {
            id: row.reporter_id,
            name: row.reporter_name,
            email: row.reporter_email,
        }),
        admin_notes: moderator_view.then_some(row.admin_notes),
    }
}

fn to_reports(rows: Vec<ReportRow>, moderator_view: bool) -> ReportsResponse {
    let reports: Vec<ReportResponse> = rows.into_iter().map(|r| report_response(r, moderator_view)).collect();
    ReportsResponse {
        count: reports.len(),
        reports,
    }
}

fn require_moderator(ctx: &RequestContext) -> Result<&Caller, ApiError> {
    let caller = ctx.require()?;
    if !caller.is_moderator {
        return Err(ApiError::Forbidden("Moderator access required.".to_string()));
    }
    Ok(caller)
}

fn kind_error() -> String {
    let kinds: Vec<&str> = ReportKind::ALL.iter().map(|k| k.as_str()).collect();
    format!("Select a valid report type: {}.", kinds.join(", "))
}

/// Files a report against a listing. Every report starts out pending.
pub fn create(
    state: &AppStateInner,
    ctx: &RequestContext,
    req: CreateReportRequest,
    now: DateTime<Utc>,
) -> Result<CreateReportResponse, ApiError> {
    let caller = ctx.require()?;
    let kind_text = req.report_type.trim();
    let description = req.description.trim();

    let mut errors = ValidationErrors::new();
    let kind = if kind_text.is_empty() {
        errors.add("report_type", "This field is required.");
        None
    } else {
        match kind_text.parse::<ReportKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                errors.add("report_type", kind_error());
                None
            }
        }
    };
    errors.check(!description.is_empty(), "description", "This field is required.");
    errors.finish()?;
    let kind = kind.ok_or_else(|| ApiError::invalid("report_type", kind_error()))?;

    state.db.get_listing(req.listing_id)?.ok_or_else(listing_not_found)?;

    let report = state
        .db
        .insert_report(Uuid::new_v4(), caller.user_id, req.listing_id, kind, description, now)?;

    info!("{} reported listing {} as {}", caller.email, req.listing_id, kind);
    Ok(CreateReportResponse {
        message: "Thank you. Your report has been submitted and will be reviewed.".to_string(),
        report_id: report.id,
        status: report.status,
    })
}

pub fn list_mine(state: &AppStateInner, ctx: &RequestContext) -> Result<ReportsResponse, ApiError> {
    let caller = ctx.require()?;
    let rows = state.db.list_reports_by_reporter(caller.user_id)?;
    Ok(to_reports(rows, false))
}

/// Moderation queue, optionally restricted to one status.
pub fn list_all(state: &AppStateInner, ctx: &RequestContext, query: ModerationQuery) -> Result<ReportsResponse, ApiError> {
    require_moderator(ctx)?;
    let rows = state.db.list_reports(query.status)?;
    Ok(to_reports(rows, true))
}

fn transition_one(
    state: &AppStateInner,
    id: Uuid,
    next: ReportStatus,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, ApiError> {
    let outcome = match state.db.transition_report(id, next, notes, now)? {
        ReportTransition::Moved(updated) => TransitionOutcome {
            id,
            ok: true,
            status: Some(updated.status),
            error: None,
        },
        ReportTransition::Refused(current) => TransitionOutcome {
            id,
            ok: false,
            status: None,
            error: Some(format!(
                "Cannot move a report from {} to {}.",
                current.label(),
                next.label()
            )),
        },
        ReportTransition::Missing => TransitionOutcome {
            id,
            ok: false,
            status: None,
            error: Some("Report not found.".to_string()),
        },
    };
    Ok(outcome)
}

/// Moves each selected report to `req.status` independently. Every moved
/// report is stamped with `now`. A report that cannot move does not stop the
/// rest.
pub fn transition(
    state: &AppStateInner,
    ctx: &RequestContext,
    req: TransitionReportsRequest,
    now: DateTime<Utc>,
) -> Result<TransitionReportsResponse, ApiError> {
    let caller = require_moderator(ctx)?;
    if req.report_ids.is_empty() {
        return Err(ApiError::invalid("report_ids", "Select at least one report."));
    }

    let notes = req.notes.as_deref().map(str::trim);
    let mut outcomes = Vec::with_capacity(req.report_ids.len());
    for id in req.report_ids {
        let outcome = transition_one(state, id, req.status, notes, now)?;
        if let Some(error) = &outcome.error {
            warn!("Report {} not moved to {}: {}", id, req.status, error);
        }
        outcomes.push(outcome);
    }

    let updated = outcomes.iter().filter(|o| o.ok).count();
    info!("{} moved {} report(s) to {}", caller.email, updated, req.status);
    Ok(TransitionReportsResponse { outcomes, updated })
}

// -- Handlers --

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| create(s, &ctx, req, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn mine_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| list_mine(s, &ctx)).await?;
    Ok(Json(resp))
}

pub async fn moderation_list_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ModerationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| list_all(s, &ctx, query)).await?;
    Ok(Json(resp))
}

pub async fn transition_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<TransitionReportsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| transition(s, &ctx, req, Utc::now())).await?;
    Ok(Json(resp))
}
