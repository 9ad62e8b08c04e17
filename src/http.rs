//! The thin HTTP adapter (§6, §9): request parsing, routing, and the
//! `ErrorKind` -> status-code mapping. No business logic lives here —
//! every handler's job is to turn query-string parameters into a
//! [`DealsQuery`]/[`TopDstStore::top`] call and render the result.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::codes::code_to_iata;
use crate::error::{Error, ErrorKind};
use crate::query::DealsQueryBuilder;
use crate::wire::encode_deals_top_body;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/deals/add", post(deals_add))
        .route("/deals/top", get(deals_top))
        .route("/destinations/top", get(destinations_top))
        .route("/deals/clear", get(deals_clear))
        .route("/destinations/clear", get(destinations_clear))
        .route("/clear", get(clear_all))
        .route("/ping", get(ping))
        .route("/quit", get(quit))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Maps an [`Error`] to the HTTP status §7 assigns its [`ErrorKind`],
/// logging at the level §7 assigns that kind.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::BadParameter => {
                tracing::debug!(error = %self, "bad parameter");
                StatusCode::BAD_REQUEST
            }
            ErrorKind::LockTimeout => {
                tracing::warn!(error = %self, "lock timeout");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::StoreFull => {
                tracing::error!(error = %self, "store full or record too large");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::NotFound => {
                tracing::warn!(error = %self, "referenced record not found");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::Fatal => {
                tracing::error!(error = %self, "fatal store error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Returns `503` for every route while the process is draining (§7).
fn reject_if_draining(state: &AppState) -> Option<Response> {
    state.is_draining().then(|| (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response())
}

#[derive(Debug, Deserialize)]
pub struct DealsAddParams {
    pub locale: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    pub return_date: Option<String>,
    pub price: u32,
    pub direct_flight: bool,
    /// Not part of §6.1's documented parameter list: the original
    /// implementation resolves a destination's country from an internal
    /// geo database (out of scope, §1). This crate ships a small built-in
    /// lookup (`airports::lookup_country`) and accepts this as an escape
    /// hatch for any airport the lookup doesn't know.
    pub destination_country: Option<String>,
}

async fn deals_add(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DealsAddParams>,
    body: axum::body::Bytes,
) -> Result<Response, Error> {
    if let Some(resp) = reject_if_draining(&state) {
        return Ok(resp);
    }

    let destination_country = match &params.destination_country {
        Some(country) => country.clone(),
        None => crate::airports::lookup_country(&params.destination)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::bad_parameter(
                    "destination_country",
                    format!("no built-in country mapping for '{}'; pass destination_country explicitly", params.destination),
                )
            })?,
    };

    state.deals.add_deal(
        &params.origin,
        &params.destination,
        &destination_country,
        &params.departure_date,
        params.return_date.as_deref(),
        params.direct_flight,
        params.price,
        &body,
    )?;
    state
        .top_destinations
        .record(&params.locale, &params.destination, &params.departure_date)?;
    Ok(StatusCode::OK.into_response())
}

#[derive(Debug, Deserialize)]
pub struct DealsTopParams {
    pub origin: String,
    pub destinations: Option<String>,
    pub departure_date_from: Option<String>,
    pub departure_date_to: Option<String>,
    pub departure_days_of_week: Option<String>,
    pub return_date_from: Option<String>,
    pub return_date_to: Option<String>,
    pub return_days_of_week: Option<String>,
    pub stay_from: Option<u8>,
    pub stay_to: Option<u8>,
    pub direct_flights: Option<bool>,
    pub roundtrip_flights: Option<bool>,
    pub price_from: Option<u32>,
    pub price_to: Option<u32>,
    #[serde(default)]
    pub deals_limit: Option<usize>,
    pub timelimit: Option<u32>,
    #[serde(default)]
    pub day_by_day: bool,
    #[serde(default)]
    pub add_locale_top: bool,
    pub locale: Option<String>,
}

async fn deals_top(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DealsTopParams>,
) -> Result<Response, Error> {
    if let Some(resp) = reject_if_draining(&state) {
        return Ok(resp);
    }

    let mut builder = DealsQueryBuilder::new(params.origin);
    if let Some(d) = &params.destinations {
        builder = builder.destinations(d.clone());
    }
    if let (Some(from), Some(to)) = (&params.departure_date_from, &params.departure_date_to) {
        builder = builder.departure_range(from.clone(), to.clone());
    }
    if let (Some(from), Some(to)) = (&params.return_date_from, &params.return_date_to) {
        builder = builder.return_range(from.clone(), to.clone());
    }
    if let Some(d) = &params.departure_days_of_week {
        builder = builder.departure_weekdays(d.clone());
    }
    if let Some(d) = &params.return_days_of_week {
        builder = builder.return_weekdays(d.clone());
    }
    if let (Some(from), Some(to)) = (params.stay_from, params.stay_to) {
        builder = builder.stay_range(from, to);
    }
    if let Some(direct) = params.direct_flights {
        builder = builder.direct_flights(direct);
    }
    if let Some(roundtrip) = params.roundtrip_flights {
        builder = builder.roundtrip_flights(roundtrip);
    }
    if params.price_from.is_some() || params.price_to.is_some() {
        // Mirrors the original's unconditional `query.price(price_from,
        // price_to)` call with each side defaulting to 0 when absent.
        builder = builder.price_range(params.price_from.unwrap_or(0), params.price_to.unwrap_or(0));
    }
    if let Some(secs) = params.timelimit {
        builder = builder.max_lifetime_sec(secs);
    }
    if let Some(limit) = params.deals_limit {
        builder = builder.limit(limit);
    }

    if params.add_locale_top {
        let locale = params
            .locale
            .as_deref()
            .ok_or_else(|| Error::bad_parameter("locale", "required when add_locale_top=true"))?;
        let top = state.top_destinations.top(locale, None, None, usize::MAX)?;
        let csv: Vec<String> = top.iter().map(|(dest, _)| code_to_iata(*dest)).collect();
        if !csv.is_empty() {
            builder = builder.destinations(csv.join(","));
        }
    }

    let query = builder.build()?;
    let results = if params.day_by_day {
        state.deals.search_per_day(&query)?
    } else {
        state.deals.search_per_destination(&query)?
    };

    if results.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let blobs: Vec<&[u8]> = results.iter().map(|r| r.data.as_slice()).collect();
    let body = encode_deals_top_body(&blobs);
    Ok(([("content-type", "application/octet-stream")], body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DestinationsTopParams {
    pub locale: String,
    pub departure_date_from: Option<String>,
    pub departure_date_to: Option<String>,
    pub destinations_limit: Option<usize>,
    pub timelimit: Option<u32>,
}

async fn destinations_top(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DestinationsTopParams>,
) -> Result<Response, Error> {
    if let Some(resp) = reject_if_draining(&state) {
        return Ok(resp);
    }
    let dep_from = params.departure_date_from.as_deref().map(crate::dates::date_to_int).transpose()?;
    let dep_to = params.departure_date_to.as_deref().map(crate::dates::date_to_int).transpose()?;
    let limit = params.destinations_limit.unwrap_or(crate::query::DEFAULT_DEALS_LIMIT);

    let top = state.top_destinations.top(&params.locale, dep_from, dep_to, limit)?;
    let body = top
        .into_iter()
        .map(|(dest, count)| format!("{};{}", code_to_iata(dest), count))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(([("content-type", "text/plain")], body).into_response())
}

async fn deals_clear(State(state): State<Arc<AppState>>) -> StatusCode {
    state.deals.truncate();
    StatusCode::OK
}

async fn destinations_clear(State(state): State<Arc<AppState>>) -> StatusCode {
    state.top_destinations.truncate();
    StatusCode::OK
}

async fn clear_all(State(state): State<Arc<AppState>>) -> StatusCode {
    state.deals.truncate();
    state.top_destinations.truncate();
    StatusCode::OK
}

async fn ping() -> &'static str {
    "pong"
}

/// Begins graceful drain: subsequent requests are refused with `503`
/// until the process exits (§7). The accept loop / signal wiring that
/// actually stops the server lives in `bin/server.rs`.
async fn quit(State(state): State<Arc<AppState>>) -> StatusCode {
    state.begin_drain();
    StatusCode::OK
}

async fn stats(State(state): State<Arc<AppState>>) -> axum::Json<serde_json::Value> {
    let deals = state.deals.stats();
    axum::Json(serde_json::json!({
        "deals_info_pages": deals.info_pages,
        "deals_info_records": deals.info_records,
        "deals_data_pages": deals.data_pages,
        "deals_data_records": deals.data_records,
        "deals_info_low_memory": deals.info_low_memory,
        "deals_data_low_memory": deals.data_low_memory,
    }))
}
