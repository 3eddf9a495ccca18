// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST surface of the [`Inspector`].
//!
//! | Method | Path | |
//! |--------|------|-|
//! | `GET` | `/api/slaves/info/summary` | unit ids of all slaves |
//! | `GET` | `/api/slaves/info/{unitId}` | maps and blocks of a slave |
//! | `GET` | `/api/slaves/{unitId}/{holding\|input\|coil}/{address}?length=n` | read `n` values (default 1) |
//! | `PUT` | `/api/slaves/{unitId}/{holding\|input\|coil}/{address}` | write the JSON array in the body |
//! | `GET` | `/api/slaves/{unitId}/timesync` | decoded time sync block |
//! | `PUT` | `/api/slaves/{unitId}/timesync` | set the time sync block, `{"value": "2024-03-16T14:30:45.123"}` or `{}` for now |

use std::{future::Future, io, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::{
    error::InspectError,
    frame::{Address, Coil, UnitId, Word},
    inspect::{Inspector, SlaveInfo, Summary, TimeSyncReading},
    register::RegisterKind,
};

type SharedInspector = Arc<Inspector>;

/// The value kind segment of a register path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ValueKind {
    Holding,
    Input,
    Coil,
}

impl From<ValueKind> for RegisterKind {
    fn from(from: ValueKind) -> Self {
        match from {
            ValueKind::Holding => Self::HoldingRegisters,
            ValueKind::Input => Self::InputRegisters,
            ValueKind::Coil => Self::Coils,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReadQuery {
    #[serde(default = "default_length")]
    length: usize,
}

const fn default_length() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Words(Vec<Word>),
    Coils(Vec<Coil>),
}

impl Values {
    fn len(&self) -> usize {
        match self {
            Self::Words(words) => words.len(),
            Self::Coils(coils) => coils.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    #[serde(rename = "type")]
    pub kind: RegisterKind,
    pub start_address: Address,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
struct TimeSyncUpdate {
    /// Defaults to the current UTC time.
    #[serde(default)]
    value: Option<NaiveDateTime>,
}

/// Failure of a REST request.
#[derive(Debug)]
pub enum ApiError {
    Inspect(InspectError),
    BadRequest(String),
}

impl From<InspectError> for ApiError {
    fn from(from: InspectError) -> Self {
        Self::Inspect(from)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Inspect(err) if err.is_not_found() => (StatusCode::NOT_FOUND, err.to_string()),
            Self::Inspect(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        log::debug!("{status}: {error}");
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Build the REST routes.
pub fn router(inspector: SharedInspector) -> Router {
    Router::new()
        .route("/api/slaves/info/summary", get(summary))
        .route("/api/slaves/info/{unit_id}", get(slave_info))
        .route(
            "/api/slaves/{unit_id}/timesync",
            get(read_time_sync).put(write_time_sync),
        )
        .route(
            "/api/slaves/{unit_id}/{kind}/{address}",
            get(read_values).put(write_values),
        )
        .with_state(inspector)
}

/// Serve the REST routes until `shutdown_signal` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    inspector: SharedInspector,
    shutdown_signal: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::info!("Serving REST API on {}", listener.local_addr()?);
    axum::serve(listener, router(inspector))
        .with_graceful_shutdown(shutdown_signal)
        .await
}

async fn summary(State(inspector): State<SharedInspector>) -> Json<Summary> {
    Json(inspector.summary())
}

async fn slave_info(
    State(inspector): State<SharedInspector>,
    Path(unit_id): Path<UnitId>,
) -> Result<Json<SlaveInfo>, ApiError> {
    Ok(Json(inspector.slave_info(unit_id)?))
}

async fn read_values(
    State(inspector): State<SharedInspector>,
    Path((unit_id, kind, address)): Path<(UnitId, ValueKind, Address)>,
    Query(ReadQuery { length }): Query<ReadQuery>,
) -> Result<Json<Values>, ApiError> {
    let values = match kind {
        ValueKind::Coil => Values::Coils(inspector.read_coils(unit_id, address, length)?),
        ValueKind::Holding | ValueKind::Input => {
            Values::Words(inspector.read_registers(unit_id, kind.into(), address, length)?)
        }
    };
    Ok(Json(values))
}

async fn write_values(
    State(inspector): State<SharedInspector>,
    Path((unit_id, kind, address)): Path<(UnitId, ValueKind, Address)>,
    Json(values): Json<Values>,
) -> Result<Json<WriteResult>, ApiError> {
    let count = values.len();
    match (kind, values) {
        (ValueKind::Coil, Values::Coils(coils)) => {
            inspector.write_coils(unit_id, address, &coils)?;
        }
        // An empty array is parsed as words.
        (ValueKind::Coil, Values::Words(words)) if words.is_empty() => {
            inspector.write_coils(unit_id, address, &[])?;
        }
        (ValueKind::Holding | ValueKind::Input, Values::Words(words)) => {
            inspector.write_registers(unit_id, kind.into(), address, &words)?;
        }
        (ValueKind::Coil, Values::Words(_)) => {
            return Err(ApiError::BadRequest("expected an array of booleans".into()));
        }
        (ValueKind::Holding | ValueKind::Input, Values::Coils(_)) => {
            return Err(ApiError::BadRequest(
                "expected an array of 16 bit unsigned integers".into(),
            ));
        }
    }
    Ok(Json(WriteResult {
        kind: kind.into(),
        start_address: address,
        count,
    }))
}

async fn read_time_sync(
    State(inspector): State<SharedInspector>,
    Path(unit_id): Path<UnitId>,
) -> Result<Json<TimeSyncReading>, ApiError> {
    Ok(Json(inspector.read_time_sync(unit_id)?))
}

async fn write_time_sync(
    State(inspector): State<SharedInspector>,
    Path(unit_id): Path<UnitId>,
    Json(update): Json<TimeSyncUpdate>,
) -> Result<Json<TimeSyncReading>, ApiError> {
    let value = update.value.unwrap_or_else(|| Utc::now().naive_utc());
    Ok(Json(inspector.write_time_sync(unit_id, &value)?))
}
