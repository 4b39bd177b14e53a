// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    compiler::{
        AccessRelationshipConfig, CompileContext, QueryPayload, TimeRange,
        access_relationship_config, gen_query_params, validate_submission,
    },
    editor::{
        ClauseOptions, Edit, FunctionOption, SelectOption, TableOptions, clause_options,
        database_filter, function_options, reduce, sanitize, table_filter,
    },
    error::AppError,
    querier::{SqlOptions, substitute_time_placeholders, tag_name, tag_values_from_result},
    query::{
        AppType, Clause, QueryForm,
        variables::{ANY_SENTINEL, DISABLED_SENTINEL, ScopedVars, TemplateVariable, interpolate},
    },
};

use super::{
    flame::flame_frames,
    frames::{Frame, shape_frames, value_to_string},
    state::AppState,
};

const DEFAULT_LOOKBACK_SECS: i64 = 60 * 60;
/// Tags whose values are shown next to their display names.
const VALUE_LABELED_TAGS: [&str; 1] = ["server_port"];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/query", post(run_query))
        .route("/api/v1/query/params", post(query_params))
        .route("/api/v1/query/sql/{request_id}/{ref_id}", get(cached_sql))
        .route("/api/v1/relationship", post(relationship))
        .route("/api/v1/editor/options", post(editor_options))
        .route("/api/v1/editor/edit", post(editor_edit))
        .route("/api/v1/variables/query", post(variable_query))
        .route("/api/v1/tags/{tag}/values", get(tag_values))
        .route("/api/v1/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    /// The panel's stored form, as an object or as its JSON text.
    query_text: Value,
    #[serde(default)]
    variables: Vec<TemplateVariable>,
    #[serde(default)]
    scoped_vars: ScopedVars,
    #[serde(default)]
    range: Option<RangeParams>,
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    ref_id: String,
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    from: TimeBound,
    to: TimeBound,
}

/// Unix seconds, or an RFC 3339 timestamp.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeBound {
    Seconds(i64),
    Text(String),
}

impl TimeBound {
    fn to_seconds(&self) -> Result<i64, AppError> {
        match self {
            TimeBound::Seconds(seconds) => Ok(*seconds),
            TimeBound::Text(text) => text
                .trim()
                .parse::<i64>()
                .or_else(|_| DateTime::parse_from_rfc3339(text.trim()).map(|time| time.timestamp()))
                .map_err(|err| AppError::BadRequest(format!("invalid time `{text}`: {err}"))),
        }
    }
}

impl RangeParams {
    fn resolve(&self) -> Result<TimeRange, AppError> {
        let range = TimeRange {
            from: self.from.to_seconds()?,
            to: self.to.to_seconds()?,
        };
        if range.from > range.to {
            return Err(AppError::BadRequest(
                "range.from must not be after range.to".into(),
            ));
        }
        Ok(range)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipRequest {
    query_text: Value,
    #[serde(default)]
    return_tags: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsRequest {
    query_text: Value,
    #[serde(default)]
    clause: Option<Clause>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest {
    query_text: Value,
    edit: Edit,
}

/// A template-variable query: `sql` runs on `database` and its
/// `value`/`display_name` rows become the variable's options.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableQueryRequest {
    #[serde(default)]
    database: String,
    #[serde(default)]
    sql: String,
    #[serde(default)]
    datasource: String,
    #[serde(default)]
    use_disabled: bool,
    #[serde(default)]
    use_any: bool,
    #[serde(default)]
    variables: Vec<TemplateVariable>,
    #[serde(default)]
    scoped_vars: ScopedVars,
}

#[derive(Debug, Deserialize)]
struct TagValuesParams {
    #[serde(default)]
    db: String,
    #[serde(default)]
    table: String,
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
struct VariableOption {
    text: String,
    value: Value,
}

#[derive(Debug, PartialEq, Serialize)]
struct TagValueOption {
    label: String,
    value: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    ref_id: String,
    frames: Vec<Frame>,
}

#[derive(Debug, Serialize)]
struct SqlResponse {
    sql: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditorOptions {
    databases: Vec<String>,
    tables: Vec<String>,
    clauses: ClauseOptions,
    functions: Vec<FunctionOption>,
    sub_functions: Vec<SelectOption>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    databases: usize,
}

fn parse_form(query_text: &Value) -> Result<QueryForm, AppError> {
    let parsed = match query_text {
        Value::String(text) => serde_json::from_str(text),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|err| AppError::BadRequest(format!("invalid queryText: {err}")))
}

fn default_range() -> TimeRange {
    let now = Utc::now().timestamp();
    TimeRange {
        from: now.saturating_sub(DEFAULT_LOOKBACK_SECS),
        to: now,
    }
}

fn request_range(request: &QueryRequest) -> Result<TimeRange, AppError> {
    match &request.range {
        Some(range) => range.resolve(),
        None => Ok(default_range()),
    }
}

struct Prepared {
    form: QueryForm,
    payload: QueryPayload,
    range: TimeRange,
}

async fn prepare(
    state: &AppState,
    form: QueryForm,
    request: &QueryRequest,
) -> Result<Prepared, AppError> {
    validate_submission(&form)?;
    let range = request_range(request)?;
    let table = state.table_config(&form.db, &form.from).await;
    let mut ctx =
        CompileContext::new(&request.variables, &request.scoped_vars).with_time_range(range);
    if let Some(table) = table.as_deref() {
        ctx = ctx.with_table(table);
    }
    let payload = gen_query_params(&form, &ctx);
    Ok(Prepared {
        form,
        payload,
        range,
    })
}

async fn query_params(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryPayload>, AppError> {
    let form = parse_form(&request.query_text)?;
    let prepared = prepare(&state, form, &request).await?;
    Ok(Json(prepared.payload))
}

async fn run_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let form = parse_form(&request.query_text)?;
    if form.app_type == AppType::AppTracingFlame {
        let range = request_range(&request)?;
        let frames = flame_frames(&state, &form, range).await?;
        return Ok(Json(QueryResponse {
            ref_id: request.ref_id,
            frames,
        }));
    }
    let Prepared {
        form,
        payload,
        range,
    } = prepare(&state, form, &request).await?;
    let compiled = state.querier().compile(&payload).await?;
    if !request.request_id.is_empty() {
        state
            .sql_cache()
            .insert(&request.request_id, &request.ref_id, compiled.sql.clone())
            .await;
    }
    let sql = substitute_time_placeholders(&compiled.sql, range);
    debug!(
        "query request_id={} ref_id={} sql=`{}`",
        request.request_id, request.ref_id, sql
    );
    let result = state
        .querier()
        .execute_sql(&form.db, &sql, SqlOptions::data_precision(&form.sources))
        .await?;
    let frames = shape_frames(&result, &compiled, &form)?;
    Ok(Json(QueryResponse {
        ref_id: request.ref_id,
        frames,
    }))
}

async fn cached_sql(
    State(state): State<AppState>,
    Path((request_id, ref_id)): Path<(String, String)>,
) -> Result<Json<SqlResponse>, AppError> {
    state
        .sql_cache()
        .get(&request_id, &ref_id)
        .await
        .map(|sql| Json(SqlResponse { sql }))
        .ok_or_else(|| AppError::NotFound(format!("no sql cached for {request_id}/{ref_id}")))
}

async fn relationship(
    Json(request): Json<RelationshipRequest>,
) -> Result<Json<AccessRelationshipConfig>, AppError> {
    let form = parse_form(&request.query_text)?;
    let names: Vec<&str> = request.return_tags.iter().filter_map(tag_name).collect();
    Ok(Json(access_relationship_config(&form.group_by, &names)))
}

async fn table_options(state: &AppState, form: &QueryForm) -> TableOptions {
    state
        .table_config(&form.db, &form.from)
        .await
        .map(|config| TableOptions::from_config(&config))
        .unwrap_or_default()
}

async fn editor_options(
    State(state): State<AppState>,
    Json(request): Json<OptionsRequest>,
) -> Result<Json<EditorOptions>, AppError> {
    let form = parse_form(&request.query_text)?;
    let databases = database_filter(form.app_type, &state.querier().databases().await?);
    let tables = if form.db.is_empty() {
        Vec::new()
    } else {
        table_filter(form.app_type, &state.querier().tables(&form.db).await?)
    };
    let table = table_options(&state, &form).await;
    let functions = match (request.clause, request.index) {
        (Some(clause), Some(index)) => form
            .rows(clause)
            .get(index)
            .map(|row| function_options(&table, clause, row))
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    Ok(Json(EditorOptions {
        databases,
        tables,
        clauses: clause_options(&table, &form),
        functions,
        sub_functions: table.sub_functions.clone(),
    }))
}

async fn editor_edit(
    State(state): State<AppState>,
    Json(request): Json<EditRequest>,
) -> Result<Json<QueryForm>, AppError> {
    let form = parse_form(&request.query_text)?;
    let mut form = reduce(form, request.edit);
    if let Some(config) = state.table_config(&form.db, &form.from).await {
        sanitize(&mut form, &TableOptions::from_config(&config));
    }
    Ok(Json(form))
}

async fn variable_query(
    State(state): State<AppState>,
    Json(request): Json<VariableQueryRequest>,
) -> Result<Json<Vec<VariableOption>>, AppError> {
    if request.database.is_empty() || request.sql.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let sql = interpolate(&request.sql, &request.variables, &request.scoped_vars);
    let result = state
        .querier()
        .execute_sql(&request.database, &sql, SqlOptions::datasource(&request.datasource))
        .await?;
    let mut options = Vec::new();
    if request.use_disabled {
        options.push(VariableOption {
            text: "Disabled".to_string(),
            value: Value::from(DISABLED_SENTINEL),
        });
    }
    if request.use_any {
        options.push(VariableOption {
            text: "Any".to_string(),
            value: Value::from(ANY_SENTINEL),
        });
    }
    options.extend(
        tag_values_from_result(&result)
            .into_iter()
            .map(|item| VariableOption {
                text: item.display_name,
                value: item.value,
            }),
    );
    Ok(Json(options))
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
}

async fn tag_values(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Query(params): Query<TagValuesParams>,
) -> Result<Json<Vec<TagValueOption>>, AppError> {
    if params.db.is_empty() || params.table.is_empty() {
        return Ok(Json(Vec::new()));
    }
    if !is_identifier(&tag) || !is_identifier(&params.table) {
        return Err(AppError::BadRequest(format!(
            "invalid tag `{tag}` or table `{}`",
            params.table
        )));
    }
    let show_value = VALUE_LABELED_TAGS.contains(&tag.as_str());
    let needle = params.search.unwrap_or_default().to_lowercase();
    let values = state
        .querier()
        .tag_values(&params.db, &params.table, &tag)
        .await?;
    let options = values
        .into_iter()
        .filter_map(|item| {
            let value = value_to_string(&item.value);
            let matched = needle.is_empty()
                || item.display_name.to_lowercase().contains(&needle)
                || (show_value && value.to_lowercase().contains(&needle));
            matched.then(|| TagValueOption {
                label: if show_value {
                    format!("{}({value})", item.display_name)
                } else {
                    item.display_name
                },
                value: item.value,
            })
        })
        .collect();
    Ok(Json(options))
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let databases = state.querier().databases().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        databases: databases.len(),
    }))
}

async fn log_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status();
    let elapsed = start.elapsed();
    log::info!(
        "method={} path={} status={} duration_ms={:.3}",
        method,
        uri.path(),
        status.as_u16(),
        elapsed.as_secs_f64() * 1000.0
    );
    response
}
