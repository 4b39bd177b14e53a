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

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{RequestBuilder, Response, StatusCode, header::AUTHORIZATION};
use url::Url;

use crate::compiler::QueryPayload;

use super::{
    CompiledQuery, FlowTrace, FlowTracingRequest, Querier, QuerierError, QueryResult,
    SqlOptions, decode_compiled_query, decode_flow_tracing, decode_query_response,
};

const QUERY_PATH: &str = "v1/query/";
const FLOW_TRACING_PATH: &str = "trace/v1/stats/querier/L7FlowTracing";
const USER_HEADERS: [(&str, &str); 2] = [("X-User-Id", "1"), ("X-User-Type", "1")];

pub struct QuerierConfig {
    pub querier_url: Url,
    pub compiler_url: Option<Url>,
    /// Base of the flow tracing API; the querier URL when unset.
    pub tracing_url: Option<Url>,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Talks to the querier's `/v1/query/` endpoint, its flow tracing API and,
/// when configured, the SQL compiler.
pub struct HttpQuerier {
    http_client: reqwest::Client,
    query_url: Url,
    tracing_url: Url,
    compiler_url: Option<Url>,
    token: Option<String>,
}

impl HttpQuerier {
    pub fn new(config: QuerierConfig) -> Result<Self, QuerierError> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            query_url: endpoint(&config.querier_url, QUERY_PATH)?,
            tracing_url: endpoint(
                config.tracing_url.as_ref().unwrap_or(&config.querier_url),
                FLOW_TRACING_PATH,
            )?,
            compiler_url: config.compiler_url,
            token: config.token.filter(|token| !token.is_empty()),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }
}

/// Joins `path` under `base`, keeping any path prefix `base` already has.
fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }
    base.join(path)
}

fn form_fields<'a>(
    db: &'a str,
    sql: &'a str,
    options: SqlOptions<'a>,
) -> Vec<(&'static str, &'a str)> {
    [
        ("sql", sql),
        ("db", db),
        ("data_precision", options.data_precision),
        ("datasource", options.datasource),
    ]
    .into_iter()
    .filter(|(name, value)| *name == "sql" || !value.is_empty())
    .collect()
}

/// Splits off non-success responses with their body text.
async fn error_body(response: Response) -> Result<Response, (StatusCode, String)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err((status, response.text().await.unwrap_or_default()))
}

#[async_trait]
impl Querier for HttpQuerier {
    async fn execute_sql(
        &self,
        db: &str,
        sql: &str,
        options: SqlOptions<'_>,
    ) -> Result<QueryResult, QuerierError> {
        debug!("executing on `{db}`: {sql}");
        let request = self
            .http_client
            .post(self.query_url.clone())
            .form(&form_fields(db, sql, options));
        let response = self.authorized(request).send().await?;
        let response = error_body(response)
            .await
            .map_err(|(status, body)| QuerierError::Status {
                status: status.as_u16(),
                body,
            })?;
        decode_query_response(&response.bytes().await?)
    }

    async fn compile(&self, payload: &QueryPayload) -> Result<CompiledQuery, QuerierError> {
        let url = self
            .compiler_url
            .clone()
            .ok_or_else(|| QuerierError::Compile("no sql compiler endpoint configured".into()))?;
        let request = self.http_client.post(url).json(payload);
        let response = self.authorized(request).send().await?;
        let response = error_body(response)
            .await
            .map_err(|(status, body)| {
                if status.is_client_error() {
                    QuerierError::Compile(body)
                } else {
                    QuerierError::Status {
                        status: status.as_u16(),
                        body,
                    }
                }
            })?;
        let compiled = decode_compiled_query(&response.bytes().await?)?;
        debug!("compiled sql: {}", compiled.sql);
        Ok(compiled)
    }

    async fn trace_flow(&self, request: &FlowTracingRequest) -> Result<FlowTrace, QuerierError> {
        debug!("tracing span {} in [{}, {}]", request.id, request.time_start, request.time_end);
        let mut builder = self.http_client.post(self.tracing_url.clone()).json(request);
        for (name, value) in USER_HEADERS {
            builder = builder.header(name, value);
        }
        let response = self.authorized(builder).send().await?;
        let response = error_body(response)
            .await
            .map_err(|(status, body)| QuerierError::Status {
                status: status.as_u16(),
                body,
            })?;
        decode_flow_tracing(&response.bytes().await?)
    }
}
