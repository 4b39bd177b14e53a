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

use std::{net::SocketAddr, time::Duration};

use app::{
    AppConfig, AppState, DEFAULT_SQL_CACHE_CAPACITY, DEFAULT_TABLE_CACHE_CAPACITY, router,
};
use clap::Parser;
use error::AppError;
use log::{LevelFilter, info};
use querier::QuerierConfig;
use url::Url;

mod app;
mod catalog;
mod compiler;
mod editor;
mod error;
mod querier;
mod query;

#[derive(Debug, Parser)]
#[command(author, version, about, disable_help_subcommand = true)]
struct Args {
    /// DeepFlow querier base URL, e.g. http://deepflow-server:20416
    #[arg(long = "querier-url", env = "DEEPFLOW_QUERIER_URL")]
    querier_url: String,
    /// Endpoint that compiles query payloads into SQL
    #[arg(long = "compiler-url", env = "DEEPFLOW_COMPILER_URL")]
    compiler_url: Option<String>,
    /// Base URL of the flow tracing service; defaults to the querier URL
    #[arg(long = "tracing-url", env = "DEEPFLOW_TRACING_URL")]
    tracing_url: Option<String>,
    /// Bearer token sent to the querier and the compiler
    #[arg(long, env = "DEEPFLOW_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// HTTP bind address for the adapter server
    #[arg(long = "bind", env = "BIND_ADDR", default_value = "0.0.0.0:3200")]
    bind: SocketAddr,
    /// Number of compiled SQL texts kept for the inspector
    #[arg(long = "sql-cache-capacity", env = "SQL_CACHE_CAPACITY", default_value_t = DEFAULT_SQL_CACHE_CAPACITY)]
    sql_cache_capacity: usize,
    /// Number of tables whose metadata stays cached
    #[arg(long = "table-cache-capacity", env = "TABLE_CACHE_CAPACITY", default_value_t = DEFAULT_TABLE_CACHE_CAPACITY)]
    table_cache_capacity: usize,
    /// Timeout for each upstream request, in seconds
    #[arg(long = "request-timeout-secs", env = "REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();
    let args = Args::parse();
    info!(
        "starting deepflow-querier-adapter (querier={}, bind={})",
        args.querier_url, args.bind
    );
    let config = AppConfig {
        querier: QuerierConfig {
            querier_url: parse_url("querier-url", &args.querier_url)?,
            compiler_url: args
                .compiler_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| parse_url("compiler-url", url))
                .transpose()?,
            tracing_url: args
                .tracing_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| parse_url("tracing-url", url))
                .transpose()?,
            token: args.token.clone(),
            timeout: Duration::from_secs(args.request_timeout_secs),
        },
        sql_cache_capacity: args.sql_cache_capacity,
        table_cache_capacity: args.table_cache_capacity,
    };
    info!("bootstrapping application state");
    let state = AppState::bootstrap(config).await?;
    let app = router(state);

    info!("binding TCP listener on {}", args.bind);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind listener: {err}")))?;
    info!("deepflow-querier-adapter listening on {}", args.bind);
    axum::serve(listener, app)
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;
    Ok(())
}

fn parse_url(flag: &str, raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw).map_err(|err| AppError::Config(format!("invalid --{flag} `{raw}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AppError::Config(format!(
            "--{flag} must use http or https, got `{scheme}`"
        ))),
    }
}

fn init_logging() {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_default_env().init();
    } else {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Warn)
            .filter_module("deepflow_querier_adapter", LevelFilter::Info)
            .init();
    }
}
