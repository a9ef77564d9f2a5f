use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_graphql::{EmptySubscription, Request, Schema, Variables};
use clap::{Parser, Subcommand};
use kubeql_api::{build_schema, execute, Bridge, BridgeConfig, MutationRoot, QueryRoot};
use kubeql_core::{ClientOptions, Identity};
use kubeql_kubehub::CacheConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kubeqlctl", version, about = "GraphQL over dynamic Kubernetes custom resources")]
struct Cli {
    /// Upper bound for a single backend call, in seconds
    #[arg(long, global = true, env = "KUBEQL_CALL_TIMEOUT_SECS", default_value_t = 30)]
    call_timeout_secs: u64,

    /// Deadline for a whole request, in seconds
    #[arg(long, global = true, env = "KUBEQL_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    request_timeout_secs: u64,

    /// Lifetime of a cached per-identity client, in seconds
    #[arg(long, global = true, env = "KUBEQL_CACHE_TTL_SECS", default_value_t = 600)]
    cache_ttl_secs: u64,

    /// Maximum number of cached clients
    #[arg(long, global = true, env = "KUBEQL_CACHE_MAX_ENTRIES", default_value_t = 256)]
    cache_max_entries: usize,

    /// Log filter directives, e.g. `info,kubeql_kubehub=debug`
    #[arg(long, global = true, env = "KUBEQL_LOG", default_value = "info")]
    log: String,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "KUBEQL_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the GraphQL schema
    Sdl,
    /// Execute one GraphQL document and print the JSON response
    Query {
        /// Inline document; omit when using --file
        document: Option<String>,
        /// Read the document from a file
        #[arg(long, conflicts_with = "document")]
        file: Option<PathBuf>,
        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
        /// Bearer token of the caller
        #[arg(long, env = "KUBEQL_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Impersonate this user instead of presenting a token
        #[arg(long = "as", env = "KUBEQL_AS", conflicts_with = "token")]
        as_user: Option<String>,
        /// Groups for the impersonated user
        #[arg(long = "as-group", requires = "as_user")]
        as_groups: Vec<String>,
        /// Restrict the caller's client to one namespace
        #[arg(long = "ns", env = "KUBEQL_NAMESPACE")]
        namespace: Option<String>,
    },
}

impl Cli {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            cache: CacheConfig { ttl: Duration::from_secs(self.cache_ttl_secs), max_entries: self.cache_max_entries },
        }
    }

    fn log_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.log).with_context(|| format!("invalid log filter {:?}", self.log))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(cli.log_filter()?).with_target(true).with_writer(std::io::stderr).init();
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("serving metrics on {addr}"))?;
        info!(%addr, "metrics exporter listening");
    }
    let config = cli.bridge_config();

    match cli.command {
        Commands::Sdl => {
            let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription).finish();
            println!("{}", schema.sdl());
        }
        Commands::Query { document, file, variables, token, as_user, as_groups, namespace } => {
            let document = match (document, file) {
                (Some(d), _) => d,
                (None, Some(path)) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("a document or --file is required"),
            };
            let identity = match (token, as_user) {
                (Some(t), _) => Identity::bearer(t),
                (None, Some(user)) => Identity::impersonate(user, as_groups),
                (None, None) => bail!("no caller identity: pass --token or --as"),
            };
            let mut request = Request::new(document);
            if let Some(raw) = variables {
                let vars: serde_json::Value = serde_json::from_str(&raw).context("parsing --variables")?;
                request = request.variables(Variables::from_json(vars));
            }

            let bridge = Bridge::from_kube(config).await.context("building kube client factory")?;
            let options = ClientOptions { namespace }.normalized();
            let cancel = CancellationToken::new();
            let rc = bridge.request_context(identity, options).with_cancel(cancel.clone());
            let schema = build_schema(bridge);

            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received; cancelling request");
                        cancel.cancel();
                    }
                }
            });

            let t0 = Instant::now();
            let resp = execute(&schema, rc, request).await;
            info!(errors = resp.errors.len(), took_ms = t0.elapsed().as_millis() as u64, "query finished");
            println!("{}", serde_json::to_string_pretty(&resp)?);
            if cancel.is_cancelled() {
                bail!("request cancelled");
            }
            if !resp.errors.is_empty() {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}
