extern crate log;

mod cache;
mod client;
mod config;
mod index;
mod pages;
mod protocol;
mod report;
mod server;
mod sitemap;
mod validator;

use cache::TreeCache;
use clap::{Args, Parser, Subcommand};
use client::RemoteTreeClient;
use config::{SiteSettings, UpstreamSettings};
use report::Report;
use server::{AppState, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// A semantic model catalog frontend
/// Serves model pages, a sitemap and a JSON API over a cached upstream tree listing
#[derive(Parser)]
#[command(version, author)]
struct Opts {
    #[command(flatten)]
    upstream: UpstreamOpts,
    /// Set the mode to either serve or models
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Runs the HTTP frontend
    Serve(ServeOpts),
    /// Prints the known models and versions once
    Models(ModelsOpts),
}

#[derive(Args)]
struct UpstreamOpts {
    /// Sets the upstream recursive tree listing url
    #[arg(
        long,
        env = "MODELCAT_UPSTREAM_URL",
        default_value = config::DEFAULT_UPSTREAM_URL,
        global = true
    )]
    upstream_url: String,
    /// Sets the bearer token for upstream requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
    /// Sets the tree cache freshness window in seconds
    #[arg(
        long,
        env = "GITHUB_CACHE_TTL",
        default_value_t = config::DEFAULT_CACHE_TTL_SECS,
        global = true
    )]
    cache_ttl: u64,
    /// Sets the upstream request timeout in seconds
    #[arg(
        long,
        env = "MODELCAT_TIMEOUT",
        default_value_t = config::DEFAULT_TIMEOUT_SECS,
        global = true
    )]
    timeout: u64,
}

#[derive(Args)]
struct ServeOpts {
    /// Sets the bind address
    bind: SocketAddr,
    /// Sets the directory of page shells and static assets
    #[arg(long, env = "MODELCAT_WEB_DIR", default_value = "web")]
    web_dir: PathBuf,
    /// Sets the public base url used in sitemaps and canonical links
    #[arg(long, env = "MODELCAT_BASE_URL")]
    base_url: Option<String>,
    /// Makes the JSON API report upstream failures instead of serving stale data
    #[arg(long)]
    no_api_fallback: bool,
}

#[derive(Args)]
struct ModelsOpts {
    /// Prints canonical site paths instead of model and version pairs
    #[arg(long)]
    paths: bool,
}

fn run(opts: Opts) -> Result<(), Error> {
    let upstream = UpstreamSettings::new(
        &opts.upstream.upstream_url,
        opts.upstream.token,
        opts.upstream.timeout,
        opts.upstream.cache_ttl,
    )?;
    let cache = TreeCache::new(RemoteTreeClient::new(&upstream)?, upstream.cache_ttl);
    log::info!(
        "Caching tree listing of {} for {}s",
        upstream.url,
        cache.ttl().as_secs()
    );

    match opts.mode {
        Mode::Serve(serve) => {
            let site = SiteSettings::new(
                serve.web_dir,
                serve.base_url.as_deref(),
                !serve.no_api_fallback,
            )?;
            let state = AppState::new(Arc::new(cache), site);
            Server::new(serve.bind, state).run()
        }
        Mode::Models(models) => Report::new(cache, models.paths).run(),
    }
}

fn main() -> ExitCode {
    // Initialize logging
    let log_env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::init_from_env(log_env);

    // Parse command line arguments and act accordingly
    let opts = Opts::parse();
    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
