use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE, HOST};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde_json::Value;

use super::cache::TreeCache;
use super::config::SiteSettings;
use super::pages::{self, PageMeta};
use super::protocol::{ApiError, ModelsResponse};
use super::sitemap::{self, Sitemap};
use super::validator::Validator;

type Error = Box<dyn std::error::Error + Send + Sync>;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    connect-src 'self' https://api.github.com https://raw.githubusercontent.com; \
    img-src 'self' data: https://raw.githubusercontent.com; \
    style-src 'self'; \
    font-src 'self'; \
    script-src 'self'; \
    object-src 'none'; \
    base-uri 'self'; \
    frame-ancestors 'self'";

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=()",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("content-security-policy", CONTENT_SECURITY_POLICY),
];

/// Everything a request handler needs, shared across connections.
pub struct AppState {
    cache: Arc<TreeCache>,
    validator: Validator,
    sitemap: Sitemap,
    site: SiteSettings,
}

impl AppState {
    pub fn new(cache: Arc<TreeCache>, site: SiteSettings) -> Self {
        Self {
            validator: Validator::new(cache.clone()),
            sitemap: Sitemap::new(cache.clone()),
            cache,
            site,
        }
    }
}

pub struct Server {
    bind_addr: SocketAddr,
    state: Arc<AppState>,
}

impl Server {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            bind_addr: addr,
            state: Arc::new(state),
        }
    }

    #[tokio::main]
    pub async fn run(&self) -> Result<(), Error> {
        // Every connection gets a service sharing the same state
        let state = self.state.clone();
        let make_svc = make_service_fn(move |_conn| {
            let state = state.clone();
            async move {
                let service = service_fn(move |req| Self::handler(state.clone(), req));
                Ok::<_, Error>(service)
            }
        });

        let server = hyper::Server::try_bind(&self.bind_addr)?.serve(make_svc);
        log::info!("Listening on http://{}", self.bind_addr);
        server.await?;
        Ok(())
    }

    pub async fn handler(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Error> {
        let secure = is_secure(&req);

        // Pass request to router
        let mut response = match Self::router(&state, &req).await {
            Ok(response) => response,
            Err(e) => {
                // Generic internal error responses
                log::error!("{} {} failed: {}", req.method(), req.uri().path(), e);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal server error."))?
            }
        };

        apply_security_headers(response.headers_mut(), secure);
        Ok(response)
    }

    async fn router(state: &AppState, req: &Request<Body>) -> Result<Response<Body>, Error> {
        let path = req.uri().path();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (req.method(), segments.as_slice()) {
            (&Method::GET, [""]) => {
                Self::route_page(state, req, "index.html", PageMeta::home()).await
            }
            (&Method::GET, ["diff"]) => {
                Self::route_page(state, req, "diff.html", PageMeta::diff()).await
            }
            (&Method::GET, ["api", "models"]) => Self::route_models(state).await,
            (&Method::GET, ["sitemap.xml"]) => Self::route_sitemap(state, req).await,
            (&Method::GET, ["robots.txt"]) => Self::route_robots(state, req),
            (&Method::GET, ["models", model]) => {
                Self::route_model(state, req, model, None).await
            }
            (&Method::GET, ["models", model, "versions", version]) => {
                Self::route_model(state, req, model, Some(*version)).await
            }
            (&Method::GET, _) => Self::route_static(state, &segments).await,
            _ => Self::route_method_not_allowed(),
        }
    }

    async fn route_models(state: &AppState) -> Result<Response<Body>, Error> {
        match state.cache.get_tree(state.site.api_fallback).await {
            Ok(tree) => {
                let body = serde_json::to_vec(&ModelsResponse {
                    tree: &tree.entries,
                    cached: tree.cached,
                })?;
                json_response(StatusCode::OK, body)
            }
            Err(e) => {
                let detail = serde_json::from_str(e.detail())
                    .unwrap_or_else(|_| Value::String(e.detail().to_string()));
                let body = serde_json::to_vec(&ApiError {
                    error: "GitHub API request failed",
                    status: e.status(),
                    detail,
                })?;
                let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::BAD_GATEWAY);
                json_response(status, body)
            }
        }
    }

    async fn route_model(
        state: &AppState,
        req: &Request<Body>,
        model: &str,
        version: Option<&str>,
    ) -> Result<Response<Body>, Error> {
        let model = match decode_segment(model) {
            Some(model) => model,
            None => return Self::route_notfound(),
        };
        let version = match version.map(decode_segment) {
            Some(None) => return Self::route_notfound(),
            Some(Some(version)) => Some(version),
            None => None,
        };

        if !state.validator.is_valid(&model, version.as_deref()).await {
            log::debug!("Unknown model page {:?} {:?}", model, version);
            return Self::route_notfound();
        }

        let meta = match &version {
            Some(version) => PageMeta::version(&model, version),
            None => PageMeta::model(&model),
        };
        Self::route_page(state, req, "index.html", meta).await
    }

    async fn route_page(
        state: &AppState,
        req: &Request<Body>,
        shell: &str,
        meta: PageMeta,
    ) -> Result<Response<Body>, Error> {
        let shell = match read_file(state.site.web_dir.join(shell)).await? {
            Some(bytes) => String::from_utf8(bytes)?,
            None => return Self::route_notfound(),
        };
        let base = state.site.base_prefix(host(req), is_secure(req));
        let page = pages::render(&shell, &meta, &base);

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(page))?;
        Ok(response)
    }

    async fn route_sitemap(state: &AppState, req: &Request<Body>) -> Result<Response<Body>, Error> {
        let paths = state.sitemap.list_paths().await;
        let base = state.site.base_prefix(host(req), is_secure(req));
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(Body::from(sitemap::render_xml(&base, &paths)))?;
        Ok(response)
    }

    fn route_robots(state: &AppState, req: &Request<Body>) -> Result<Response<Body>, Error> {
        let base = state.site.base_prefix(host(req), is_secure(req));
        let body = format!("User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml\n", base);
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(body))?;
        Ok(response)
    }

    async fn route_static(state: &AppState, segments: &[&str]) -> Result<Response<Body>, Error> {
        // Only plain, visible names below the web dir
        let mut file = state.site.web_dir.clone();
        for segment in segments {
            match decode_segment(segment) {
                Some(name) if is_plain_name(&name) => file.push(name),
                _ => return Self::route_notfound(),
            }
        }

        let data = match read_file(file.clone()).await? {
            Some(data) => data,
            None => return Self::route_notfound(),
        };
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type(&file))
            .body(Body::from(data))?;
        Ok(response)
    }

    fn route_method_not_allowed() -> Result<Response<Body>, Error> {
        let response = Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(hyper::header::ALLOW, "GET")
            .body(Body::from("Method not allowed."))?;
        Ok(response)
    }

    fn route_notfound() -> Result<Response<Body>, Error> {
        // Default 404 response
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from("Not found."))?;
        Ok(response)
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Result<Response<Body>, Error> {
    let response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))?;
    Ok(response)
}

fn apply_security_headers(headers: &mut HeaderMap, secure: bool) {
    for &(name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    if secure {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
}

fn is_secure(req: &Request<Body>) -> bool {
    req.uri().scheme_str() == Some("https")
        || req
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map_or(false, |proto| proto.starts_with("https"))
}

fn host(req: &Request<Body>) -> Option<&str> {
    req.headers().get(HOST).and_then(|v| v.to_str().ok())
}

fn decode_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

/// Reads a regular file, `None` when it is missing or not a file.
async fn read_file(path: PathBuf) -> Result<Option<Vec<u8>>, Error> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(Some(tokio::fs::read(&path).await?)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn content_type(path: &std::path::Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    }
}
