//! Revalidating HTTP server
//!
//! `/` and `/post/{uid}` are served from the [`RenderCache`]. A stale render is
//! served as-is while one background task regenerates it. A post that was never
//! rendered gets the loading page until its first generation completes; if
//! that generation fails, the retry page is served for the retry window
//! before the CMS is asked again.
//! `/api/posts` backs the list page's "load more" control. Every other path is
//! a file from the output directory.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    handler::HandlerWithoutStateExt,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::cache::{BuildManifest, CacheEntry, Lookup, Outcome, RenderCache};
use crate::cms::{CmsError, ContentSource, Cursor};
use crate::config::RevalidateConfig;
use crate::content::{fetch_and_map, DetailView};
use crate::generator::{Generator, RenderedPost};
use crate::helpers::{is_valid_uid, post_path};
use crate::templates::SummaryView;
use crate::Site;

const INDEX_ROUTE: &str = "/";

/// Server state
pub struct ServerState {
    generator: Generator,
    cache: RenderCache,
    revalidate: RevalidateConfig,
    public_dir: PathBuf,
}

impl ServerState {
    pub fn new(site: &Site, source: Arc<dyn ContentSource>) -> Result<Self> {
        Ok(Self {
            generator: Generator::new(site, source)?,
            cache: RenderCache::new(),
            revalidate: site.config.revalidate.clone(),
            public_dir: site.public_dir.clone(),
        })
    }

    /// Load the pages written by the last `generate` run into the cache
    ///
    /// Entries keep the age of the build, so anything older than its route's
    /// window is regenerated on first request.
    pub fn seed_from_build(&self, base_dir: &std::path::Path) -> usize {
        let Some(manifest) = BuildManifest::load(base_dir) else {
            return 0;
        };
        let age = manifest.age();

        let mut seeded = 0;
        if let Ok(html) = fs::read_to_string(self.public_dir.join("index.html")) {
            self.cache
                .insert(INDEX_ROUTE, CacheEntry::aged(html, Outcome::Found, age));
            seeded += 1;
        }
        for uid in &manifest.posts {
            let path = self.generator.post_output_path(uid);
            match fs::read_to_string(&path) {
                Ok(html) => {
                    self.cache.insert(
                        &post_path(uid),
                        CacheEntry::aged(html, Outcome::Found, age),
                    );
                    seeded += 1;
                }
                Err(e) => tracing::debug!("Not seeding {:?}: {}", path, e),
            }
        }
        seeded
    }
}

/// Start the server
pub async fn start(site: &Site, ip: &str, port: u16, open: bool) -> Result<()> {
    let state = ServerState::new(site, site.content_source()?)?;
    let seeded = state.seed_from_build(&site.base_dir);
    tracing::debug!("Seeded {} rendered pages from the last build", seeded);

    let app = router(Arc::new(state));

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let url = format!("http://{}:{}", ip, port);
    println!("Server running at {}", url);
    println!("Press Ctrl+C to stop.");

    if open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    let not_found_state = state.clone();
    let not_found = (move || not_found_page(not_found_state.clone())).into_service();
    let serve_dir = ServeDir::new(&state.public_dir).not_found_service(not_found);

    Router::new()
        .route("/", get(index_handler))
        .route("/post/:uid", get(post_handler))
        .route("/post/:uid/", get(post_redirect))
        .route("/post/:uid/index.html", get(post_redirect))
        .route("/api/posts", get(more_handler))
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

async fn index_handler(State(state): State<Arc<ServerState>>) -> Response {
    match state.cache.lookup(INDEX_ROUTE, state.revalidate.index()) {
        Lookup::Fresh(entry) => cached_response(&state, entry),
        Lookup::Stale(entry) => {
            if state.cache.try_begin(INDEX_ROUTE) {
                tokio::spawn(regenerate_index(state.clone()));
            }
            cached_response(&state, entry)
        }
        Lookup::Missing => match state.generator.build_index().await {
            Ok((html, _)) => {
                state
                    .cache
                    .insert(INDEX_ROUTE, CacheEntry::new(html.clone(), Outcome::Found));
                Html(html).into_response()
            }
            Err(e) => {
                tracing::error!("Failed to render the post list: {:#}", e);
                (StatusCode::BAD_GATEWAY, "Failed to load posts").into_response()
            }
        },
    }
}

async fn post_handler(
    State(state): State<Arc<ServerState>>,
    Path(uid): Path<String>,
) -> Response {
    if !is_valid_uid(&uid) {
        return not_found_page(state).await;
    }

    let route = post_path(&uid);
    match state.cache.lookup(&route, state.revalidate.post()) {
        Lookup::Fresh(entry) => cached_response(&state, entry),
        Lookup::Stale(entry) => {
            let backing_off =
                entry.outcome == Outcome::Failed && entry.age() < state.revalidate.retry();
            if !backing_off && state.cache.try_begin(&route) {
                tokio::spawn(regenerate_post(state.clone(), uid));
            }
            cached_response(&state, entry)
        }
        Lookup::Missing => {
            if state.cache.try_begin(&route) {
                tokio::spawn(regenerate_post(state.clone(), uid));
            }
            loading_page(&state)
        }
    }
}

/// Send `/post/{uid}/` and `/post/{uid}/index.html` through the revalidating route
async fn post_redirect(Path(uid): Path<String>) -> Response {
    Redirect::permanent(&post_path(&uid)).into_response()
}

#[derive(Debug, Deserialize)]
struct MoreQuery {
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct MoreResponse {
    results: Vec<SummaryView>,
    next_page: Option<String>,
}

async fn more_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MoreQuery>,
) -> Response {
    let Some(cursor) = query.cursor.filter(|c| !c.is_empty()) else {
        return error_json(StatusCode::BAD_REQUEST, "missing cursor");
    };

    match fetch_and_map(state.generator.source(), &Cursor::new(cursor)).await {
        Ok(page) => Json(MoreResponse {
            results: state.generator.renderer().summary_views(&page.items),
            next_page: page.next_page.map(|c| c.to_string()),
        })
        .into_response(),
        Err(e @ CmsError::InvalidCursor(_)) => {
            tracing::warn!("Rejected load more request: {}", e);
            error_json(StatusCode::BAD_REQUEST, "invalid cursor")
        }
        Err(e) => {
            tracing::warn!("Failed to load more posts: {}", e);
            error_json(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

async fn regenerate_index(state: Arc<ServerState>) {
    let entry = match state.generator.build_index().await {
        Ok((html, list)) => {
            tracing::info!("Regenerated index with {} posts", list.items().len());
            Some(CacheEntry::new(html, Outcome::Found))
        }
        Err(e) => {
            tracing::error!("Failed to regenerate the post list: {:#}", e);
            None
        }
    };
    state.cache.finish(INDEX_ROUTE, entry);
}

async fn regenerate_post(state: Arc<ServerState>, uid: String) {
    let route = post_path(&uid);
    let entry = match state.generator.build_post(&uid).await {
        Ok(RenderedPost::Ready(html)) => {
            tracing::info!("Regenerated {}", route);
            CacheEntry::new(html, Outcome::Found)
        }
        Ok(RenderedPost::NotFound(html)) => {
            tracing::info!("Post {} not found", uid);
            CacheEntry::new(html, Outcome::NotFound)
        }
        Err(e) => {
            tracing::error!("Failed to regenerate {}: {:#}", route, e);
            let retry_secs = state.revalidate.retry_secs;
            match state.generator.renderer().render_unavailable(retry_secs) {
                Ok(html) => state
                    .cache
                    .finish_failed(&route, CacheEntry::new(html, Outcome::Failed)),
                Err(e) => {
                    tracing::error!("Template error: {:#}", e);
                    state.cache.finish(&route, None);
                }
            }
            return;
        }
    };
    state.cache.finish(&route, Some(entry));
}

fn cached_response(state: &ServerState, entry: CacheEntry) -> Response {
    match entry.outcome {
        Outcome::Found => Html(entry.html).into_response(),
        Outcome::NotFound => (StatusCode::NOT_FOUND, Html(entry.html)).into_response(),
        Outcome::Failed => (
            StatusCode::SERVICE_UNAVAILABLE,
            [
                (header::CACHE_CONTROL, "no-store".to_string()),
                (header::RETRY_AFTER, state.revalidate.retry_secs.to_string()),
            ],
            Html(entry.html),
        )
            .into_response(),
    }
}

fn loading_page(state: &ServerState) -> Response {
    match state.generator.loading_page() {
        Ok(html) => ([(header::CACHE_CONTROL, "no-store")], Html(html)).into_response(),
        Err(e) => render_failure(e),
    }
}

async fn not_found_page(state: Arc<ServerState>) -> Response {
    match state
        .generator
        .renderer()
        .render_detail(&DetailView::NotFound)
    {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(e) => render_failure(e),
    }
}

fn render_failure(e: anyhow::Error) -> Response {
    tracing::error!("Template error: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::testing::{page, MemorySource};
    use crate::config::SiteConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderMap, Request};
    use crate::cache::NEGATIVE_LIMIT;
    use std::time::Duration;
    use tower::ServiceExt;

    const PAGE2: &str = "https://api.example/page2";

    fn source() -> MemorySource {
        let mut source = MemorySource::with_first(page(&["p1", "p2"], Some(PAGE2)));
        source.add_page(PAGE2, page(&["p3"], None));
        source.failing.insert("https://api.example/down".to_string());
        source
    }

    fn state(dir: &std::path::Path, source: MemorySource) -> Arc<ServerState> {
        state_with(dir, SiteConfig::default(), Arc::new(source))
    }

    fn state_with(
        dir: &std::path::Path,
        config: SiteConfig,
        source: Arc<MemorySource>,
    ) -> Arc<ServerState> {
        let site = Site::with_config(dir, config);
        Arc::new(ServerState::new(&site, source).unwrap())
    }

    async fn fetch(state: &Arc<ServerState>, uri: &str) -> (StatusCode, HeaderMap, String) {
        let response = router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get(state: &Arc<ServerState>, uri: &str) -> (StatusCode, Option<String>, String) {
        let (status, headers, body) = fetch(state, uri).await;
        let cache_control = headers
            .get(header::CACHE_CONTROL)
            .map(|v| v.to_str().unwrap().to_string());
        (status, cache_control, body)
    }

    async fn wait_until_settled(state: &ServerState, route: &str) {
        for _ in 0..100 {
            if !state.cache.is_in_flight(route) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} still regenerating", route);
    }

    #[tokio::test]
    async fn test_index_renders_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        let (status, _, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Title p1"));
        assert!(body.contains("Carregar mais posts"));
        assert!(matches!(
            state.cache.lookup("/", Duration::from_secs(60)),
            Lookup::Fresh(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_index_is_served_while_regenerating() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());
        state.cache.insert(
            "/",
            CacheEntry::aged(
                "old list".to_string(),
                Outcome::Found,
                Duration::from_secs(2 * 86400),
            ),
        );

        let (status, _, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "old list");

        wait_until_settled(&state, "/").await;
        let (_, _, body) = get(&state, "/").await;
        assert!(body.contains("Title p1"));
    }

    #[tokio::test]
    async fn test_unknown_post_loading_then_ready() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        let (status, cache_control, body) = get(&state, "/post/p2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache_control.as_deref(), Some("no-store"));
        assert!(body.contains("Carregando..."));

        wait_until_settled(&state, "/post/p2").await;
        let (status, _, body) = get(&state, "/post/p2").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>Title p2</h1>"));
    }

    #[tokio::test]
    async fn test_unknown_post_loading_then_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        let (_, _, body) = get(&state, "/post/missing").await;
        assert!(body.contains("Carregando..."));

        wait_until_settled(&state, "/post/missing").await;
        let (status, _, body) = get(&state, "/post/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Post não encontrado"));
    }

    #[tokio::test]
    async fn test_invalid_uid_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        let (status, _, body) = get(&state, "/post/Bad%20Uid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Post não encontrado"));
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_more_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        let uri = format!("/api/posts?cursor={}", "https%3A%2F%2Fapi.example%2Fpage2");
        let (status, _, body) = get(&state, &uri).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["results"][0]["uid"], "p3");
        assert_eq!(json["results"][0]["href"], "/post/p3");
        assert_eq!(json["results"][0]["display_date"], "15 mar 2021");
        assert!(json["next_page"].is_null());
    }

    #[tokio::test]
    async fn test_more_endpoint_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        let (status, _, _) = get(&state, "/api/posts").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = get(&state, "/api/posts?cursor=https%3A%2F%2Fevil.example%2F").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid cursor"));

        let (status, _, body) = get(&state, "/api/posts?cursor=https%3A%2F%2Fapi.example%2Fdown").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_static_files_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());
        let public = dir.path().join("public");
        fs::create_dir_all(&public).unwrap();
        fs::write(public.join("styles.css"), "body {}").unwrap();

        let (status, _, body) = get(&state, "/styles.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body {}");

        let (status, _, body) = get(&state, "/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Post não encontrado"));
    }

    #[tokio::test]
    async fn test_seed_from_build() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::with_config(dir.path(), SiteConfig::default());
        let generator = Generator::new(&site, Arc::new(source())).unwrap();
        generator.generate().await.unwrap().save(dir.path()).unwrap();

        let state = state(dir.path(), source());
        assert_eq!(state.seed_from_build(dir.path()), 3);
        assert!(matches!(
            state.cache.lookup("/post/p1", Duration::from_secs(60)),
            Lookup::Fresh(_)
        ));

        let (status, _, body) = get(&state, "/post/p1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>Title p1</h1>"));
    }

    #[tokio::test]
    async fn test_unknown_uids_do_not_grow_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());

        for i in 0..NEGATIVE_LIMIT + 50 {
            let uri = format!("/post/nope-{i}");
            get(&state, &uri).await;
            wait_until_settled(&state, &uri).await;
        }

        assert!(state.cache.len() <= NEGATIVE_LIMIT);
        let last = format!("/post/nope-{}", NEGATIVE_LIMIT + 49);
        let (status, _, _) = get(&state, &last).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_post_backs_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SiteConfig::default();
        config.revalidate.post_secs = 0;
        let mut source = source();
        source.failing.insert("down".to_string());
        let source = Arc::new(source);
        let state = state_with(dir.path(), config, source.clone());

        let (status, _, body) = get(&state, "/post/down").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Carregando..."));
        wait_until_settled(&state, "/post/down").await;
        assert_eq!(source.calls(), 1);

        // within the retry window the CMS is left alone
        for _ in 0..3 {
            let (status, headers, body) = fetch(&state, "/post/down").await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(headers[header::RETRY_AFTER], "10");
            assert_eq!(headers[header::CACHE_CONTROL], "no-store");
            assert!(body.contains("Não foi possível carregar o post"));
            assert!(!state.cache.is_in_flight("/post/down"));
        }
        assert_eq!(source.calls(), 1);

        // once it has passed, one retry is made
        state.cache.insert(
            "/post/down",
            CacheEntry::aged("retry".to_string(), Outcome::Failed, Duration::from_secs(11)),
        );
        let (status, _, _) = get(&state, "/post/down").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        wait_until_settled(&state, "/post/down").await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_regeneration_keeps_rendered_post() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source();
        source.failing.insert("p1".to_string());
        let state = state(dir.path(), source);
        state.cache.insert(
            "/post/p1",
            CacheEntry::aged("old post".to_string(), Outcome::Found, Duration::from_secs(5)),
        );

        let (status, _, body) = get(&state, "/post/p1").await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "old post"));
        wait_until_settled(&state, "/post/p1").await;

        let (status, _, body) = get(&state, "/post/p1").await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "old post"));
    }

    #[tokio::test]
    async fn test_post_file_paths_redirect_to_route() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), source());
        let post_dir = dir.path().join("public/post/gone");
        fs::create_dir_all(&post_dir).unwrap();
        fs::write(post_dir.join("index.html"), "built before deletion").unwrap();

        for uri in ["/post/gone/", "/post/gone/index.html"] {
            let (status, headers, body) = fetch(&state, uri).await;
            assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
            assert_eq!(headers[header::LOCATION], "/post/gone");
            assert!(!body.contains("built before deletion"));
        }

        let (_, _, body) = get(&state, "/post/gone").await;
        assert!(body.contains("Carregando..."));
        wait_until_settled(&state, "/post/gone").await;
        let (status, _, _) = get(&state, "/post/gone").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
