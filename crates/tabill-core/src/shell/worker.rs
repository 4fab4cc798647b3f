use futures::future::try_join_all;
use reqwest::Url;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::cache::CacheStorage;
use super::message::{ShellRequest, ShellResponse};
use super::network::Network;
use super::{ShellError, CACHE_VERSION, PRECACHE_MANIFEST};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellPhase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never control clients
    Redundant,
}

#[derive(Debug)]
struct WorkerState {
    phase: ShellPhase,
    skip_waiting: bool,
    clients_claimed: bool,
}

/// One version of the offline shell.
pub struct ShellWorker<C, N> {
    cache: C,
    network: N,
    version: String,
    scope: Url,
    manifest: Vec<String>,
    state: RwLock<WorkerState>,
}

impl<C: CacheStorage, N: Network> ShellWorker<C, N> {
    pub fn new(cache: C, network: N, scope: Url) -> Self {
        Self {
            cache,
            network,
            version: CACHE_VERSION.to_string(),
            scope,
            manifest: PRECACHE_MANIFEST.iter().map(|p| p.to_string()).collect(),
            state: RwLock::new(WorkerState {
                phase: ShellPhase::Parsed,
                skip_waiting: false,
                clients_claimed: false,
            }),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_manifest(mut self, manifest: Vec<String>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub async fn phase(&self) -> ShellPhase {
        self.state.read().await.phase
    }

    /// Whether install asked to replace the previous version without waiting.
    pub async fn skip_waiting(&self) -> bool {
        self.state.read().await.skip_waiting
    }

    pub async fn clients_claimed(&self) -> bool {
        self.state.read().await.clients_claimed
    }

    async fn set_phase(&self, phase: ShellPhase) {
        self.state.write().await.phase = phase;
        debug!(version = %self.version, ?phase, "Shell phase changed");
    }

    fn resolve(&self, path: &str) -> Result<Url, ShellError> {
        self.scope
            .join(path)
            .map_err(|e| ShellError::InvalidUrl(format!("{}: {}", path, e)))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Pre-cache the manifest into this version's bucket.
    ///
    /// All entries are fetched before any is stored; one failure fails the
    /// install and leaves the version redundant.
    pub async fn install(&self) -> Result<(), ShellError> {
        self.set_phase(ShellPhase::Installing).await;
        match self.precache().await {
            Ok(count) => {
                {
                    let mut state = self.state.write().await;
                    state.skip_waiting = true;
                    state.phase = ShellPhase::Installed;
                }
                info!(version = %self.version, entries = count, "Shell installed");
                Ok(())
            }
            Err(e) => {
                warn!(version = %self.version, error = %e, "Shell install failed");
                self.set_phase(ShellPhase::Redundant).await;
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, ShellError> {
        let requests = self
            .manifest
            .iter()
            .map(|path| self.resolve(path).map(ShellRequest::get))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.iter().map(|r| self.network.fetch(r))).await?;

        for (request, response) in requests.iter().zip(&responses) {
            if response.status != 200 {
                return Err(ShellError::Precache {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
        }
        self.cache.open(&self.version)?;
        for (request, response) in requests.iter().zip(&responses) {
            self.cache.put(&self.version, request, response)?;
        }
        Ok(requests.len())
    }

    /// Take control using a bucket installed by an earlier run of this
    /// version, as a browser keeps an active worker across restarts.
    /// Returns false when that bucket does not hold the cached document.
    pub async fn resume(&self) -> Result<bool, ShellError> {
        let root = ShellRequest::get(self.resolve("/")?);
        if self.cache.match_request(&self.version, &root)?.is_none() {
            return Ok(false);
        }
        {
            let mut state = self.state.write().await;
            state.clients_claimed = true;
            state.phase = ShellPhase::Activated;
        }
        info!(version = %self.version, "Shell resumed from existing cache");
        Ok(true)
    }

    /// Purge every bucket but this version's and take control of clients.
    /// Returns the names of the purged buckets.
    pub async fn activate(&self) -> Result<Vec<String>, ShellError> {
        let phase = self.phase().await;
        if !matches!(phase, ShellPhase::Installed | ShellPhase::Activated) {
            return Err(ShellError::NotInstalled(self.version.clone()));
        }
        self.set_phase(ShellPhase::Activating).await;

        // Best effort: failures are logged and the bucket is left behind
        let names = self.cache.keys().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list shell caches, skipping purge");
            Vec::new()
        });
        let mut purged = Vec::new();
        for name in names.into_iter().filter(|n| *n != self.version) {
            match self.cache.delete(&name) {
                Ok(true) => {
                    info!(bucket = %name, "Purged old shell cache");
                    purged.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(bucket = %name, error = %e, "Failed to purge shell cache"),
            }
        }

        {
            let mut state = self.state.write().await;
            state.clients_claimed = true;
            state.phase = ShellPhase::Activated;
        }
        info!(version = %self.version, purged = purged.len(), "Shell activated");
        Ok(purged)
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Answer a request.
    ///
    /// Intercepted requests always produce a response. Writes are not
    /// intercepted, and neither is anything before activation; those go
    /// straight to the network and its errors are returned.
    pub async fn fetch(&self, request: ShellRequest) -> Result<ShellResponse, ShellError> {
        if self.phase().await != ShellPhase::Activated {
            debug!(url = %request.url, "Shell not in control, passing through");
            return self.network.fetch(&request).await;
        }

        if request.is_navigation() {
            Ok(self.network_first(&request).await)
        } else if request.is_safe() {
            Ok(self.cache_first(&request).await)
        } else {
            self.network.fetch(&request).await
        }
    }

    async fn network_first(&self, request: &ShellRequest) -> ShellResponse {
        let error = match self.network.fetch(request).await {
            Ok(response) => return response,
            Err(e) => e,
        };
        debug!(url = %request.url, error = %error, "Navigation failed, serving shell");

        let root = match self.resolve("/") {
            Ok(url) => ShellRequest::get(url),
            Err(_) => return ShellResponse::offline_placeholder(),
        };
        match self.cache.match_request(&self.version, &root) {
            Ok(Some(cached)) => cached,
            Ok(None) => ShellResponse::offline_placeholder(),
            Err(e) => {
                warn!(error = %e, "Failed to read cached shell document");
                ShellResponse::offline_placeholder()
            }
        }
    }

    async fn cache_first(&self, request: &ShellRequest) -> ShellResponse {
        match self.cache.match_request(&self.version, request) {
            Ok(Some(cached)) => {
                debug!(url = %request.url, "Cache hit");
                return cached;
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache read failed, treating as miss"),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable_for(&self.scope) {
                    if let Err(e) = self.cache.put(&self.version, request, &response) {
                        warn!(url = %request.url, error = %e, "Failed to cache response");
                    }
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Fetch failed with nothing cached");
                ShellResponse::network_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::Method;

    use crate::shell::{DiskCacheStorage, MemoryCacheStorage, ResponseType, OFFLINE_BODY};

    const SCOPE: &str = "https://app.tabill.in/";

    /// Serves canned bodies by URL; unknown URLs get a 404.
    #[derive(Default)]
    struct FakeNetwork {
        pages: Mutex<HashMap<String, ShellResponse>>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeNetwork {
        fn serve(&self, path: &str, status: u16, body: &str) {
            let url = url(path);
            let response = ShellResponse::new(status, body).with_url(&url);
            self.pages
                .lock()
                .expect("pages")
                .insert(url.to_string(), response);
        }

        fn serve_response(&self, path: &str, response: ShellResponse) {
            self.pages
                .lock()
                .expect("pages")
                .insert(url(path).to_string(), response);
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn fetch(&self, request: &ShellRequest) -> Result<ShellResponse, ShellError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(ShellError::Offline(request.url.to_string()));
            }
            let pages = self.pages.lock().expect("pages");
            Ok(pages
                .get(request.url.as_str())
                .cloned()
                .unwrap_or_else(|| ShellResponse::new(404, "not found").with_url(&request.url)))
        }
    }

    fn url(path: &str) -> Url {
        Url::parse(SCOPE)
            .and_then(|scope| scope.join(path))
            .expect("url")
    }

    fn network_with_shell() -> Arc<FakeNetwork> {
        let network = Arc::new(FakeNetwork::default());
        network.serve("/", 200, "<html>shell</html>");
        network.serve("/manifest.webmanifest", 200, "{}");
        network.serve("/icons/icon-192.png?v=2", 200, "png192");
        network.serve("/icons/icon-512.png?v=2", 200, "png512");
        network
    }

    type TestWorker = ShellWorker<Arc<MemoryCacheStorage>, Arc<FakeNetwork>>;

    async fn active_worker() -> (TestWorker, Arc<MemoryCacheStorage>, Arc<FakeNetwork>) {
        let cache = Arc::new(MemoryCacheStorage::new());
        let network = network_with_shell();
        let worker = ShellWorker::new(cache.clone(), network.clone(), url("/"));
        worker.install().await.expect("install");
        worker.activate().await.expect("activate");
        (worker, cache, network)
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let cache = Arc::new(MemoryCacheStorage::new());
        let worker = ShellWorker::new(cache.clone(), network_with_shell(), url("/"));

        worker.install().await.expect("install");

        assert_eq!(worker.phase().await, ShellPhase::Installed);
        assert!(worker.skip_waiting().await);
        assert!(!worker.clients_claimed().await);
        let keys: Vec<String> = cache
            .entries(CACHE_VERSION)
            .expect("entries")
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "GET https://app.tabill.in/",
                "GET https://app.tabill.in/icons/icon-192.png?v=2",
                "GET https://app.tabill.in/icons/icon-512.png?v=2",
                "GET https://app.tabill.in/manifest.webmanifest",
            ]
        );
    }

    #[tokio::test]
    async fn test_install_fails_on_missing_asset() {
        let cache = Arc::new(MemoryCacheStorage::new());
        let network = network_with_shell();
        network.serve("/icons/icon-512.png?v=2", 404, "");
        let worker = ShellWorker::new(cache.clone(), network, url("/"));

        let err = worker.install().await.expect_err("install should fail");
        assert!(matches!(err, ShellError::Precache { status: 404, .. }));
        assert_eq!(worker.phase().await, ShellPhase::Redundant);
        assert!(cache.entries(CACHE_VERSION).expect("entries").is_empty());
        assert!(matches!(
            worker.activate().await,
            Err(ShellError::NotInstalled(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_purges_other_buckets_idempotently() {
        let cache = Arc::new(MemoryCacheStorage::new());
        cache.open("tabill-shell-v1").expect("open");
        cache.open("some-other-cache").expect("open");
        let worker = ShellWorker::new(cache.clone(), network_with_shell(), url("/"));
        worker.install().await.expect("install");

        let mut purged = worker.activate().await.expect("activate");
        purged.sort();
        assert_eq!(purged, vec!["some-other-cache", "tabill-shell-v1"]);
        assert_eq!(cache.keys().expect("keys"), vec![CACHE_VERSION]);
        assert!(worker.clients_claimed().await);

        let entries_before = cache.entries(CACHE_VERSION).expect("entries").len();
        assert!(worker.activate().await.expect("activate again").is_empty());
        assert_eq!(cache.keys().expect("keys"), vec![CACHE_VERSION]);
        assert_eq!(
            cache.entries(CACHE_VERSION).expect("entries").len(),
            entries_before
        );
    }

    #[tokio::test]
    async fn test_navigation_uses_network_and_does_not_cache() {
        let (worker, cache, network) = active_worker().await;
        network.serve("/orders", 200, "<html>orders</html>");

        let response = worker
            .fetch(ShellRequest::navigate(url("/orders")))
            .await
            .expect("fetch");

        assert_eq!(response.body, b"<html>orders</html>");
        let nav_key = ShellRequest::get(url("/orders"));
        assert_eq!(
            cache.match_request(CACHE_VERSION, &nav_key).expect("match"),
            None
        );
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_cached_root() {
        let (worker, _cache, network) = active_worker().await;
        network.go_offline();

        let response = worker
            .fetch(ShellRequest::navigate(url("/billing?branch=b2")))
            .await
            .expect("fetch");

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_cached_root_serves_placeholder() {
        let cache = Arc::new(MemoryCacheStorage::new());
        let network = network_with_shell();
        let worker = ShellWorker::new(cache, network.clone(), url("/"))
            .with_manifest(vec!["/manifest.webmanifest".to_string()]);
        worker.install().await.expect("install");
        worker.activate().await.expect("activate");
        network.go_offline();

        let response = worker
            .fetch(ShellRequest::navigate(url("/menu")))
            .await
            .expect("fetch");

        assert_eq!(response.status, 200);
        assert_eq!(response.body, OFFLINE_BODY.as_bytes());
        assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_get_is_served_from_cache_without_network() {
        let (worker, _cache, network) = active_worker().await;
        network.serve("/assets/app.js", 200, "console.log(1)");

        let first = worker
            .fetch(ShellRequest::get(url("/assets/app.js")))
            .await
            .expect("fetch");
        assert_eq!(first.body, b"console.log(1)");
        let calls_after_first = network.calls();

        // The origin changes, but the cached copy keeps being served
        network.serve("/assets/app.js", 200, "console.log(2)");
        let second = worker
            .fetch(ShellRequest::get(url("/assets/app.js")))
            .await
            .expect("fetch");

        assert_eq!(second.body, b"console.log(1)");
        assert_eq!(network.calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_only_same_origin_basic_200_is_cached() {
        let (worker, cache, network) = active_worker().await;
        network.serve("/missing.css", 404, "");
        let cdn = Url::parse("https://cdn.example.com/font.woff2").expect("url");
        network.serve_response(
            cdn.as_str(),
            ShellResponse::new(200, "font")
                .with_url(&cdn)
                .with_type(ResponseType::Cors),
        );

        worker
            .fetch(ShellRequest::get(url("/missing.css")))
            .await
            .expect("fetch");
        worker
            .fetch(ShellRequest::get(cdn.clone()))
            .await
            .expect("fetch");

        assert_eq!(
            cache
                .match_request(CACHE_VERSION, &ShellRequest::get(url("/missing.css")))
                .expect("match"),
            None
        );
        assert_eq!(
            cache
                .match_request(CACHE_VERSION, &ShellRequest::get(cdn))
                .expect("match"),
            None
        );
    }

    #[tokio::test]
    async fn test_offline_miss_returns_network_error() {
        let (worker, _cache, network) = active_worker().await;
        network.go_offline();

        let response = worker
            .fetch(ShellRequest::get(url("/assets/never-fetched.js")))
            .await
            .expect("fetch");

        assert!(response.is_network_error());
        assert_eq!(response.status, 0);
    }

    #[tokio::test]
    async fn test_offline_hit_serves_precached_icon() {
        let (worker, _cache, network) = active_worker().await;
        network.go_offline();

        let response = worker
            .fetch(ShellRequest::get(url("/icons/icon-192.png?v=2")))
            .await
            .expect("fetch");

        assert_eq!(response.body, b"png192");
    }

    #[tokio::test]
    async fn test_writes_bypass_cache() {
        let (worker, cache, network) = active_worker().await;
        network.serve("/api/orders", 201, "{}");

        let post = ShellRequest::new(Method::POST, url("/api/orders")).with_body(b"{}".to_vec());
        let response = worker.fetch(post.clone()).await.expect("fetch");
        assert_eq!(response.status, 201);
        assert_eq!(cache.match_request(CACHE_VERSION, &post).expect("match"), None);

        network.go_offline();
        assert!(matches!(
            worker.fetch(post).await,
            Err(ShellError::Offline(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_serves_previous_install_offline() {
        let cache = Arc::new(MemoryCacheStorage::new());
        let first = ShellWorker::new(cache.clone(), network_with_shell(), url("/"));
        first.install().await.expect("install");
        first.activate().await.expect("activate");
        drop(first);

        let network = Arc::new(FakeNetwork::default());
        network.go_offline();
        let restarted = ShellWorker::new(cache.clone(), network.clone(), url("/"));
        assert!(restarted.install().await.is_err());
        assert!(restarted.resume().await.expect("resume"));

        let response = restarted
            .fetch(ShellRequest::navigate(url("/dashboard")))
            .await
            .expect("fetch");
        assert_eq!(response.body, b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_resume_without_bucket() {
        let worker = ShellWorker::new(
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(FakeNetwork::default()),
            url("/"),
        )
        .with_version("tabill-shell-v9");
        assert!(!worker.resume().await.expect("resume"));
        assert_eq!(worker.phase().await, ShellPhase::Parsed);
    }

    #[tokio::test]
    async fn test_failed_first_install_leaves_nothing_to_resume() {
        let cache = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(FakeNetwork::default());
        network.go_offline();
        let worker = ShellWorker::new(cache.clone(), network, url("/"));

        assert!(worker.install().await.is_err());
        assert!(cache.keys().expect("keys").is_empty());
        assert!(!worker.resume().await.expect("resume"));
        assert_eq!(worker.phase().await, ShellPhase::Redundant);
    }

    #[tokio::test]
    async fn test_activate_survives_foreign_cache_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join(".Trash")).expect("mkdir");
        let cache = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).expect("storage"));
        cache.open("tabill-shell-v1").expect("open");
        let worker = ShellWorker::new(cache.clone(), network_with_shell(), url("/"));

        worker.install().await.expect("install");
        let purged = worker.activate().await.expect("activate");

        assert_eq!(purged, vec!["tabill-shell-v1".to_string()]);
        assert_eq!(worker.phase().await, ShellPhase::Activated);
        assert!(worker.clients_claimed().await);
        assert!(dir.path().join(".Trash").is_dir());
    }

    /// Storage whose bucket listing and deletion always fail.
    struct UnlistableStorage(MemoryCacheStorage);

    impl CacheStorage for UnlistableStorage {
        fn open(&self, bucket: &str) -> anyhow::Result<()> {
            self.0.open(bucket)
        }
        fn has(&self, bucket: &str) -> anyhow::Result<bool> {
            self.0.has(bucket)
        }
        fn delete(&self, _bucket: &str) -> anyhow::Result<bool> {
            anyhow::bail!("permission denied")
        }
        fn keys(&self) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("permission denied")
        }
        fn match_request(
            &self,
            bucket: &str,
            request: &ShellRequest,
        ) -> anyhow::Result<Option<ShellResponse>> {
            self.0.match_request(bucket, request)
        }
        fn put(&self, bucket: &str, request: &ShellRequest, response: &ShellResponse) -> anyhow::Result<()> {
            self.0.put(bucket, request, response)
        }
        fn entries(&self, bucket: &str) -> anyhow::Result<Vec<crate::shell::EntryInfo>> {
            self.0.entries(bucket)
        }
    }

    #[tokio::test]
    async fn test_activate_takes_control_when_purge_fails() {
        let cache = UnlistableStorage(MemoryCacheStorage::new());
        let network = network_with_shell();
        let worker = ShellWorker::new(cache, network.clone(), url("/"));
        worker.install().await.expect("install");

        assert!(worker.activate().await.expect("activate").is_empty());
        assert_eq!(worker.phase().await, ShellPhase::Activated);

        network.go_offline();
        let response = worker
            .fetch(ShellRequest::navigate(url("/orders")))
            .await
            .expect("fetch");
        assert_eq!(response.body, b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_not_controlling_before_activation() {
        let cache = Arc::new(MemoryCacheStorage::new());
        let network = network_with_shell();
        let worker = ShellWorker::new(cache, network.clone(), url("/"));
        worker.install().await.expect("install");
        network.go_offline();

        assert!(worker
            .fetch(ShellRequest::navigate(url("/")))
            .await
            .is_err());
    }
}
