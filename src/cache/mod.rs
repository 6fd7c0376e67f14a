//! Render cache and build manifest
//!
//! The server keeps the rendered HTML of every route in a [`RenderCache`].
//! An entry is fresh for its route's revalidation window; once stale it is
//! still served while a single background regeneration replaces it.
//!
//! `generate` records what it pre-rendered in a [`BuildManifest`], which the
//! server uses to seed the cache from the output directory on startup.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache directory, relative to the site root
pub const CACHE_DIR: &str = ".spacetraveling-cache";

/// Manifest file, relative to the site root
const MANIFEST_FILE: &str = ".spacetraveling-cache/manifest.json";

/// Record of a `generate` run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildManifest {
    /// Version of the manifest format
    pub version: u32,
    /// When the build finished
    pub generated_at: Option<DateTime<Utc>>,
    /// Uids of pre-rendered posts, in listing order
    pub posts: Vec<String>,
    /// Cursor of the page after the pre-rendered first page
    pub next_page: Option<String>,
}

impl BuildManifest {
    /// Current manifest format version
    const VERSION: u32 = 1;

    /// Create a manifest stamped with the current time
    pub fn new(posts: Vec<String>, next_page: Option<String>) -> Self {
        Self {
            version: Self::VERSION,
            generated_at: Some(Utc::now()),
            posts,
            next_page,
        }
    }

    /// Load the manifest from disk; missing or outdated manifests are `None`
    pub fn load(base_dir: &Path) -> Option<Self> {
        let content = fs::read_to_string(base_dir.join(MANIFEST_FILE)).ok()?;
        match serde_json::from_str::<BuildManifest>(&content) {
            Ok(manifest) if manifest.version == Self::VERSION => Some(manifest),
            Ok(_) => {
                tracing::info!("Build manifest version mismatch, ignoring it");
                None
            }
            Err(e) => {
                tracing::warn!("Unreadable build manifest: {}", e);
                None
            }
        }
    }

    /// Save the manifest to disk
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        fs::create_dir_all(base_dir.join(CACHE_DIR))?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(base_dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }

    /// Time elapsed since the build
    pub fn age(&self) -> Duration {
        self.generated_at
            .and_then(|at| (Utc::now() - at).to_std().ok())
            .unwrap_or_default()
    }
}

/// Default number of not-found and failed renders kept at once
pub const NEGATIVE_LIMIT: usize = 256;

/// How a route resolved when it was rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The content exists
    Found,
    /// The CMS has no such document (served as 404)
    NotFound,
    /// The CMS could not be reached (served as 503)
    Failed,
}

impl Outcome {
    /// Outcomes that do not correspond to CMS content
    pub fn is_negative(self) -> bool {
        self != Outcome::Found
    }
}

/// A rendered route
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub html: String,
    pub outcome: Outcome,
    pub generated_at: Instant,
}

impl CacheEntry {
    pub fn new(html: String, outcome: Outcome) -> Self {
        Self {
            html,
            outcome,
            generated_at: Instant::now(),
        }
    }

    /// Entry rendered `age` ago
    pub fn aged(html: String, outcome: Outcome, age: Duration) -> Self {
        let now = Instant::now();
        Self {
            html,
            outcome,
            generated_at: now.checked_sub(age).unwrap_or(now),
        }
    }

    pub fn age(&self) -> Duration {
        self.generated_at.elapsed()
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Missing,
}

/// In-memory cache of rendered routes with single-flight regeneration
///
/// Found routes are bounded by the CMS content. Not-found and failed renders
/// can be requested for arbitrary uids, so at most `negative_limit` of them
/// are kept; the oldest is evicted first.
#[derive(Debug)]
pub struct RenderCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashSet<String>>,
    negative_limit: usize,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::with_negative_limit(NEGATIVE_LIMIT)
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_negative_limit(negative_limit: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            negative_limit,
        }
    }

    /// Look a route up against its revalidation window
    pub fn lookup(&self, route: &str, max_age: Duration) -> Lookup {
        let entries = lock(&self.entries);
        match entries.get(route) {
            Some(entry) if entry.age() < max_age => Lookup::Fresh(entry.clone()),
            Some(entry) => Lookup::Stale(entry.clone()),
            None => Lookup::Missing,
        }
    }

    pub fn insert(&self, route: &str, entry: CacheEntry) {
        let mut entries = lock(&self.entries);
        let negative = entry.outcome.is_negative();
        entries.insert(route.to_string(), entry);
        if negative {
            evict_negative(&mut entries, self.negative_limit);
        }
    }

    /// Claim the regeneration of a route; `false` if one is already running
    pub fn try_begin(&self, route: &str) -> bool {
        lock(&self.in_flight).insert(route.to_string())
    }

    /// Release a claimed route, storing the new render if there is one
    pub fn finish(&self, route: &str, entry: Option<CacheEntry>) {
        if let Some(entry) = entry {
            self.insert(route, entry);
        }
        lock(&self.in_flight).remove(route);
    }

    /// Release a claimed route whose regeneration failed
    ///
    /// A previous render of the route is kept; otherwise `failed` is stored.
    pub fn finish_failed(&self, route: &str, failed: CacheEntry) {
        let replace = match lock(&self.entries).get(route) {
            Some(entry) => entry.outcome == Outcome::Failed,
            None => true,
        };
        self.finish(route, replace.then_some(failed));
    }

    pub fn is_in_flight(&self, route: &str) -> bool {
        lock(&self.in_flight).contains(route)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop the oldest negative entries until at most `limit` remain
fn evict_negative(entries: &mut HashMap<String, CacheEntry>, limit: usize) {
    let mut negative: Vec<(Instant, String)> = entries
        .iter()
        .filter(|(_, e)| e.outcome.is_negative())
        .map(|(route, e)| (e.generated_at, route.clone()))
        .collect();
    if negative.len() <= limit {
        return;
    }
    negative.sort();
    let excess = negative.len() - limit;
    for (_, route) in negative.into_iter().take(excess) {
        entries.remove(&route);
    }
}

/// Lock a mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
