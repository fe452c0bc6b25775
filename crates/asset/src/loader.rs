//! Asynchronous fetching of OBJ/MTL/texture resources.
//!
//! Each request runs on its own worker thread; results come back over a
//! channel tagged with the [`Generation`] they were issued under. The owner
//! drains the channel on its own thread, so all model state is mutated in
//! one place.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};

/// Source of raw bytes for a url.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Serves urls from a directory; a leading `/` is relative to `root`.
#[derive(Clone, Debug)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetch for FsFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.root.join(url.trim_start_matches('/'));
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// In-memory url -> bytes table.
#[derive(Clone, Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(url.into(), bytes.into());
        self
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match self.files.get(url) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("Not found: {url}"),
        }
    }
}

/// Load request counter. Results from an older generation are stale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// What is being fetched and where its result goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetRequest {
    Obj { url: String },
    /// Material library for `slot` of the document.
    Mtl { url: String, slot: usize },
    /// Texture for `slot` of the texture registry.
    Texture { url: String, slot: usize },
}

impl AssetRequest {
    pub fn url(&self) -> &str {
        match self {
            Self::Obj { url } | Self::Mtl { url, .. } | Self::Texture { url, .. } => url,
        }
    }
}

/// A finished fetch.
#[derive(Debug)]
pub struct LoadEvent {
    pub generation: Generation,
    pub request: AssetRequest,
    pub result: Result<Vec<u8>>,
}

pub struct AssetLoader {
    fetcher: Arc<dyn Fetch>,
    tx: Sender<LoadEvent>,
    rx: Receiver<LoadEvent>,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { fetcher, tx, rx }
    }

    /// Start fetching `request` in the background.
    pub fn request(&self, generation: Generation, request: AssetRequest) {
        log::debug!("Fetching {} (generation {})", request.url(), generation.0);
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let job = request.clone();

        let spawned = thread::Builder::new()
            .name("asset-fetch".into())
            .spawn(move || {
                let result = fetcher.fetch(job.url());
                // A closed channel means the loader is gone; nobody is waiting.
                let _ = tx.send(LoadEvent {
                    generation,
                    request: job,
                    result,
                });
            });

        if let Err(err) = spawned {
            let _ = self.tx.send(LoadEvent {
                generation,
                request,
                result: Err(anyhow!("Failed to spawn fetch thread: {err}")),
            });
        }
    }

    /// Next finished fetch, if any, without blocking.
    pub fn try_next(&self) -> Option<LoadEvent> {
        self.rx.try_recv().ok()
    }

    /// Next finished fetch, waiting at most `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Option<LoadEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// `name` placed in the directory of `base` ("/m/a.obj" + "a.mtl" = "/m/a.mtl").
pub fn resolve_sibling(base: &str, name: &str) -> String {
    match base.rfind('/') {
        Some(i) => format!("{}{name}", &base[..=i]),
        None => name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_paths() {
        assert_eq!(resolve_sibling("/models/cube.obj", "cube.mtl"), "/models/cube.mtl");
        assert_eq!(resolve_sibling("/cube.obj", "cube.mtl"), "/cube.mtl");
        assert_eq!(resolve_sibling("cube.obj", "cube.mtl"), "cube.mtl");
        assert_eq!(
            resolve_sibling("http://host/m/a.obj", "tex/a.png"),
            "http://host/m/tex/a.png"
        );
    }

    #[test]
    fn memory_fetcher() {
        let f = MemoryFetcher::new().with("/a.obj", "v 0 0 0");
        assert_eq!(f.fetch("/a.obj").unwrap(), b"v 0 0 0");
        assert!(f.fetch("/b.obj").is_err());
    }

    #[test]
    fn fs_fetcher_reads_under_root() {
        let dir = std::env::temp_dir().join(format!("asset-fetch-test-{}", std::process::id()));
        fs::create_dir_all(dir.join("models")).unwrap();
        fs::write(dir.join("models/a.mtl"), "newmtl a").unwrap();

        let f = FsFetcher::new(&dir);
        assert_eq!(f.fetch("/models/a.mtl").unwrap(), b"newmtl a");
        assert_eq!(f.fetch("models/a.mtl").unwrap(), b"newmtl a");
        assert!(f.fetch("/models/missing.mtl").is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn events_carry_generation_and_request() {
        let loader = AssetLoader::new(Arc::new(MemoryFetcher::new().with("/a.obj", "x")));
        let request = AssetRequest::Mtl {
            url: "/a.obj".into(),
            slot: 3,
        };
        loader.request(Generation(7), request.clone());

        let event = loader
            .next_timeout(Duration::from_secs(5))
            .expect("fetch finished");
        assert_eq!(event.generation, Generation(7));
        assert_eq!(event.request, request);
        assert_eq!(event.result.unwrap(), b"x");
        assert!(loader.try_next().is_none());
    }

    #[test]
    fn failed_fetch_is_reported() {
        let loader = AssetLoader::new(Arc::new(MemoryFetcher::new()));
        loader.request(
            Generation(1),
            AssetRequest::Obj {
                url: "/nope.obj".into(),
            },
        );
        let event = loader.next_timeout(Duration::from_secs(5)).unwrap();
        assert!(event.result.is_err());
    }

    #[test]
    fn generations_order() {
        let g = Generation::default();
        assert!(g.next() > g);
        assert_eq!(g.next().next(), Generation(2));
    }
}
