//! Load lifecycle for one model at a time.
//!
//! `load` starts a new generation and fetches the OBJ. Once it parses, its
//! material libraries are fetched, and each library's texture maps after it.
//! `poll` is meant to be called every frame: it applies finished fetches and,
//! the first time every library and texture has settled, flattens the
//! document and hands back a [`LoadedModel`]. The document is dropped at that
//! point, so a model is only ever delivered once.

use std::{
    mem,
    sync::Arc,
    time::{Duration, Instant},
};

use corelib::{CoreResult, LoadOptions, RenderFlags};

use crate::loader::{AssetLoader, AssetRequest, Fetch, Generation, LoadEvent};
use crate::mesh::FlattenedMesh;
use crate::mtl::TextureKind;
use crate::obj::{ObjDocument, ObjStats};
use crate::texture::{LoadedTexture, TextureRegistry};

/// Everything the renderer needs from a finished load.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedModel {
    pub name: String,
    pub mesh: FlattenedMesh,
    pub textures: Vec<LoadedTexture>,
    pub stats: ObjStats,
}

impl LoadedModel {
    /// First texture of `kind`, in request order.
    pub fn texture(&self, kind: TextureKind) -> Option<&LoadedTexture> {
        self.textures.iter().find(|t| t.kind == kind)
    }
}

#[derive(Debug)]
pub enum LoadStatus {
    /// No load in progress.
    Idle,
    Loading,
    Ready(LoadedModel),
    Failed(String),
}

enum Stage {
    Idle,
    FetchingObj,
    Resolving {
        doc: ObjDocument,
        textures: TextureRegistry,
    },
}

pub struct Session {
    loader: AssetLoader,
    options: LoadOptions,
    flags: RenderFlags,
    generation: Generation,
    stage: Stage,
}

impl Session {
    pub fn new(fetcher: Arc<dyn Fetch>, options: LoadOptions, flags: RenderFlags) -> CoreResult<Self> {
        options.validate()?;
        Ok(Self {
            loader: AssetLoader::new(fetcher),
            options,
            flags,
            generation: Generation::default(),
            stage: Stage::Idle,
        })
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    /// Takes effect for the next model delivered.
    pub fn set_flags(&mut self, flags: RenderFlags) {
        self.flags = flags;
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Start loading `url`, superseding any load in progress.
    pub fn load(&mut self, url: &str) -> Generation {
        self.generation = self.generation.next();
        self.stage = Stage::FetchingObj;
        log::info!("Loading {url} (generation {})", self.generation.0);
        self.loader.request(
            self.generation,
            AssetRequest::Obj {
                url: url.to_owned(),
            },
        );
        self.generation
    }

    /// Abandon the current load; its pending fetches become stale.
    pub fn cancel(&mut self) {
        if !matches!(self.stage, Stage::Idle) {
            log::info!("Cancelled generation {}", self.generation.0);
        }
        self.generation = self.generation.next();
        self.stage = Stage::Idle;
    }

    /// All material libraries ready and all textures settled.
    pub fn is_ready(&self) -> bool {
        match &self.stage {
            Stage::Resolving { doc, textures } => doc.libraries_ready() && textures.all_settled(),
            Stage::Idle | Stage::FetchingObj => false,
        }
    }

    /// Apply finished fetches without blocking.
    pub fn poll(&mut self) -> LoadStatus {
        while let Some(event) = self.loader.try_next() {
            if let Some(failed) = self.handle(event) {
                return failed;
            }
        }
        self.finish_if_ready()
    }

    /// Like [`poll`](Self::poll) but blocks until the load finishes, fails
    /// or `timeout` elapses (then `Loading` is returned).
    pub fn wait(&mut self, timeout: Duration) -> LoadStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self.poll() {
                LoadStatus::Loading => {}
                done => return done,
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return LoadStatus::Loading;
            }
            if let Some(event) = self.loader.next_timeout(remaining) {
                if let Some(failed) = self.handle(event) {
                    return failed;
                }
            }
        }
    }

    /// Returns a status only when the event ends the load with a failure.
    fn handle(&mut self, event: LoadEvent) -> Option<LoadStatus> {
        let LoadEvent {
            generation,
            request,
            result,
        } = event;
        if generation != self.generation {
            log::debug!(
                "Dropping stale {} from generation {}",
                request.url(),
                generation.0
            );
            return None;
        }

        match request {
            AssetRequest::Obj { url } => {
                if !matches!(self.stage, Stage::FetchingObj) {
                    log::debug!("Unexpected OBJ result for {url}");
                    return None;
                }
                let parsed = result
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .and_then(|src| Ok(ObjDocument::parse(&src, &url, &self.options)?));
                match parsed {
                    Ok(doc) => {
                        let stats = doc.stats();
                        log::info!(
                            "Parsed {url}: {} groups, {} faces, {} material libraries",
                            stats.groups,
                            stats.faces,
                            doc.libraries().len()
                        );
                        for (slot, lib) in doc.libraries().iter().enumerate() {
                            self.loader.request(
                                self.generation,
                                AssetRequest::Mtl {
                                    url: lib.url.clone(),
                                    slot,
                                },
                            );
                        }
                        self.stage = Stage::Resolving {
                            doc,
                            textures: TextureRegistry::new(),
                        };
                        None
                    }
                    Err(err) => {
                        log::error!("Failed to load {url}: {err:#}");
                        self.stage = Stage::Idle;
                        Some(LoadStatus::Failed(format!("{url}: {err:#}")))
                    }
                }
            }
            AssetRequest::Mtl { url, slot } => {
                let Stage::Resolving { doc, textures } = &mut self.stage else {
                    return None;
                };
                let text = match result.map(|b| String::from_utf8_lossy(&b).into_owned()) {
                    Ok(text) => Some(text),
                    Err(err) => {
                        log::warn!("Material library {url} unavailable: {err:#}");
                        None
                    }
                };
                for request in doc.complete_library(slot, text.as_deref(), &self.options) {
                    let url = request.url.clone();
                    let slot = textures.request(request);
                    self.loader
                        .request(self.generation, AssetRequest::Texture { url, slot });
                }
                None
            }
            AssetRequest::Texture { slot, .. } => {
                if let Stage::Resolving { textures, .. } = &mut self.stage {
                    textures.complete(slot, result);
                }
                None
            }
        }
    }

    fn finish_if_ready(&mut self) -> LoadStatus {
        if !self.is_ready() {
            return match self.stage {
                Stage::Idle => LoadStatus::Idle,
                Stage::FetchingObj | Stage::Resolving { .. } => LoadStatus::Loading,
            };
        }

        let Stage::Resolving { doc, textures } = mem::replace(&mut self.stage, Stage::Idle) else {
            return LoadStatus::Idle;
        };
        match FlattenedMesh::build(&doc, self.flags) {
            Ok(mesh) => LoadStatus::Ready(LoadedModel {
                name: doc.name().to_owned(),
                mesh,
                textures: textures.into_loaded(),
                stats: doc.stats(),
            }),
            Err(err) => {
                log::error!("Failed to flatten {}: {err}", doc.name());
                LoadStatus::Failed(format!("{}: {err}", doc.name()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryFetcher;
    use crate::texture::png_bytes;
    use anyhow::Result;
    use std::sync::{Mutex, mpsc};

    /// Holds back one url until released.
    struct GatedFetcher {
        files: MemoryFetcher,
        gated: String,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Fetch for GatedFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            if url == self.gated {
                let _ = self.release.lock().unwrap().recv();
            }
            self.files.fetch(url)
        }
    }

    const WAIT: Duration = Duration::from_secs(10);

    const CUBE_FACE: &str = "mtllib cube.mtl\n\
        v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
        vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
        usemtl red\nf 1/1 2/2 3/3 4/4\n";

    const CUBE_MTL: &str = "newmtl red\nKd 1 0 0\nmap_Kd red.png\nmap_Bump red_n.png\n";

    fn session(fetcher: MemoryFetcher) -> Session {
        Session::new(Arc::new(fetcher), LoadOptions::default(), RenderFlags::default())
            .expect("valid options")
    }

    fn expect_ready(status: LoadStatus) -> LoadedModel {
        match status {
            LoadStatus::Ready(model) => model,
            other => panic!("expected ready model, got {other:?}"),
        }
    }

    #[test]
    fn loads_model_materials_and_textures() {
        let fetcher = MemoryFetcher::new()
            .with("/m/cube.obj", CUBE_FACE)
            .with("/m/cube.mtl", CUBE_MTL)
            .with("/m/red.png", png_bytes(2, 2))
            .with("/m/red_n.png", png_bytes(1, 1));
        let mut s = session(fetcher);
        s.load("/m/cube.obj");

        let model = expect_ready(s.wait(WAIT));
        assert_eq!(model.name, "/m/cube.obj");
        assert_eq!(model.mesh.vertex_count(), 6);
        assert_eq!(model.mesh.vertex(0).unwrap().color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.textures.len(), 2);
        assert_eq!(model.texture(TextureKind::Diffuse).unwrap().data.width, 2);
        assert_eq!(model.texture(TextureKind::Bump).unwrap().url, "/m/red_n.png");
        assert_eq!(model.stats.faces, 1);
    }

    #[test]
    fn waits_for_every_library() {
        let files = MemoryFetcher::new()
            .with(
                "/m/two.obj",
                "mtllib a.mtl\nmtllib b.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\n\
                 usemtl red\nf 1 2 3\nusemtl blue\nf 1 2 3\n",
            )
            .with("/m/a.mtl", "newmtl red\nKd 1 0 0\n")
            .with("/m/b.mtl", "newmtl blue\nKd 0 0 1\n");
        let (release, gate) = mpsc::channel();
        let fetcher = GatedFetcher {
            files,
            gated: "/m/b.mtl".to_owned(),
            release: Mutex::new(gate),
        };
        let mut s = Session::new(Arc::new(fetcher), LoadOptions::default(), RenderFlags::default())
            .expect("valid options");
        s.load("/m/two.obj");

        // a.mtl settles; b.mtl is still in flight.
        assert!(matches!(s.wait(Duration::from_millis(200)), LoadStatus::Loading));
        assert!(!s.is_ready());

        release.send(()).unwrap();
        let model = expect_ready(s.wait(WAIT));
        assert_eq!(model.mesh.vertex(0).unwrap().color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.mesh.vertex(3).unwrap().color, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn byte_order_marks_are_ignored() {
        let fetcher = MemoryFetcher::new()
            .with(
                "/m/bom.obj",
                "\u{FEFF}mtllib m.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl red\nf 1 2 3\n",
            )
            // Invalid UTF-8 in a comment is decoded lossily.
            .with("/m/m.mtl", &b"\xEF\xBB\xBFnewmtl red\n# \xFF\nKd 1 0 0\n"[..]);
        let mut s = session(fetcher);
        s.load("/m/bom.obj");
        let model = expect_ready(s.wait(WAIT));
        assert_eq!(model.mesh.vertex_count(), 3);
        assert_eq!(model.mesh.vertex(0).unwrap().color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn model_is_delivered_once() {
        let mut s = session(MemoryFetcher::new().with("/t.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n"));
        s.load("/t.obj");
        expect_ready(s.wait(WAIT));
        assert!(matches!(s.poll(), LoadStatus::Idle));
        assert!(matches!(s.wait(Duration::from_millis(20)), LoadStatus::Idle));
        assert!(!s.is_ready());
    }

    #[test]
    fn missing_library_and_texture_do_not_block() {
        let fetcher = MemoryFetcher::new()
            .with("/m/cube.obj", CUBE_FACE)
            .with("/m/cube.mtl", "newmtl blue\nKd 0 0 1\nmap_Kd absent.png\n");
        let mut s = session(fetcher);
        s.load("/m/cube.obj");
        let model = expect_ready(s.wait(WAIT));
        assert!(model.textures.is_empty());
        // "red" is not in the library: fallback color.
        assert_eq!(model.mesh.vertex(0).unwrap().color, [0.0, 0.8, 0.0, 1.0]);

        let mut s = session(MemoryFetcher::new().with("/m/cube.obj", CUBE_FACE));
        s.load("/m/cube.obj");
        let model = expect_ready(s.wait(WAIT));
        assert_eq!(model.mesh.vertex_count(), 6);
    }

    #[test]
    fn missing_obj_fails() {
        let mut s = session(MemoryFetcher::new());
        s.load("/nope.obj");
        match s.wait(WAIT) {
            LoadStatus::Failed(msg) => assert!(msg.contains("/nope.obj")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(s.poll(), LoadStatus::Idle));
    }

    #[test]
    fn malformed_obj_discards_document() {
        let mut s = session(MemoryFetcher::new().with("/bad.obj", "v 0 0 zero\n"));
        s.load("/bad.obj");
        assert!(matches!(s.wait(WAIT), LoadStatus::Failed(_)));
        assert!(!s.is_ready());
    }

    #[test]
    fn superseded_load_is_inert() {
        let fetcher = MemoryFetcher::new()
            .with("/a.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n")
            .with("/b.obj", "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        let mut s = session(fetcher);
        let first = s.load("/a.obj");
        let second = s.load("/b.obj");
        assert!(second > first);

        let model = expect_ready(s.wait(WAIT));
        assert_eq!(model.name, "/b.obj");
        assert_eq!(model.mesh.vertex_count(), 6);
        // Whatever /a.obj produced is ignored.
        assert!(matches!(s.wait(Duration::from_millis(50)), LoadStatus::Idle));
    }

    #[test]
    fn cancel_drops_pending_results() {
        let mut s = session(MemoryFetcher::new().with("/t.obj", "v 0 0 0\n"));
        s.load("/t.obj");
        s.cancel();
        assert!(matches!(s.wait(Duration::from_millis(50)), LoadStatus::Idle));
    }

    #[test]
    fn flags_apply_to_delivery() {
        let fetcher = MemoryFetcher::new().with("/m/cube.obj", CUBE_FACE);
        let mut s = session(fetcher);
        s.set_flags(RenderFlags {
            use_texture: false,
            use_normal: true,
        });
        s.load("/m/cube.obj");
        let model = expect_ready(s.wait(WAIT));
        assert!(model.mesh.texcoords.iter().all(|&t| t == 0.0));
        assert!(!s.flags().use_texture);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let result = Session::new(
            Arc::new(MemoryFetcher::new()),
            LoadOptions::new(0.0, false),
            RenderFlags::default(),
        );
        assert!(result.is_err());
    }
}
