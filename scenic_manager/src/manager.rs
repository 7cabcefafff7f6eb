//! Library registration, load dispatch, permanent scenes and frame fan-out.
//!
//! Two locks: `libraries` guards the registration list, `scenes` the
//! permanent-scene map. Neither is held while a library loads or while a node
//! hook runs. Update and event subscriptions live in the node registry, which
//! maintains them as nodes are created and dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use scenic_classic::ParseError;
use scenic_core::{
    KeyEvent, LoadControl, MouseEvent, NodeRegistry, RenderContext, SceneId, SceneRef, Timestamp,
};

use crate::config::ManagerConfig;
use crate::error::{LoadError, Result};
use crate::library::{FileExtension, Library, LibraryScene, LoadRequest, SceneKinds, TransientScene};

struct LibraryEntry {
    library: Arc<dyn Library>,
    priority: i32,
    count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryInfo {
    pub name: String,
    pub kinds: SceneKinds,
    pub priority: i32,
    pub extensions: Vec<FileExtension>,
}

#[derive(Debug)]
pub enum Loaded {
    /// Kept by the manager until unloaded.
    Permanent(SceneRef),
    Transient(TransientScene),
}

impl Loaded {
    pub fn scene_id(&self) -> SceneId {
        match self {
            Loaded::Permanent(scene) => scene.id(),
            Loaded::Transient(transient) => transient.scene().id(),
        }
    }
}

pub struct Manager {
    config: ManagerConfig,
    registry: Arc<NodeRegistry>,
    libraries: Mutex<Vec<LibraryEntry>>,
    scenes: Mutex<BTreeMap<SceneId, SceneRef>>,
}

impl Manager {
    pub fn new(config: ManagerConfig, registry: Arc<NodeRegistry>) -> Self {
        Self {
            config,
            registry,
            libraries: Mutex::new(Vec::new()),
            scenes: Mutex::new(BTreeMap::new()),
        }
    }

    #[inline]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    fn libraries_lock(&self) -> MutexGuard<'_, Vec<LibraryEntry>> {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scenes_lock(&self) -> MutexGuard<'_, BTreeMap<SceneId, SceneRef>> {
        self.scenes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------- Libraries --------------------

    /// Registers `library`, or counts one more registration when a library of
    /// the same name is already present. Higher priorities are tried first;
    /// equal priorities keep registration order.
    pub fn register_library(&self, library: Arc<dyn Library>, priority: i32) {
        let mut libraries = self.libraries_lock();
        if let Some(entry) = libraries.iter_mut().find(|e| e.library.name() == library.name()) {
            entry.count += 1;
            return;
        }
        let index = libraries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(libraries.len());
        info!("registered library '{}' (priority {priority})", library.name());
        libraries.insert(
            index,
            LibraryEntry {
                library,
                priority,
                count: 1,
            },
        );
    }

    /// Drops one registration. Returns false when no such library exists.
    pub fn unregister_library(&self, name: &str) -> bool {
        let mut libraries = self.libraries_lock();
        let Some(index) = libraries.iter().position(|e| e.library.name() == name) else {
            return false;
        };
        libraries[index].count -= 1;
        if libraries[index].count == 0 {
            libraries.remove(index);
            info!("unregistered library '{name}'");
        }
        true
    }

    /// Registered libraries in the order loads try them.
    pub fn libraries(&self) -> Vec<LibraryInfo> {
        self.libraries_lock()
            .iter()
            .map(|e| LibraryInfo {
                name: e.library.name().to_string(),
                kinds: e.library.scene_kinds(),
                priority: e.priority,
                extensions: e.library.extensions(),
            })
            .collect()
    }

    // -------------------- Loading --------------------

    /// Absolute paths as given; relative ones against the current directory,
    /// then each search path.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        let cwd = std::env::current_dir().ok();
        cwd.iter()
            .chain(&self.config.search_paths)
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }

    /// Loads `path` with the first library that accepts it: libraries that
    /// keep permanent scenes first, then transient-only ones.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        render_context: Option<Arc<dyn RenderContext>>,
        timestamp: Timestamp,
        control: Option<&LoadControl>,
    ) -> Result<Loaded> {
        let requested = path.as_ref();
        let path = self
            .resolve(requested)
            .ok_or_else(|| LoadError::NotFound(requested.to_path_buf()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let candidates: Vec<Arc<dyn Library>> = self
            .libraries_lock()
            .iter()
            .filter(|e| e.library.supports_extension(&extension))
            .map(|e| e.library.clone())
            .collect();
        if candidates.is_empty() {
            return Err(LoadError::UnsupportedExtension { path, extension });
        }

        let permanent = candidates
            .iter()
            .filter(|l| l.scene_kinds().contains(SceneKinds::PERMANENT))
            .map(|l| (l, SceneKinds::PERMANENT));
        let transient = candidates
            .iter()
            .filter(|l| !l.scene_kinds().contains(SceneKinds::PERMANENT))
            .filter(|l| l.scene_kinds().contains(SceneKinds::TRANSIENT))
            .map(|l| (l, SceneKinds::TRANSIENT));

        let mut last_error = None;
        for (library, kind) in permanent.chain(transient) {
            if control.is_some_and(LoadControl::is_cancelled) {
                return Err(ParseError::Cancelled.into());
            }
            let request = LoadRequest {
                path: &path,
                extension: &extension,
                render_context: render_context.clone(),
                timestamp,
                kind,
                control,
            };
            match library.load(&request) {
                Ok(Some(scene)) => return Ok(self.keep(scene)),
                Ok(None) => debug!("library '{}' declined {}", library.name(), path.display()),
                Err(LoadError::Parse(ParseError::Cancelled)) => {
                    return Err(ParseError::Cancelled.into());
                }
                Err(err) => {
                    warn!("library '{}' failed to load {}: {err}", library.name(), path.display());
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(LoadError::UnsupportedExtension { path, extension }))
    }

    fn keep(&self, scene: LibraryScene) -> Loaded {
        match scene {
            LibraryScene::Permanent(scene) => {
                let scene = Arc::new(scene);
                self.scenes_lock().insert(scene.id(), scene.clone());
                Loaded::Permanent(scene)
            }
            LibraryScene::Transient(transient) => Loaded::Transient(transient),
        }
    }

    // -------------------- Permanent scenes --------------------

    pub fn scene(&self, id: SceneId) -> Option<SceneRef> {
        self.scenes_lock().get(&id).cloned()
    }

    /// Permanent scenes in ascending id order.
    pub fn scenes(&self) -> Vec<SceneRef> {
        self.scenes_lock().values().cloned().collect()
    }

    /// Releases the manager's handle. The scene is destroyed once no other
    /// handle remains.
    pub fn unload(&self, id: SceneId) -> bool {
        let removed = self.scenes_lock().remove(&id);
        removed.is_some()
    }

    /// Unloads every permanent scene, newest first, so scenes loaded while
    /// building another go before it. Returns how many were unloaded.
    pub fn unload_scenes(&self) -> usize {
        let mut count = 0;
        loop {
            let Some((id, scene)) = self.scenes_lock().pop_last() else {
                return count;
            };
            debug!("unloading scene #{id}");
            drop(scene);
            count += 1;
        }
    }

    // -------------------- Frame fan-out --------------------

    /// Runs `pre_update` on every update subscriber (optionally only those a
    /// library loaded) and returns the latest timestamp any of them asked for,
    /// or `timestamp` itself.
    pub fn pre_update(&self, timestamp: Timestamp, library: Option<&str>) -> Timestamp {
        self.registry
            .update_subscribers(library)
            .iter()
            .filter_map(|node| node.pre_update(timestamp))
            .fold(timestamp, Timestamp::max)
    }

    pub fn update(&self, timestamp: Timestamp, library: Option<&str>) {
        for node in self.registry.update_subscribers(library) {
            node.update(timestamp);
        }
    }

    /// Offers the event to every event subscriber. True when any handled it.
    pub fn mouse_event(&self, event: &MouseEvent) -> bool {
        let mut handled = false;
        for node in self.registry.event_subscribers() {
            handled |= node.mouse_event(event);
        }
        handled
    }

    pub fn key_event(&self, event: &KeyEvent) -> bool {
        let mut handled = false;
        for node in self.registry.event_subscribers() {
            handled |= node.key_event(event);
        }
        handled
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.unload_scenes();
    }
}
