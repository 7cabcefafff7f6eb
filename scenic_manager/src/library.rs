//! Library SPI: a loader for one or more file formats.

use std::fmt;
use std::ops::BitOr;
use std::path::Path;
use std::sync::Arc;

use scenic_core::{LoadControl, RenderContext, Scene, Timestamp};

use crate::error::Result;

/// Which scene lifetimes a library can produce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SceneKinds(u8);

impl SceneKinds {
    pub const NONE: SceneKinds = SceneKinds(0);
    /// Kept by the manager until unloaded.
    pub const PERMANENT: SceneKinds = SceneKinds(1);
    /// Applied once, then owned by the caller.
    pub const TRANSIENT: SceneKinds = SceneKinds(1 << 1);
    pub const ALL: SceneKinds = SceneKinds(Self::PERMANENT.0 | Self::TRANSIENT.0);

    #[inline]
    pub const fn contains(self, other: SceneKinds) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SceneKinds {
    type Output = SceneKinds;

    fn bitor(self, rhs: SceneKinds) -> SceneKinds {
        SceneKinds(self.0 | rhs.0)
    }
}

impl fmt::Debug for SceneKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Self::PERMANENT), self.contains(Self::TRANSIENT)) {
            (true, true) => f.write_str("PERMANENT|TRANSIENT"),
            (true, false) => f.write_str("PERMANENT"),
            (false, true) => f.write_str("TRANSIENT"),
            (false, false) => f.write_str("NONE"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileExtension {
    /// Lower case, without the dot.
    pub extension: String,
    pub description: String,
}

impl FileExtension {
    pub fn new(extension: &str, description: impl Into<String>) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            description: description.into(),
        }
    }
}

/// Everything a library needs for one load.
pub struct LoadRequest<'a> {
    pub path: &'a Path,
    /// Lower case, without the dot.
    pub extension: &'a str,
    pub render_context: Option<Arc<dyn RenderContext>>,
    pub timestamp: Timestamp,
    /// The one lifetime requested.
    pub kind: SceneKinds,
    pub control: Option<&'a LoadControl>,
}

/// A one-shot scene plus the step that applies it to the host.
pub struct TransientScene {
    scene: Scene,
    apply: Box<dyn FnOnce(&Scene) + Send>,
}

impl TransientScene {
    pub fn new(scene: Scene, apply: impl FnOnce(&Scene) + Send + 'static) -> Self {
        Self {
            scene,
            apply: Box::new(apply),
        }
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Runs the apply step and hands the scene back; dropping it releases
    /// every node it owns.
    pub fn apply(self) -> Scene {
        (self.apply)(&self.scene);
        self.scene
    }
}

impl fmt::Debug for TransientScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientScene")
            .field("scene", &self.scene.id())
            .finish_non_exhaustive()
    }
}

pub enum LibraryScene {
    Permanent(Scene),
    Transient(TransientScene),
}

pub trait Library: Send + Sync {
    /// Unique; registrations under the same name are reference counted.
    fn name(&self) -> &str;

    fn scene_kinds(&self) -> SceneKinds;

    /// Adds or redescribes an extension the library accepts.
    fn register_file_extension(&self, extension: &str, description: &str);

    fn extensions(&self) -> Vec<FileExtension>;

    fn supports_extension(&self, extension: &str) -> bool {
        self.extensions()
            .iter()
            .any(|e| e.extension.eq_ignore_ascii_case(extension))
    }

    /// `Ok(None)` when the library declines the file.
    fn load(&self, request: &LoadRequest<'_>) -> Result<Option<LibraryScene>>;
}
