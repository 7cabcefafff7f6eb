use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scenic_ids::{NodeId, SceneId};

use crate::registry::NodeRegistry;
use crate::specification::SpecificationTable;

/// Opaque handle owned by a node and created by the rendering backend.
pub type RenderObject = Arc<dyn Any + Send + Sync>;

/// Rendering backend binding. The core only creates objects and links them
/// into parent/child relationships; it never looks inside.
pub trait RenderContext: Send + Sync {
    fn create_object(&self, node_type: &str, node: NodeId) -> Option<RenderObject>;
    fn attach(&self, parent: &RenderObject, child: &RenderObject);
    fn detach(&self, parent: &RenderObject, child: &RenderObject);
}

/// Immutable per-scene record shared by every node parsed into that scene.
///
/// The scene root's environment names the root itself as `scene_id`.
pub struct Environment {
    registry: Arc<NodeRegistry>,
    specifications: Arc<SpecificationTable>,
    render_context: Option<Arc<dyn RenderContext>>,
    library: Arc<str>,
    filename: PathBuf,
    scene_id: SceneId,
}

impl Environment {
    pub fn new(
        registry: Arc<NodeRegistry>,
        specifications: Arc<SpecificationTable>,
        render_context: Option<Arc<dyn RenderContext>>,
        library: impl Into<Arc<str>>,
        filename: impl Into<PathBuf>,
        scene_id: SceneId,
    ) -> Self {
        Self {
            registry,
            specifications,
            render_context,
            library: library.into(),
            filename: filename.into(),
            scene_id,
        }
    }

    /// Environment for nodes created outside any scene (tests, scripts).
    pub fn detached(registry: Arc<NodeRegistry>, specifications: Arc<SpecificationTable>) -> Self {
        Self::new(registry, specifications, None, "", PathBuf::new(), SceneId::nil())
    }

    #[inline]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    #[inline]
    pub fn specifications(&self) -> &Arc<SpecificationTable> {
        &self.specifications
    }

    #[inline]
    pub fn render_context(&self) -> Option<&Arc<dyn RenderContext>> {
        self.render_context.as_ref()
    }

    #[inline]
    pub fn library(&self) -> &str {
        &self.library
    }

    #[inline]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    #[inline]
    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("library", &self.library)
            .field("filename", &self.filename)
            .field("scene_id", &self.scene_id)
            .field("render_context", &self.render_context.is_some())
            .finish()
    }
}
