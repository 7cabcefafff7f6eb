//! Permanent-scene library for the classic encoding.

use std::fs;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};
use scenic_classic::{HeaderCheck, Parser};
use scenic_core::{NodeFactory, NodeRegistry, SpecificationTable};

use crate::config::ClassicConfig;
use crate::error::{LoadError, Result};
use crate::library::{FileExtension, Library, LibraryScene, LoadRequest, SceneKinds};

pub const CLASSIC_LIBRARY: &str = "classic";

pub struct ClassicLibrary {
    factory: Arc<dyn NodeFactory>,
    registry: Arc<NodeRegistry>,
    specifications: Arc<SpecificationTable>,
    extensions: RwLock<Vec<FileExtension>>,
}

impl ClassicLibrary {
    /// A library with no extensions registered yet.
    pub fn new(
        factory: Arc<dyn NodeFactory>,
        registry: Arc<NodeRegistry>,
        specifications: Arc<SpecificationTable>,
    ) -> Self {
        Self {
            factory,
            registry,
            specifications,
            extensions: RwLock::new(Vec::new()),
        }
    }

    /// A library with every extension from `config` registered.
    pub fn from_config(
        factory: Arc<dyn NodeFactory>,
        registry: Arc<NodeRegistry>,
        specifications: Arc<SpecificationTable>,
        config: &ClassicConfig,
    ) -> Self {
        let library = Self::new(factory, registry, specifications);
        for (extension, description) in &config.extensions {
            library.register_file_extension(extension, description);
        }
        library
    }
}

impl Library for ClassicLibrary {
    fn name(&self) -> &str {
        CLASSIC_LIBRARY
    }

    fn scene_kinds(&self) -> SceneKinds {
        SceneKinds::PERMANENT
    }

    fn register_file_extension(&self, extension: &str, description: &str) {
        let entry = FileExtension::new(extension, description);
        let mut extensions = self.extensions.write().unwrap_or_else(PoisonError::into_inner);
        match extensions.iter_mut().find(|e| e.extension == entry.extension) {
            Some(existing) => *existing = entry,
            None => extensions.push(entry),
        }
    }

    fn extensions(&self) -> Vec<FileExtension> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load(&self, request: &LoadRequest<'_>) -> Result<Option<LibraryScene>> {
        if !request.kind.contains(SceneKinds::PERMANENT) {
            return Ok(None);
        }
        let source = fs::read_to_string(request.path).map_err(|source| LoadError::Io {
            path: request.path.to_path_buf(),
            source,
        })?;
        debug!("classic: parsing {} ({} bytes)", request.path.display(), source.len());

        let mut parser = Parser::new(
            &source,
            request.path,
            self.factory.as_ref(),
            self.registry.clone(),
            self.specifications.clone(),
        )
        .render_context(request.render_context.clone())
        .library(CLASSIC_LIBRARY)
        .timestamp(request.timestamp)
        .header_check(HeaderCheck::FromExtension);
        if let Some(control) = request.control {
            parser = parser.control(control);
        }
        let scene = parser.parse()?;
        info!(
            "loaded {} as scene #{} ({} nodes)",
            request.path.display(),
            scene.id(),
            scene.nodes().len()
        );
        Ok(Some(LibraryScene::Permanent(scene)))
    }
}
