//! Scene libraries and the manager that dispatches loads to them, keeps
//! permanent scenes, and fans out per-frame updates and input events.

#![forbid(unsafe_code)]

pub mod classic;
pub mod config;
pub mod error;
pub mod library;
pub mod manager;

pub use classic::ClassicLibrary;
pub use config::{ClassicConfig, ManagerConfig};
pub use error::*;
pub use library::{FileExtension, Library, LibraryScene, LoadRequest, SceneKinds, TransientScene};
pub use manager::{LibraryInfo, Loaded, Manager};
