//! Contracts the runtime consumes from its collaborators.
//!
//! The shader compiler front end turns effect source into an `EffectModule`,
//! the graphics backend compiles modules into resident resources and renders
//! techniques, and `KeyInput` answers key polling. None of them are
//! implemented here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{EffectModule, KeyBinding, Technique};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to parse effect {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to compile effect {path}: {message}")]
    Compile { path: PathBuf, message: String },
    #[error("i/o error reading effect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Opaque identifier for resources the backend created for one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendHandle(pub u64);

/// Static properties of a backend that change how uniforms are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    /// The backend keeps every scalar uniform as a 32-bit float, whatever its
    /// declared type.
    pub float_only_uniforms: bool,
}

/// Produces effect descriptions from source files.
pub trait FrontEnd: Send + Sync {
    /// Parses `path` with the given `NAME=VALUE` preprocessor definitions.
    fn parse(&self, path: &Path, definitions: &[String]) -> Result<EffectModule, BackendError>;
}

/// Graphics backend. `compile_effect` runs on reload worker threads while the
/// control thread may call `render_technique` for other effects.
pub trait Backend: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    /// Creates the resources for one parsed effect.
    fn compile_effect(
        &self,
        source: &Path,
        module: &EffectModule,
    ) -> Result<BackendHandle, BackendError>;

    /// Releases resources created by `compile_effect`.
    fn unload_effect(&self, handle: BackendHandle);

    /// Renders one technique with the current uniform bytes. Returns the GPU
    /// time when the backend measures it.
    fn render_technique(
        &self,
        handle: BackendHandle,
        technique: &Technique,
        uniforms: &[u8],
    ) -> Option<Duration>;

    /// Writes the current back buffer to `path`, encoded after its
    /// extension (`bmp` or `png`). Returns whether the file was written.
    fn capture_screenshot(&self, path: &Path) -> bool;
}

/// Key polling for shortcuts and technique toggles.
pub trait KeyInput {
    /// True on the frame the binding transitions to pressed.
    fn is_key_pressed(&self, key: &KeyBinding) -> bool;
}

/// Input source that never reports a key press.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl KeyInput for NoInput {
    fn is_key_pressed(&self, _key: &KeyBinding) -> bool {
        false
    }
}
