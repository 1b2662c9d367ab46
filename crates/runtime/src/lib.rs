//! Effect runtime core for a shader post-processing layer.
//!
//! The crate tracks which effects are queued, compiling, loaded or failed,
//! keeps technique enable state with a per-effect reference count, stores
//! uniform values in one byte buffer, and moves values in and out of preset
//! files with timed transitions between presets. Compiling and rendering are
//! delegated to a `Backend`; parsing effect source to a `FrontEnd`.
//!
//! ```text
//!   FrontEnd::parse ─▶ EffectModule ─▶ Registry (techniques, uniforms)
//!                                          │            │
//!   Backend::compile_effect ◀─ scheduler ◀─┘     UniformStorage ◀─▶ presets
//! ```
//!
//! `Runtime` wires the pieces to a configuration cache and is driven by
//! `Runtime::on_present` once per host frame.

mod backend;
mod marshal;
pub mod preset;
mod registry;
mod runtime;
pub mod settings;
mod storage;
mod types;

pub use backend::{
    Backend, BackendCapabilities, BackendError, BackendHandle, FrontEnd, KeyInput, NoInput,
};
pub use registry::Registry;
pub use runtime::{CompileReport, PendingAction, Runtime, EFFECT_EXTENSION};
pub use settings::RuntimeSettings;
pub use storage::{UniformLayout, UniformStorage, UNIFORM_ALIGNMENT};
pub use types::{
    AnnotationValue, Annotations, Constant, Effect, EffectModule, KeyBinding, MovingAverage,
    SpecialUniform, Technique, TechniqueInfo, Uniform, UniformBase, UniformInfo, UniformType,
    MAX_COMPONENTS,
};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] configstore::ConfigError),
}
