#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runtime::{
    AnnotationValue, Annotations, Backend, BackendCapabilities, BackendError, BackendHandle,
    EffectModule, FrontEnd, KeyBinding, KeyInput, Runtime, Technique, TechniqueInfo, UniformBase,
    UniformInfo, UniformType,
};
use tempfile::TempDir;

/// Front end that serves canned modules keyed by effect file name.
#[derive(Default)]
pub struct MockFrontEnd {
    modules: HashMap<String, EffectModule>,
    pub definitions_seen: Mutex<Vec<Vec<String>>>,
}

impl MockFrontEnd {
    pub fn with_module(mut self, file: &str, module: EffectModule) -> Self {
        self.modules.insert(file.to_string(), module);
        self
    }
}

impl FrontEnd for MockFrontEnd {
    fn parse(&self, path: &Path, definitions: &[String]) -> Result<EffectModule, BackendError> {
        self.definitions_seen.lock().unwrap().push(definitions.to_vec());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.modules
            .get(&name)
            .cloned()
            .ok_or_else(|| BackendError::Parse {
                path: path.to_path_buf(),
                message: "unknown effect".into(),
            })
    }
}

#[derive(Default)]
pub struct MockBackend {
    float_only: bool,
    failing: HashSet<String>,
    next_handle: AtomicU64,
    pub compiled: Mutex<Vec<String>>,
    pub unloaded: Mutex<Vec<BackendHandle>>,
    pub rendered: Mutex<Vec<String>>,
    pub screenshots: Mutex<Vec<PathBuf>>,
}

impl MockBackend {
    pub fn float_only(mut self) -> Self {
        self.float_only = true;
        self
    }

    pub fn failing(mut self, file: &str) -> Self {
        self.failing.insert(file.to_string());
        self
    }

    pub fn compiled(&self) -> Vec<String> {
        let mut compiled = self.compiled.lock().unwrap().clone();
        compiled.sort();
        compiled
    }

    pub fn take_rendered(&self) -> Vec<String> {
        std::mem::take(&mut *self.rendered.lock().unwrap())
    }
}

impl Backend for MockBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            float_only_uniforms: self.float_only,
        }
    }

    fn compile_effect(
        &self,
        source: &Path,
        _module: &EffectModule,
    ) -> Result<BackendHandle, BackendError> {
        let name = source.file_name().unwrap().to_string_lossy().into_owned();
        if self.failing.contains(&name) {
            return Err(BackendError::Compile {
                path: source.to_path_buf(),
                message: "X3004: undeclared identifier".into(),
            });
        }
        self.compiled.lock().unwrap().push(name);
        Ok(BackendHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn unload_effect(&self, handle: BackendHandle) {
        self.unloaded.lock().unwrap().push(handle);
    }

    fn render_technique(
        &self,
        _handle: BackendHandle,
        technique: &Technique,
        _uniforms: &[u8],
    ) -> Option<Duration> {
        self.rendered.lock().unwrap().push(technique.name().to_string());
        Some(Duration::from_micros(250))
    }

    fn capture_screenshot(&self, path: &Path) -> bool {
        if fs::write(path, b"image").is_err() {
            return false;
        }
        self.screenshots.lock().unwrap().push(path.to_path_buf());
        true
    }
}

/// Reports the listed key codes as pressed.
pub struct PressedKeys(pub Vec<u32>);

impl KeyInput for PressedKeys {
    fn is_key_pressed(&self, key: &KeyBinding) -> bool {
        self.0.contains(&key.keycode)
    }
}

pub fn bloom_module() -> EffectModule {
    let mut tint = UniformInfo::new("Tint", UniformType::vector(UniformBase::Float, 3));
    tint.initializer = Some(runtime::Constant::from_f32(&[1.0, 1.0, 1.0]));
    EffectModule {
        techniques: vec![TechniqueInfo::new("Bloom")],
        uniforms: vec![
            UniformInfo::new("Intensity", UniformType::scalar(UniformBase::Float)),
            UniformInfo::new("Passes", UniformType::scalar(UniformBase::Int)),
            UniformInfo::new("Dither", UniformType::scalar(UniformBase::Bool)),
            tint,
        ],
    }
}

pub fn vignette_module() -> EffectModule {
    let mut frames = UniformInfo::new("Frames", UniformType::scalar(UniformBase::Uint));
    frames.annotations = Annotations::new().with("source", AnnotationValue::String("framecount".into()));
    EffectModule {
        techniques: vec![TechniqueInfo::new("Vignette")],
        uniforms: vec![
            UniformInfo::new("Radius", UniformType::scalar(UniformBase::Float)),
            frames,
        ],
    }
}

pub fn single_technique(name: &str, annotations: Annotations) -> EffectModule {
    let mut technique = TechniqueInfo::new(name);
    technique.annotations = annotations;
    EffectModule {
        techniques: vec![technique],
        uniforms: Vec::new(),
    }
}

/// A temporary installation: `runtime.ini`, a `shaders/` directory with the
/// given effect files, and room for presets.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new(effects: &[&str], runtime_ini: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let shaders = dir.path().join("shaders");
        fs::create_dir(&shaders).unwrap();
        for effect in effects {
            fs::write(shaders.join(effect), "// effect source\n").unwrap();
        }
        let config = format!(
            "[GENERAL]\nEffectSearchPaths = [\"shaders\"]\n{runtime_ini}\n"
        );
        fs::write(dir.path().join("runtime.ini"), config).unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: &str) {
        fs::write(self.path(name), contents).unwrap();
    }

    pub fn runtime(&self, frontend: Arc<MockFrontEnd>, backend: Arc<MockBackend>) -> Runtime {
        Runtime::new(self.path("runtime.ini"), frontend, backend).with_worker_count(2)
    }
}

pub fn standard_frontend() -> MockFrontEnd {
    MockFrontEnd::default()
        .with_module("Bloom.fx", bloom_module())
        .with_module("Vignette.fx", vignette_module())
}
