use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendHandle;

/// Uniforms never hold more than a 4x4 matrix worth of scalars.
pub const MAX_COMPONENTS: usize = 16;

/// Scalar kind a uniform is declared with in shader source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformBase {
    Bool,
    Int,
    Uint,
    Float,
}

/// Declared shape of a uniform: a scalar kind plus row/column counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformType {
    pub base: UniformBase,
    pub rows: u8,
    pub cols: u8,
}

impl UniformType {
    pub fn scalar(base: UniformBase) -> Self {
        Self::matrix(base, 1, 1)
    }

    pub fn vector(base: UniformBase, rows: u8) -> Self {
        Self::matrix(base, rows, 1)
    }

    pub fn matrix(base: UniformBase, rows: u8, cols: u8) -> Self {
        Self { base, rows, cols }
    }

    /// Number of 32-bit lanes, clamped to `1..=MAX_COMPONENTS`.
    pub fn components(&self) -> usize {
        (usize::from(self.rows) * usize::from(self.cols)).clamp(1, MAX_COMPONENTS)
    }

    /// Size of the storage range in bytes.
    pub fn size(&self) -> usize {
        self.components() * 4
    }

    pub fn is_float(&self) -> bool {
        self.base == UniformBase::Float
    }
}

/// Raw lane values of an initializer, encoded in the declared representation
/// (IEEE bits for float uniforms, two's complement for int, 0/1 for bool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Constant {
    pub lanes: [u32; MAX_COMPONENTS],
}

impl Constant {
    pub fn from_f32(values: &[f32]) -> Self {
        Self::from_lanes(values.iter().map(|v| v.to_bits()))
    }

    pub fn from_i32(values: &[i32]) -> Self {
        Self::from_lanes(values.iter().map(|v| *v as u32))
    }

    pub fn from_u32(values: &[u32]) -> Self {
        Self::from_lanes(values.iter().copied())
    }

    pub fn from_bool(values: &[bool]) -> Self {
        Self::from_lanes(values.iter().map(|v| u32::from(*v)))
    }

    fn from_lanes(values: impl Iterator<Item = u32>) -> Self {
        let mut constant = Self::default();
        for (lane, value) in constant.lanes.iter_mut().zip(values) {
            *lane = value;
        }
        constant
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Int(i32),
    Float(f32),
    String(String),
}

/// Metadata attached to techniques and uniforms by the shader author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations(BTreeMap<String, AnnotationValue>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AnnotationValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.0.get(name)
    }

    /// Integer view of an annotation; floats truncate, strings read as 0.
    pub fn as_int(&self, name: &str) -> i32 {
        match self.0.get(name) {
            Some(AnnotationValue::Int(value)) => *value,
            Some(AnnotationValue::Float(value)) => *value as i32,
            Some(AnnotationValue::String(_)) | None => 0,
        }
    }

    pub fn as_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(AnnotationValue::String(value)) => Some(value),
            _ => None,
        }
    }
}

/// A key code plus modifier state, persisted as `[key, ctrl, shift, alt]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyBinding {
    pub keycode: u32,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyBinding {
    pub fn new(keycode: u32) -> Self {
        Self {
            keycode,
            ..Self::default()
        }
    }

    pub fn is_set(&self) -> bool {
        self.keycode != 0
    }

    pub fn to_array(self) -> [u32; 4] {
        [
            self.keycode,
            u32::from(self.ctrl),
            u32::from(self.shift),
            u32::from(self.alt),
        ]
    }

    pub fn from_array(data: [u32; 4]) -> Self {
        Self {
            keycode: data[0],
            ctrl: data[1] != 0,
            shift: data[2] != 0,
            alt: data[3] != 0,
        }
    }

    /// Default binding declared through `toggle*` annotations.
    pub fn from_annotations(annotations: &Annotations) -> Self {
        Self {
            keycode: annotations.as_int("toggle").max(0) as u32,
            ctrl: annotations.as_int("togglectrl") != 0,
            shift: annotations.as_int("toggleshift") != 0,
            alt: annotations.as_int("togglealt") != 0,
        }
    }
}

/// Running mean over the last `SAMPLES` durations.
#[derive(Debug, Clone, Default)]
pub struct MovingAverage {
    samples: VecDeque<Duration>,
    sum: Duration,
}

impl MovingAverage {
    pub const SAMPLES: usize = 60;

    pub fn append(&mut self, sample: Duration) {
        if self.samples.len() == Self::SAMPLES {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    pub fn average(&self) -> Duration {
        match u32::try_from(self.samples.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.sum / count,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = Duration::ZERO;
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Uniforms whose value the runtime writes every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialUniform {
    /// Duration of the previous frame in milliseconds.
    FrameTime,
    FrameCount,
    /// Milliseconds since the runtime started.
    Timer,
    /// Local `[year, month, day, seconds since midnight]`.
    Date,
    /// A `source` the runtime does not drive; left untouched.
    Unknown,
}

impl SpecialUniform {
    pub fn from_source(source: &str) -> Self {
        match source.to_ascii_lowercase().as_str() {
            "frametime" => Self::FrameTime,
            "framecount" => Self::FrameCount,
            "timer" => Self::Timer,
            "date" => Self::Date,
            _ => Self::Unknown,
        }
    }
}

/// Technique as described by the front end, before registration.
#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueInfo {
    pub name: String,
    pub annotations: Annotations,
}

impl TechniqueInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Annotations::new(),
        }
    }
}

/// Uniform as described by the front end, before storage is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: UniformType,
    pub initializer: Option<Constant>,
    pub annotations: Annotations,
}

impl UniformInfo {
    pub fn new(name: impl Into<String>, ty: UniformType) -> Self {
        Self {
            name: name.into(),
            ty,
            initializer: None,
            annotations: Annotations::new(),
        }
    }
}

/// Parsed description of one effect file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectModule {
    pub techniques: Vec<TechniqueInfo>,
    pub uniforms: Vec<UniformInfo>,
}

impl EffectModule {
    /// True when any technique is force-enabled or named in `wanted`.
    pub fn is_referenced(&self, wanted: &[String]) -> bool {
        self.techniques.iter().any(|technique| {
            technique.annotations.as_int("enabled") != 0
                || wanted.iter().any(|name| *name == technique.name)
        })
    }
}

#[derive(Debug)]
pub struct Effect {
    pub(crate) source_file: PathBuf,
    pub(crate) compile_success: bool,
    pub(crate) rendering: usize,
    pub(crate) module: Option<Arc<EffectModule>>,
    pub(crate) handle: Option<BackendHandle>,
    pub(crate) errors: String,
}

impl Effect {
    pub(crate) fn new(source_file: PathBuf) -> Self {
        Self {
            source_file,
            compile_success: true,
            rendering: 0,
            module: None,
            handle: None,
            errors: String::new(),
        }
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// Section name used for this effect's values in preset files.
    pub fn section_name(&self) -> String {
        self.source_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn compile_success(&self) -> bool {
        self.compile_success
    }

    /// Number of enabled techniques that need this effect resident.
    pub fn rendering(&self) -> usize {
        self.rendering
    }

    pub fn is_compiled(&self) -> bool {
        self.handle.is_some()
    }

    pub fn module(&self) -> Option<&EffectModule> {
        self.module.as_deref()
    }

    pub fn errors(&self) -> &str {
        &self.errors
    }
}

#[derive(Debug, Clone)]
pub struct Technique {
    pub(crate) name: String,
    pub(crate) effect_index: usize,
    pub(crate) enabled: bool,
    pub(crate) hidden: bool,
    pub(crate) timeout: Duration,
    pub(crate) timeleft: Duration,
    pub(crate) toggle_key: KeyBinding,
    pub(crate) average_cpu: MovingAverage,
    pub(crate) average_gpu: MovingAverage,
    pub(crate) annotations: Annotations,
}

impl Technique {
    pub(crate) fn from_info(info: &TechniqueInfo, effect_index: usize) -> Self {
        let timeout = Duration::from_millis(info.annotations.as_int("timeout").max(0) as u64);
        Self {
            name: info.name.clone(),
            effect_index,
            enabled: false,
            hidden: info.annotations.as_int("hidden") != 0,
            timeout,
            timeleft: Duration::ZERO,
            toggle_key: KeyBinding::from_annotations(&info.annotations),
            average_cpu: MovingAverage::default(),
            average_gpu: MovingAverage::default(),
            annotations: info.annotations.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn effect_index(&self) -> usize {
        self.effect_index
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_force_enabled(&self) -> bool {
        self.annotations.as_int("enabled") != 0
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeleft(&self) -> Duration {
        self.timeleft
    }

    pub fn toggle_key(&self) -> KeyBinding {
        self.toggle_key
    }

    pub fn set_toggle_key(&mut self, key: KeyBinding) {
        self.toggle_key = key;
    }

    pub fn average_cpu(&self) -> &MovingAverage {
        &self.average_cpu
    }

    pub fn average_gpu(&self) -> &MovingAverage {
        &self.average_gpu
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

#[derive(Debug, Clone)]
pub struct Uniform {
    pub(crate) name: String,
    pub(crate) effect_index: usize,
    pub(crate) ty: UniformType,
    pub(crate) offset: usize,
    pub(crate) initializer: Option<Constant>,
    pub(crate) special: Option<SpecialUniform>,
    pub(crate) annotations: Annotations,
}

impl Uniform {
    pub(crate) fn from_info(info: &UniformInfo, effect_index: usize, offset: usize) -> Self {
        Self {
            name: info.name.clone(),
            effect_index,
            ty: info.ty,
            offset,
            initializer: info.initializer,
            special: info.annotations.as_str("source").map(SpecialUniform::from_source),
            annotations: info.annotations.clone(),
        }
    }

    /// Builds a free-standing uniform, mostly useful for driving the
    /// marshaller directly.
    pub fn new(name: impl Into<String>, ty: UniformType, offset: usize) -> Self {
        Self {
            name: name.into(),
            effect_index: 0,
            ty,
            offset,
            initializer: None,
            special: None,
            annotations: Annotations::new(),
        }
    }

    pub fn with_initializer(mut self, initializer: Constant) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn effect_index(&self) -> usize {
        self.effect_index
    }

    pub fn ty(&self) -> UniformType {
        self.ty
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.ty.size()
    }

    pub fn initializer(&self) -> Option<&Constant> {
        self.initializer.as_ref()
    }

    pub fn special(&self) -> Option<SpecialUniform> {
        self.special
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_are_clamped() {
        assert_eq!(UniformType::scalar(UniformBase::Float).components(), 1);
        assert_eq!(UniformType::matrix(UniformBase::Float, 4, 4).components(), 16);
        assert_eq!(UniformType::matrix(UniformBase::Int, 8, 8).components(), 16);
        assert_eq!(UniformType::matrix(UniformBase::Int, 0, 0).size(), 4);
    }

    #[test]
    fn moving_average_keeps_window() {
        let mut average = MovingAverage::default();
        for _ in 0..MovingAverage::SAMPLES {
            average.append(Duration::from_millis(10));
        }
        average.append(Duration::from_millis(70));
        assert_eq!(average.average(), Duration::from_millis(11));
        average.clear();
        assert!(average.is_empty());
        assert_eq!(average.average(), Duration::ZERO);
    }

    #[test]
    fn key_binding_round_trips_through_array() {
        let key = KeyBinding {
            keycode: 0x74,
            ctrl: true,
            shift: false,
            alt: true,
        };
        assert_eq!(KeyBinding::from_array(key.to_array()), key);
        assert!(!KeyBinding::default().is_set());
    }

    #[test]
    fn toggle_annotations_build_default_binding() {
        let annotations = Annotations::new()
            .with("toggle", AnnotationValue::Int(0x20))
            .with("toggleshift", AnnotationValue::Int(1));
        let key = KeyBinding::from_annotations(&annotations);
        assert_eq!(key.keycode, 0x20);
        assert!(key.shift && !key.ctrl && !key.alt);
    }

    #[test]
    fn special_sources_are_recognised() {
        assert_eq!(SpecialUniform::from_source("FrameTime"), SpecialUniform::FrameTime);
        assert_eq!(SpecialUniform::from_source("date"), SpecialUniform::Date);
        assert_eq!(SpecialUniform::from_source("mousepoint"), SpecialUniform::Unknown);
    }
}
