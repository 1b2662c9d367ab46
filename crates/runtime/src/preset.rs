//! Preset files: validation, discovery, and transfer of technique state and
//! uniform values between the registry and a configuration document.
//!
//! A preset keeps its lists in the global section (`Techniques`,
//! `TechniqueSorting`, `PreprocessorDefinitions`, `Key<Technique>`) and the
//! uniform values in one section per effect file:
//!
//! ```toml
//! Techniques = ["Bloom"]
//! TechniqueSorting = ["Bloom", "Vignette"]
//! KeyBloom = [66, 0, 1, 0]
//!
//! ["Bloom.fx"]
//! Intensity = [0.8]
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use configstore::{absolute_path, ConfigCache, ConfigError, ConfigFile, GLOBAL_SECTION};
use scheduler::ReloadScheduler;
use tracing::debug;

use crate::registry::Registry;
use crate::types::{KeyBinding, UniformBase, MAX_COMPONENTS};

/// File extensions accepted as presets.
pub const PRESET_EXTENSIONS: &[&str] = &["ini", "txt", "toml"];

/// Technique and definition lists stored in a preset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetLists {
    pub techniques: Vec<String>,
    /// Full technique ordering; falls back to `techniques` when absent.
    pub sorting: Vec<String>,
    pub definitions: Vec<String>,
}

impl PresetLists {
    pub fn read(preset: &ConfigFile) -> Self {
        let techniques: Vec<String> = preset.get(GLOBAL_SECTION, "Techniques").unwrap_or_default();
        let mut sorting: Vec<String> = preset
            .get(GLOBAL_SECTION, "TechniqueSorting")
            .unwrap_or_default();
        if sorting.is_empty() {
            sorting = techniques.clone();
        }
        let definitions = preset
            .get(GLOBAL_SECTION, "PreprocessorDefinitions")
            .unwrap_or_default();
        Self {
            techniques,
            sorting,
            definitions,
        }
    }
}

/// Timing of one step of a preset-to-preset transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionStep {
    /// Time left until the transition ends.
    pub remaining: Duration,
    /// Time that was left at the previous frame.
    pub remaining_before_frame: Duration,
}

/// Moves `current` toward `target` so that it arrives when `remaining`
/// reaches zero. The result always lies between `current` and `target`.
pub fn transition_step(
    current: f32,
    target: f32,
    remaining: Duration,
    remaining_before_frame: Duration,
) -> f32 {
    if remaining.is_zero() || remaining_before_frame.is_zero() {
        return target;
    }
    let ratio = (remaining.as_secs_f64() / remaining_before_frame.as_secs_f64()).clamp(0.0, 1.0);
    (f64::from(target) - f64::from(target - current) * ratio) as f32
}

/// Whether `path` can be used as a preset.
///
/// The extension must be one of `PRESET_EXTENSIONS`. A path that does not
/// exist is valid since saving will create it; an existing file must carry a
/// `Techniques` list.
pub fn check_preset_path(cache: &mut ConfigCache, path: &Path) -> bool {
    let extension_ok = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PRESET_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)));
    if !extension_ok {
        return false;
    }
    match fs::metadata(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(_) => false,
        Ok(meta) if meta.is_dir() => false,
        Ok(_) => cache
            .load(path)
            .get::<Vec<String>>(GLOBAL_SECTION, "Techniques")
            .is_some(),
    }
}

/// Directory and name filter for preset discovery.
///
/// An empty filter searches the current preset's directory. A directory
/// filter is searched unfiltered. Anything else filters by its file name,
/// searching its parent, or the current preset's directory when it has none.
pub fn search_location(current: &Path, filter: &Path) -> (PathBuf, String) {
    let current_dir = absolute_path(current.parent().unwrap_or(Path::new(".")));
    if filter.as_os_str().is_empty() {
        return (current_dir, String::new());
    }
    if filter.is_dir() {
        return (absolute_path(filter), String::new());
    }
    let text = filter
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = match filter.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => absolute_path(parent),
        _ => current_dir,
    };
    (dir, text)
}

/// Valid presets in `dir`, sorted by file name. `current` is always kept;
/// other files must contain `filter` in their stem, ignoring case. Also
/// returns the position of `current`.
pub fn list_presets(
    cache: &mut ConfigCache,
    dir: &Path,
    filter: &str,
    current: &Path,
) -> (Vec<PathBuf>, Option<usize>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), %err, "cannot list preset directory");
            return (Vec::new(), None);
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let current = resolved_path(current);
    let filter = filter.to_lowercase();
    let mut presets = Vec::new();
    let mut current_index = None;
    for path in paths {
        if !check_preset_path(cache, &path) {
            continue;
        }
        if resolved_path(&path) == current {
            current_index = Some(presets.len());
            presets.push(path);
            continue;
        }
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if filter.is_empty() || stem.contains(&filter) {
            presets.push(path);
        }
    }
    (presets, current_index)
}

/// Canonical form of `path` so different spellings of one file compare
/// equal; lexically absolute when the file does not exist.
fn resolved_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| absolute_path(path))
}

/// Picks the preset after (or before, when `reversed`) `current`, wrapping
/// at the ends. `None` when no candidate exists.
pub fn find_adjacent_preset(
    cache: &mut ConfigCache,
    current: &Path,
    filter: &Path,
    reversed: bool,
) -> Option<PathBuf> {
    let (dir, text) = search_location(current, filter);
    let (mut presets, current_index) = list_presets(cache, &dir, &text, current);
    let len = presets.len();
    if len == 0 {
        return None;
    }
    let next = match (current_index, reversed) {
        (None, false) => 0,
        (None, true) => len - 1,
        (Some(index), false) => (index + 1) % len,
        (Some(index), true) => (index + len - 1) % len,
    };
    Some(presets.swap_remove(next))
}

/// Copies the preset's uniform values into storage. Float uniforms move
/// toward their target when `transition` is set; every other type snaps.
pub fn apply_values(registry: &mut Registry, preset: &ConfigFile, transition: Option<TransitionStep>) {
    let Registry {
        effects,
        uniforms,
        storage,
        ..
    } = registry;
    for uniform in uniforms.iter().filter(|u| u.special().is_none()) {
        let Some(effect) = effects.get(uniform.effect_index()) else {
            continue;
        };
        let section = effect.section_name();
        match uniform.ty().base {
            UniformBase::Int => {
                let mut values = [0i32; MAX_COMPONENTS];
                storage.get_i32(uniform, &mut values);
                preset.get_into(&section, uniform.name(), &mut values);
                storage.set_i32(uniform, &values);
            }
            UniformBase::Bool | UniformBase::Uint => {
                let mut values = [0u32; MAX_COMPONENTS];
                storage.get_u32(uniform, &mut values);
                preset.get_into(&section, uniform.name(), &mut values);
                storage.set_u32(uniform, &values);
            }
            UniformBase::Float => {
                let mut values = [0.0f32; MAX_COMPONENTS];
                let count = storage.get_f32(uniform, &mut values);
                let old = values;
                preset.get_into(&section, uniform.name(), &mut values);
                if let Some(step) = transition {
                    for (value, old) in values.iter_mut().zip(old).take(count) {
                        *value = transition_step(
                            old,
                            *value,
                            step.remaining,
                            step.remaining_before_frame,
                        );
                    }
                }
                storage.set_f32(uniform, &values);
            }
        }
    }
}

/// Enables techniques listed in (or forced on by) the preset, disables the
/// rest, and replaces every toggle key with the preset's binding.
pub fn apply_techniques<R: Send + 'static>(
    registry: &mut Registry,
    preset: &ConfigFile,
    techniques: &[String],
    scheduler: &mut ReloadScheduler<R>,
) {
    for index in 0..registry.techniques.len() {
        let technique = &registry.techniques[index];
        let wanted = technique.is_force_enabled() || techniques.contains(&technique.name);
        let key_name = format!("Key{}", technique.name);
        if wanted {
            registry.enable(index, scheduler);
        } else {
            registry.disable(index);
        }

        let mut key = [0u32; 4];
        preset.get_into(GLOBAL_SECTION, &key_name, &mut key);
        registry.techniques[index].toggle_key = KeyBinding::from_array(key);
    }
}

/// Writes technique state and uniform values into `preset`.
pub fn save_preset(
    registry: &Registry,
    preset: &mut ConfigFile,
    definitions: &[String],
) -> Result<(), ConfigError> {
    let mut enabled = Vec::new();
    let mut sorting = Vec::with_capacity(registry.techniques.len());
    let mut referenced_effects = Vec::new();

    for technique in &registry.techniques {
        let key_name = format!("Key{}", technique.name);
        if technique.enabled {
            enabled.push(technique.name.clone());
        }
        if technique.enabled || technique.toggle_key.is_set() {
            referenced_effects.push(technique.effect_index);
        }
        sorting.push(technique.name.clone());

        if technique.toggle_key.is_set() {
            preset.set(GLOBAL_SECTION, &key_name, &technique.toggle_key.to_array())?;
        } else {
            preset.remove(GLOBAL_SECTION, &key_name);
        }
    }

    preset.set(GLOBAL_SECTION, "Techniques", &enabled)?;
    preset.set(GLOBAL_SECTION, "TechniqueSorting", &sorting)?;
    preset.set(GLOBAL_SECTION, "PreprocessorDefinitions", definitions)?;

    let storage = &registry.storage;
    for uniform in &registry.uniforms {
        if uniform.special().is_some() || !referenced_effects.contains(&uniform.effect_index()) {
            continue;
        }
        let Some(effect) = registry.effects.get(uniform.effect_index()) else {
            continue;
        };
        let section = effect.section_name();
        let components = uniform.ty().components();
        match uniform.ty().base {
            UniformBase::Int => {
                let mut values = [0i32; MAX_COMPONENTS];
                storage.get_i32(uniform, &mut values);
                preset.set_slice(&section, uniform.name(), &values, components)?;
            }
            UniformBase::Bool | UniformBase::Uint => {
                let mut values = [0u32; MAX_COMPONENTS];
                storage.get_u32(uniform, &mut values);
                preset.set_slice(&section, uniform.name(), &values, components)?;
            }
            UniformBase::Float => {
                let mut values = [0.0f32; MAX_COMPONENTS];
                storage.get_f32(uniform, &mut values);
                preset.set_slice(&section, uniform.name(), &values, components)?;
            }
        }
    }
    Ok(())
}
