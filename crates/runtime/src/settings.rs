use std::path::{Path, PathBuf};
use std::time::Duration;

use configstore::{ConfigCache, ConfigError, ConfigFile};
use tracing::{debug, info};

use crate::preset::check_preset_path;
use crate::types::KeyBinding;

pub const INPUT_SECTION: &str = "INPUT";
pub const GENERAL_SECTION: &str = "GENERAL";

/// Preset used when the configured one is unusable.
pub const DEFAULT_PRESET: &str = "DefaultPreset.ini";

pub const DEFAULT_TRANSITION_DELAY: Duration = Duration::from_millis(1000);

/// Runtime-wide settings persisted in the runtime configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub reload_key: KeyBinding,
    pub effects_key: KeyBinding,
    pub screenshot_key: KeyBinding,
    pub previous_preset_key: KeyBinding,
    pub next_preset_key: KeyBinding,
    pub preset_transition_delay: Duration,
    /// Preset values are compile-time constants, so every preset change
    /// needs a reload.
    pub performance_mode: bool,
    pub effect_search_paths: Vec<PathBuf>,
    pub texture_search_paths: Vec<PathBuf>,
    /// Global `NAME=VALUE` definitions passed to every effect.
    pub preprocessor_definitions: Vec<String>,
    pub current_preset_path: PathBuf,
    pub screenshot_path: PathBuf,
    pub screenshot_format: u32,
    pub screenshot_include_preset: bool,
    pub screenshot_save_before: bool,
    pub no_reload_on_init: bool,
    /// Only compile effects the current preset uses; the rest compile when
    /// first enabled.
    pub skip_loading_disabled_effects: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            reload_key: KeyBinding::default(),
            effects_key: KeyBinding::default(),
            screenshot_key: KeyBinding::default(),
            previous_preset_key: KeyBinding::default(),
            next_preset_key: KeyBinding::default(),
            preset_transition_delay: DEFAULT_TRANSITION_DELAY,
            performance_mode: false,
            effect_search_paths: Vec::new(),
            texture_search_paths: Vec::new(),
            preprocessor_definitions: Vec::new(),
            current_preset_path: PathBuf::new(),
            screenshot_path: PathBuf::new(),
            screenshot_format: 1,
            screenshot_include_preset: false,
            screenshot_save_before: false,
            no_reload_on_init: false,
            skip_loading_disabled_effects: true,
        }
    }
}

impl RuntimeSettings {
    /// Reads settings from `config_path`, keeping defaults for missing keys.
    ///
    /// Relative paths resolve against the configuration file's directory. An
    /// unusable current preset falls back to `DEFAULT_PRESET` there.
    pub fn load(cache: &mut ConfigCache, config_path: &Path) -> Self {
        let base = base_directory(config_path);
        let mut settings = Self::default();
        let preset = {
            let config = cache.load(config_path);
            settings.read(config);
            configured_preset(config)
        };

        let candidate = (!preset.as_os_str().is_empty()).then(|| base.join(&preset));
        settings.current_preset_path = match candidate {
            Some(path) if check_preset_path(cache, &path) => path,
            other => {
                if let Some(path) = other {
                    info!(preset = %path.display(), "configured preset unusable; using default");
                }
                base.join(DEFAULT_PRESET)
            }
        };
        debug!(preset = %settings.current_preset_path.display(), "loaded runtime settings");
        settings
    }

    fn read(&mut self, config: &ConfigFile) {
        read_key(config, "KeyReload", &mut self.reload_key);
        read_key(config, "KeyEffects", &mut self.effects_key);
        read_key(config, "KeyScreenshot", &mut self.screenshot_key);
        read_key(config, "KeyPreviousPreset", &mut self.previous_preset_key);
        read_key(config, "KeyNextPreset", &mut self.next_preset_key);
        if let Some(delay) = config.get_duration(INPUT_SECTION, "PresetTransitionDelay") {
            self.preset_transition_delay = delay;
        }

        read_value(config, "PerformanceMode", &mut self.performance_mode);
        read_value(config, "EffectSearchPaths", &mut self.effect_search_paths);
        read_value(config, "TextureSearchPaths", &mut self.texture_search_paths);
        read_value(config, "PreprocessorDefinitions", &mut self.preprocessor_definitions);
        read_value(config, "ScreenshotPath", &mut self.screenshot_path);
        read_value(config, "ScreenshotFormat", &mut self.screenshot_format);
        read_value(config, "ScreenshotIncludePreset", &mut self.screenshot_include_preset);
        read_value(config, "ScreenshotSaveBefore", &mut self.screenshot_save_before);
        read_value(config, "NoReloadOnInit", &mut self.no_reload_on_init);
        read_value(
            config,
            "SkipLoadingDisabledEffects",
            &mut self.skip_loading_disabled_effects,
        );
    }

    pub fn write(&self, config: &mut ConfigFile) -> Result<(), ConfigError> {
        config.set(INPUT_SECTION, "KeyReload", &self.reload_key.to_array())?;
        config.set(INPUT_SECTION, "KeyEffects", &self.effects_key.to_array())?;
        config.set(INPUT_SECTION, "KeyScreenshot", &self.screenshot_key.to_array())?;
        config.set(INPUT_SECTION, "KeyPreviousPreset", &self.previous_preset_key.to_array())?;
        config.set(INPUT_SECTION, "KeyNextPreset", &self.next_preset_key.to_array())?;
        config.set_duration(INPUT_SECTION, "PresetTransitionDelay", self.preset_transition_delay)?;

        config.set(GENERAL_SECTION, "PerformanceMode", &self.performance_mode)?;
        config.set(GENERAL_SECTION, "EffectSearchPaths", &self.effect_search_paths)?;
        config.set(GENERAL_SECTION, "TextureSearchPaths", &self.texture_search_paths)?;
        config.set(GENERAL_SECTION, "PreprocessorDefinitions", &self.preprocessor_definitions)?;
        config.set(GENERAL_SECTION, "CurrentPresetPath", &self.current_preset_path)?;
        config.set(GENERAL_SECTION, "ScreenshotPath", &self.screenshot_path)?;
        config.set(GENERAL_SECTION, "ScreenshotFormat", &self.screenshot_format)?;
        config.set(GENERAL_SECTION, "ScreenshotIncludePreset", &self.screenshot_include_preset)?;
        config.set(GENERAL_SECTION, "ScreenshotSaveBefore", &self.screenshot_save_before)?;
        config.set(GENERAL_SECTION, "NoReloadOnInit", &self.no_reload_on_init)?;
        config.set(
            GENERAL_SECTION,
            "SkipLoadingDisabledEffects",
            &self.skip_loading_disabled_effects,
        )?;
        Ok(())
    }
}

/// Directory relative settings paths resolve against.
pub fn base_directory(config_path: &Path) -> PathBuf {
    configstore::absolute_path(config_path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// `CurrentPresetPath`, or the entry of the legacy `PresetFiles` list picked
/// by `CurrentPreset`.
fn configured_preset(config: &ConfigFile) -> PathBuf {
    let current: PathBuf = config
        .get(GENERAL_SECTION, "CurrentPresetPath")
        .unwrap_or_default();
    if !current.as_os_str().is_empty() {
        return current;
    }
    let files: Vec<PathBuf> = config
        .get(GENERAL_SECTION, "PresetFiles")
        .unwrap_or_default();
    let index: usize = config.get(GENERAL_SECTION, "CurrentPreset").unwrap_or(0);
    files.into_iter().nth(index).unwrap_or_default()
}

fn read_key(config: &ConfigFile, key: &str, out: &mut KeyBinding) {
    let mut data = out.to_array();
    if config.get_into(INPUT_SECTION, key, &mut data) > 0 {
        *out = KeyBinding::from_array(data);
    }
}

fn read_value<T: serde::de::DeserializeOwned>(config: &ConfigFile, key: &str, out: &mut T) {
    if let Some(value) = config.get(GENERAL_SECTION, key) {
        *out = value;
    }
}
