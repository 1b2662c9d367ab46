use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Local, Timelike};
use configstore::{ConfigCache, ConfigFile};
use scheduler::{default_worker_count, Completion, Drained, ReloadScheduler};
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError, BackendHandle, FrontEnd, KeyInput};
use crate::preset::{
    apply_techniques, apply_values, find_adjacent_preset, save_preset, PresetLists,
    TransitionStep,
};
use crate::registry::Registry;
use crate::settings::{base_directory, RuntimeSettings};
use crate::storage::UniformLayout;
use crate::types::{EffectModule, KeyBinding, SpecialUniform, UniformBase};
use crate::RuntimeError;

/// File extension of effect sources picked up by a reload.
pub const EFFECT_EXTENSION: &str = "fx";

type LoadCallback = Box<dyn FnMut(&ConfigFile)>;
type SaveCallback = Box<dyn FnMut(&mut ConfigFile)>;

/// Work deferred until the running reload has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Start another full reload.
    Reload,
    /// Apply the current preset's technique state and values.
    ApplyPreset,
}

/// Outcome of one worker job.
#[derive(Debug)]
pub struct CompileReport {
    module: Option<Arc<EffectModule>>,
    handle: Option<BackendHandle>,
    error: Option<BackendError>,
}

struct CompileJob {
    source: PathBuf,
    definitions: Arc<Vec<String>>,
    module: Option<Arc<EffectModule>>,
    wanted: Arc<Vec<String>>,
    force: bool,
    skip_disabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct FrameState {
    count: u64,
    started: Instant,
    last_present: Instant,
    last_duration: Duration,
    date: [i32; 4],
}

/// Effect runtime driven by the host's present calls.
///
/// ```text
///   on_present ─▶ poll scheduler ─▶ apply compile reports ─▶ pending actions
///        │                                                  (deferred preset)
///        ├─▶ shortcuts ─▶ enable / disable / switch preset
///        └─▶ transition step, timeouts, special uniforms, config flush
/// ```
pub struct Runtime {
    frontend: Arc<dyn FrontEnd>,
    backend: Arc<dyn Backend>,
    configuration_path: PathBuf,
    base_path: PathBuf,
    cache: ConfigCache,
    settings: RuntimeSettings,
    registry: Registry,
    scheduler: ReloadScheduler<CompileReport>,
    worker_count: usize,
    pending: VecDeque<PendingAction>,
    preset_definitions: Vec<String>,
    transition_started: Option<Instant>,
    frame: FrameState,
    effects_enabled: bool,
    ignore_shortcuts: bool,
    screenshot_requested: bool,
    reload_started: Option<Instant>,
    load_callbacks: Vec<LoadCallback>,
    save_callbacks: Vec<SaveCallback>,
}

impl Runtime {
    pub fn new(
        configuration_path: impl Into<PathBuf>,
        frontend: Arc<dyn FrontEnd>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let configuration_path = configuration_path.into();
        let layout = UniformLayout::from(backend.capabilities());
        let now = Instant::now();
        Self {
            frontend,
            backend,
            base_path: base_directory(&configuration_path),
            configuration_path,
            cache: ConfigCache::new(),
            settings: RuntimeSettings::default(),
            registry: Registry::new(layout),
            scheduler: ReloadScheduler::new(),
            worker_count: default_worker_count(),
            pending: VecDeque::new(),
            preset_definitions: Vec::new(),
            transition_started: None,
            frame: FrameState {
                count: 0,
                started: now,
                last_present: now,
                last_duration: Duration::ZERO,
                date: [0; 4],
            },
            effects_enabled: true,
            ignore_shortcuts: false,
            screenshot_requested: false,
            reload_started: None,
            load_callbacks: Vec::new(),
            save_callbacks: Vec::new(),
        }
    }

    /// Number of compile threads per reload batch.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    /// Loads settings and, unless disabled, starts the initial reload.
    pub fn start(&mut self) {
        self.load_config();
        if self.settings.no_reload_on_init {
            info!("skipping initial effect reload");
        } else {
            self.reload();
        }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RuntimeSettings {
        &mut self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Live uniform values for collaborators such as an overlay.
    pub fn storage_mut(&mut self) -> &mut crate::storage::UniformStorage {
        self.registry.storage_mut()
    }

    pub fn configuration_path(&self) -> &Path {
        &self.configuration_path
    }

    pub fn current_preset_path(&self) -> &Path {
        &self.settings.current_preset_path
    }

    pub fn is_loading(&self) -> bool {
        self.scheduler.is_loading()
    }

    pub fn has_queued_effects(&self) -> bool {
        self.scheduler.has_queued()
    }

    /// `(finished, total)` effects of the current load.
    pub fn load_progress(&self) -> (usize, usize) {
        self.scheduler.progress()
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &PendingAction> {
        self.pending.iter()
    }

    pub fn is_in_transition(&self) -> bool {
        self.transition_started.is_some()
    }

    pub fn effects_enabled(&self) -> bool {
        self.effects_enabled
    }

    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects_enabled = enabled;
    }

    pub fn set_ignore_shortcuts(&mut self, ignore: bool) {
        self.ignore_shortcuts = ignore;
    }

    /// Captures a screenshot after the next `render_effects`.
    pub fn request_screenshot(&mut self) {
        self.screenshot_requested = true;
    }

    pub fn is_screenshot_requested(&self) -> bool {
        self.screenshot_requested
    }

    pub fn frame_count(&self) -> u64 {
        self.frame.count
    }

    pub fn last_frame_duration(&self) -> Duration {
        self.frame.last_duration
    }

    pub fn enable_technique(&mut self, name: &str) -> bool {
        match self.registry.technique_index(name) {
            Some(index) => self.registry.enable(index, &mut self.scheduler),
            None => false,
        }
    }

    pub fn disable_technique(&mut self, name: &str) -> bool {
        match self.registry.technique_index(name) {
            Some(index) => self.registry.disable(index),
            None => false,
        }
    }

    pub fn load_config(&mut self) {
        self.settings = RuntimeSettings::load(&mut self.cache, &self.configuration_path);
        let config = self.cache.load(&self.configuration_path);
        for callback in &mut self.load_callbacks {
            callback(config);
        }
    }

    pub fn save_config(&mut self) -> Result<(), RuntimeError> {
        let config = self.cache.load(&self.configuration_path);
        self.settings.write(config)?;
        for callback in &mut self.save_callbacks {
            callback(&mut *config);
        }
        Ok(())
    }

    /// Registers a callback run on every `load_config`, and once right away.
    pub fn subscribe_to_load(&mut self, mut callback: impl FnMut(&ConfigFile) + 'static) {
        callback(self.cache.load(&self.configuration_path));
        self.load_callbacks.push(Box::new(callback));
    }

    /// Registers a callback run on every `save_config`, and once right away.
    pub fn subscribe_to_save(&mut self, mut callback: impl FnMut(&mut ConfigFile) + 'static) {
        callback(self.cache.load(&self.configuration_path));
        self.save_callbacks.push(Box::new(callback));
    }

    /// Drops every effect and recompiles from the search paths. While a
    /// reload is running the request is deferred until it drains.
    pub fn reload(&mut self) {
        if self.scheduler.is_loading() {
            debug!("reload requested while loading; deferring");
            self.defer(PendingAction::Reload);
            return;
        }

        for handle in self.registry.clear() {
            self.backend.unload_effect(handle);
        }
        self.scheduler.take_queue();
        self.scheduler.reset_total();

        let preset = self.settings.current_preset_path.clone();
        self.preset_definitions = PresetLists::read(self.cache.load(&preset)).definitions;

        let sources = self.discover_effects();
        info!(effects = sources.len(), "reloading effects");
        for source in sources {
            let index = self.registry.add_effect(source);
            self.scheduler.enqueue(index);
        }
        self.reload_started = Some(Instant::now());
        self.defer(PendingAction::ApplyPreset);
        if self.scheduler.has_queued() {
            self.dispatch_queued();
        } else {
            self.finish_reload();
        }
    }

    /// Blocks until every queued and running compile has finished,
    /// including compiles queued by deferred preset application.
    pub fn wait_for_reload(&mut self) {
        loop {
            if !self.scheduler.is_loading() {
                if !self.scheduler.has_queued() {
                    return;
                }
                self.dispatch_queued();
                continue;
            }
            let drained = self.scheduler.wait();
            self.apply_drained(drained);
        }
    }

    /// Applies the current preset, or defers it behind a reload when the
    /// preset's definitions require recompiling first.
    pub fn load_current_preset(&mut self, now: Instant) {
        let path = self.settings.current_preset_path.clone();
        let lists = PresetLists::read(self.cache.load(&path));
        if self.settings.performance_mode || lists.definitions != self.preset_definitions {
            debug!(preset = %path.display(), "preset needs recompilation; deferring values");
            self.preset_definitions = lists.definitions;
            self.transition_started = None;
            // A reload always re-applies the preset once it drains.
            self.reload();
            return;
        }
        self.apply_current_preset(now);
    }

    pub fn save_current_preset(&mut self) -> Result<(), RuntimeError> {
        let path = self.settings.current_preset_path.clone();
        save_preset(&self.registry, self.cache.load(&path), &self.preset_definitions)?;
        Ok(())
    }

    /// Makes the next (or previous) preset next to the current one current
    /// and starts a transition toward it. Refused while effects are loading.
    pub fn switch_to_adjacent_preset(&mut self, filter: &Path, reversed: bool, now: Instant) -> bool {
        if self.scheduler.is_loading() || self.scheduler.has_queued() {
            debug!("preset switch ignored while effects are loading");
            return false;
        }
        let current = &self.settings.current_preset_path;
        let Some(next) = find_adjacent_preset(&mut self.cache, current, filter, reversed) else {
            info!(filter = %filter.display(), "no preset found to switch to");
            return false;
        };

        info!(preset = %next.display(), "switching preset");
        self.settings.current_preset_path = next;
        self.transition_started = Some(now);
        if let Err(err) = self.save_config() {
            warn!(%err, "failed to store current preset");
        }
        true
    }

    /// Per-frame tick.
    pub fn on_present(&mut self, now: Instant, input: &dyn KeyInput) {
        self.frame.count += 1;
        self.frame.last_duration = now.saturating_duration_since(self.frame.last_present);
        self.frame.last_present = now;
        self.frame.date = local_date();

        let drained = self.scheduler.poll();
        self.apply_drained(drained);
        if !self.scheduler.is_loading() && self.scheduler.has_queued() {
            self.dispatch_queued();
        }

        // A transition advances only while shortcuts are live.
        if !self.ignore_shortcuts {
            self.handle_shortcuts(now, input);
            if self.transition_started.is_some()
                && !self.scheduler.is_loading()
                && !self.scheduler.has_queued()
            {
                self.load_current_preset(now);
            }
        }

        self.update_timeouts(self.frame.last_duration);
        self.update_special_uniforms();

        if let Err(err) = self.cache.flush() {
            warn!(%err, "failed to write configuration");
        }
    }

    /// Renders enabled techniques of resident effects and serves a pending
    /// screenshot request, optionally capturing the unprocessed frame first.
    pub fn render_effects(&mut self) {
        let screenshot = std::mem::take(&mut self.screenshot_requested);
        if screenshot && self.settings.screenshot_save_before {
            self.save_screenshot(" Original", false);
        }
        if self.effects_enabled {
            self.registry.render(&*self.backend);
        }
        if screenshot {
            self.save_screenshot("", true);
        }
    }

    /// Captures the back buffer to
    /// `<screenshot path>/<config stem> YYYY-MM-DD HH-MM-SS<postfix>.<bmp|png>`.
    ///
    /// With `with_preset` and `ScreenshotIncludePreset` set, the current
    /// preset is flushed and copied next to the image as `.ini`. Returns the
    /// image path when the backend wrote it.
    pub fn save_screenshot(&mut self, postfix: &str, with_preset: bool) -> Option<PathBuf> {
        let date = if self.frame.count == 0 {
            local_date()
        } else {
            self.frame.date
        };
        let dir = self.base_path.join(&self.settings.screenshot_path);
        let stem = self
            .configuration_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let least = format!("{stem} {}", screenshot_timestamp(date));
        let extension = if self.settings.screenshot_format == 0 {
            "bmp"
        } else {
            "png"
        };
        let path = dir.join(format!("{least}{postfix}.{extension}"));

        info!(path = %path.display(), "saving screenshot");
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), %err, "cannot create screenshot directory");
        }
        if !self.backend.capture_screenshot(&path) {
            error!(path = %path.display(), "failed to write screenshot");
            return None;
        }

        if with_preset && self.settings.screenshot_include_preset {
            let preset = self.settings.current_preset_path.clone();
            self.cache.load(&preset);
            match self.cache.flush_path(&preset) {
                Ok(_) if preset.is_file() => {
                    let copy = dir.join(format!("{least}.ini"));
                    if let Err(err) = fs::copy(&preset, &copy) {
                        warn!(preset = %preset.display(), %err, "failed to copy preset next to screenshot");
                    }
                }
                Ok(_) => debug!(preset = %preset.display(), "no preset file to copy"),
                Err(err) => warn!(preset = %preset.display(), %err, "failed to flush preset"),
            }
        }
        Some(path)
    }

    fn handle_shortcuts(&mut self, now: Instant, input: &dyn KeyInput) {
        if pressed(input, &self.settings.effects_key) {
            self.effects_enabled = !self.effects_enabled;
        }
        if pressed(input, &self.settings.screenshot_key) {
            self.screenshot_requested = true;
        }
        if pressed(input, &self.settings.reload_key) {
            self.reload();
        }

        if !self.scheduler.is_loading() && !self.scheduler.has_queued() {
            let next = pressed(input, &self.settings.next_preset_key);
            let previous = pressed(input, &self.settings.previous_preset_key);
            if next || previous {
                self.switch_to_adjacent_preset(Path::new(""), previous, now);
            }
        }

        for index in 0..self.registry.techniques.len() {
            let technique = &self.registry.techniques[index];
            if !pressed(input, &technique.toggle_key) {
                continue;
            }
            if technique.enabled {
                self.registry.disable(index);
            } else {
                self.registry.enable(index, &mut self.scheduler);
            }
        }
    }

    fn apply_current_preset(&mut self, now: Instant) {
        let step = self.transition_step(now);
        let path = self.settings.current_preset_path.clone();
        let preset = self.cache.load(&path);
        let lists = PresetLists::read(preset);
        self.registry.sort_techniques(&lists.sorting);
        apply_values(&mut self.registry, preset, step);
        apply_techniques(&mut self.registry, preset, &lists.techniques, &mut self.scheduler);
    }

    /// Timing of the current transition frame; `None` once it has ended.
    fn transition_step(&mut self, now: Instant) -> Option<TransitionStep> {
        let started = self.transition_started?;
        let delay = self.settings.preset_transition_delay;
        let elapsed = now.saturating_duration_since(started);
        if elapsed >= delay {
            self.transition_started = None;
            return None;
        }
        let remaining = delay - elapsed;
        Some(TransitionStep {
            remaining,
            remaining_before_frame: remaining + self.frame.last_duration,
        })
    }

    fn defer(&mut self, action: PendingAction) {
        if !self.pending.contains(&action) {
            self.pending.push_back(action);
        }
    }

    fn run_pending(&mut self) {
        while let Some(action) = self.pending.pop_front() {
            match action {
                PendingAction::Reload => {
                    self.reload();
                    return;
                }
                PendingAction::ApplyPreset => self.apply_current_preset(self.frame.last_present),
            }
        }
    }

    fn discover_effects(&self) -> Vec<PathBuf> {
        let mut sources: Vec<PathBuf> = Vec::new();
        for search_path in &self.settings.effect_search_paths {
            let dir = self.base_path.join(search_path);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(dir = %dir.display(), %err, "cannot read effect search path");
                    continue;
                }
            };
            for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
                let is_effect = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(EFFECT_EXTENSION));
                if !is_effect || !path.is_file() {
                    continue;
                }
                if sources.iter().any(|known| known.file_name() == path.file_name()) {
                    warn!(effect = %path.display(), "skipping effect with duplicate file name");
                    continue;
                }
                sources.push(path);
            }
        }
        sources.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        sources
    }

    fn dispatch_queued(&mut self) {
        if self.scheduler.is_loading() || !self.scheduler.has_queued() {
            return;
        }

        let mut definitions = self.settings.preprocessor_definitions.clone();
        definitions.extend(self.preset_definitions.iter().cloned());
        let definitions = Arc::new(definitions);
        let preset = self.settings.current_preset_path.clone();
        let wanted = Arc::new(PresetLists::read(self.cache.load(&preset)).techniques);
        let skip_disabled = self.settings.skip_loading_disabled_effects;

        let jobs: Vec<(usize, CompileJob)> = self
            .scheduler
            .take_queue()
            .into_iter()
            .filter_map(|index| {
                let effect = self.registry.effects.get(index)?;
                if effect.handle.is_some() {
                    return None;
                }
                Some((
                    index,
                    CompileJob {
                        source: effect.source_file.clone(),
                        definitions: Arc::clone(&definitions),
                        module: effect.module.clone(),
                        wanted: Arc::clone(&wanted),
                        force: effect.module.is_some(),
                        skip_disabled,
                    },
                ))
            })
            .collect();
        let indices: Vec<usize> = jobs.iter().map(|(index, _)| *index).collect();

        let frontend = Arc::clone(&self.frontend);
        let backend = Arc::clone(&self.backend);
        let dispatched = self.scheduler.dispatch(
            jobs,
            move |job| compile_effect(&*frontend, &*backend, job),
            self.worker_count,
        );
        match dispatched {
            Ok(0) => self.finish_reload(),
            Ok(count) => debug!(count, "compiling effects"),
            Err(err) => {
                error!(%err, "could not start effect compilation");
                for index in indices {
                    if let Some(effect) = self.registry.effects.get_mut(index) {
                        effect.compile_success = false;
                        effect.errors = err.to_string();
                    }
                    self.registry.disable_effect(index);
                }
                self.finish_reload();
            }
        }
    }

    fn apply_drained(&mut self, drained: Drained<CompileReport>) {
        for completion in drained.completions {
            self.apply_completion(completion);
        }
        if drained.finished {
            self.finish_reload();
        }
    }

    fn apply_completion(&mut self, completion: Completion<CompileReport>) {
        let Completion { index, outcome } = completion;
        let report = match outcome {
            Ok(report) => report,
            Err(err) => CompileReport {
                module: None,
                handle: None,
                error: Some(BackendError::Compile {
                    path: self
                        .registry
                        .effects
                        .get(index)
                        .map(|effect| effect.source_file.clone())
                        .unwrap_or_default(),
                    message: err.to_string(),
                }),
            },
        };

        let Some(effect) = self.registry.effects.get(index) else {
            if let Some(handle) = report.handle {
                self.backend.unload_effect(handle);
            }
            return;
        };
        if let Some(module) = report.module {
            if effect.module.is_none() {
                self.registry.register_module(index, module);
            }
        }

        let effect = &mut self.registry.effects[index];
        match (report.error, report.handle) {
            (Some(err), handle) => {
                warn!(effect = %effect.source_file.display(), %err, "effect failed to load");
                effect.compile_success = false;
                effect.errors = err.to_string();
                if let Some(handle) = handle {
                    self.backend.unload_effect(handle);
                }
                self.registry.disable_effect(index);
            }
            (None, Some(handle)) if effect.handle.is_some() => {
                self.backend.unload_effect(handle);
            }
            (None, Some(handle)) => {
                debug!(effect = %effect.source_file.display(), "effect compiled");
                effect.handle = Some(handle);
            }
            (None, None) => {
                debug!(effect = %effect.source_file.display(), "effect parsed; compile deferred");
            }
        }
    }

    fn finish_reload(&mut self) {
        if let Some(started) = self.reload_started.take() {
            let effects = self.registry.effects.len();
            let failed = self
                .registry
                .effects
                .iter()
                .filter(|effect| !effect.compile_success)
                .count();
            info!(
                effects,
                failed,
                elapsed = ?started.elapsed(),
                "finished loading effects"
            );
        }
        self.run_pending();
    }

    fn update_timeouts(&mut self, frame: Duration) {
        for index in 0..self.registry.techniques.len() {
            let technique = &mut self.registry.techniques[index];
            if !technique.enabled || technique.timeout.is_zero() {
                continue;
            }
            technique.timeleft = technique.timeleft.saturating_sub(frame);
            if technique.timeleft.is_zero() {
                debug!(technique = %technique.name, "technique timed out");
                self.registry.disable(index);
            }
        }
    }

    fn update_special_uniforms(&mut self) {
        let frame = self.frame;
        let frame_ms = frame.last_duration.as_secs_f32() * 1000.0;
        let timer_ms = frame
            .last_present
            .saturating_duration_since(frame.started)
            .as_secs_f32()
            * 1000.0;
        let Registry {
            uniforms, storage, ..
        } = &mut self.registry;
        for uniform in uniforms.iter() {
            match uniform.special() {
                Some(SpecialUniform::FrameTime) => {
                    storage.set_f32(uniform, &[frame_ms]);
                }
                Some(SpecialUniform::FrameCount) if uniform.ty().base == UniformBase::Bool => {
                    storage.set_bool(uniform, &[frame.count % 2 == 0]);
                }
                Some(SpecialUniform::FrameCount) => {
                    storage.set_u32(uniform, &[frame.count as u32]);
                }
                Some(SpecialUniform::Timer) => {
                    storage.set_f32(uniform, &[timer_ms]);
                }
                Some(SpecialUniform::Date) => {
                    storage.set_i32(uniform, &frame.date);
                }
                Some(SpecialUniform::Unknown) | None => {}
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let drained = self.scheduler.wait();
        for completion in drained.completions {
            if let Ok(CompileReport {
                handle: Some(handle),
                ..
            }) = completion.outcome
            {
                self.backend.unload_effect(handle);
            }
        }
        for handle in self.registry.clear() {
            self.backend.unload_effect(handle);
        }
    }
}

fn pressed(input: &dyn KeyInput, key: &KeyBinding) -> bool {
    key.is_set() && input.is_key_pressed(key)
}

/// `YYYY-MM-DD HH-MM-SS` from a `[year, month, day, seconds since midnight]`
/// date vector.
fn screenshot_timestamp(date: [i32; 4]) -> String {
    let [year, month, day, seconds] = date;
    let hour = seconds / 3600;
    let minute = seconds % 3600 / 60;
    let second = seconds % 60;
    format!("{year:04}-{month:02}-{day:02} {hour:02}-{minute:02}-{second:02}")
}

fn local_date() -> [i32; 4] {
    let now = Local::now();
    [
        now.year(),
        now.month() as i32,
        now.day() as i32,
        now.num_seconds_from_midnight() as i32,
    ]
}

/// Runs on a worker thread: parses the effect if needed, then compiles it
/// when something will render it.
fn compile_effect(frontend: &dyn FrontEnd, backend: &dyn Backend, job: CompileJob) -> CompileReport {
    let module = match job.module {
        Some(module) => module,
        None => match frontend.parse(&job.source, &job.definitions) {
            Ok(module) => Arc::new(module),
            Err(error) => {
                return CompileReport {
                    module: None,
                    handle: None,
                    error: Some(error),
                }
            }
        },
    };

    let needed = job.force || !job.skip_disabled || module.is_referenced(&job.wanted);
    if !needed {
        return CompileReport {
            module: Some(module),
            handle: None,
            error: None,
        };
    }
    match backend.compile_effect(&job.source, &module) {
        Ok(handle) => CompileReport {
            module: Some(module),
            handle: Some(handle),
            error: None,
        },
        Err(error) => CompileReport {
            module: Some(module),
            handle: None,
            error: Some(error),
        },
    }
}
