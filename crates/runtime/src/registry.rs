use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use scheduler::ReloadScheduler;
use tracing::{debug, trace};

use crate::backend::{Backend, BackendHandle};
use crate::storage::{UniformLayout, UniformStorage};
use crate::types::{Effect, EffectModule, Technique, Uniform};

/// Loaded effects with their techniques and uniforms.
///
/// The registry is only mutated on the control thread. Reload workers get
/// owned copies of what they need (source path, definitions, parsed module),
/// so enable state and storage layout never change under them.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) effects: Vec<Effect>,
    pub(crate) techniques: Vec<Technique>,
    pub(crate) uniforms: Vec<Uniform>,
    pub(crate) storage: UniformStorage,
}

impl Registry {
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            storage: UniformStorage::new(layout),
            ..Self::default()
        }
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn techniques(&self) -> &[Technique] {
        &self.techniques
    }

    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    pub fn storage(&self) -> &UniformStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut UniformStorage {
        &mut self.storage
    }

    pub fn technique_index(&self, name: &str) -> Option<usize> {
        self.techniques.iter().position(|t| t.name == name)
    }

    pub fn technique(&self, name: &str) -> Option<&Technique> {
        self.techniques.iter().find(|t| t.name == name)
    }

    pub fn technique_mut(&mut self, name: &str) -> Option<&mut Technique> {
        self.techniques.iter_mut().find(|t| t.name == name)
    }

    /// Finds a uniform by effect file name and variable name.
    pub fn uniform(&self, effect_file: &str, name: &str) -> Option<&Uniform> {
        self.uniforms.iter().find(|uniform| {
            uniform.name == name
                && self
                    .effects
                    .get(uniform.effect_index)
                    .is_some_and(|effect| effect.section_name() == effect_file)
        })
    }

    pub(crate) fn add_effect(&mut self, source_file: PathBuf) -> usize {
        self.effects.push(Effect::new(source_file));
        self.effects.len() - 1
    }

    /// Drops everything and returns the backend handles that must be
    /// released.
    pub(crate) fn clear(&mut self) -> Vec<BackendHandle> {
        let handles = self
            .effects
            .iter_mut()
            .filter_map(|effect| effect.handle.take())
            .collect();
        self.effects.clear();
        self.techniques.clear();
        self.uniforms.clear();
        self.storage.clear();
        handles
    }

    /// Enables the technique at `index`, queueing its effect for compilation
    /// when it has no backend resources yet. Returns whether the technique is
    /// enabled afterwards.
    pub fn enable<R: Send + 'static>(
        &mut self,
        index: usize,
        scheduler: &mut ReloadScheduler<R>,
    ) -> bool {
        let Some(technique) = self.techniques.get_mut(index) else {
            return false;
        };
        let Some(effect) = self.effects.get_mut(technique.effect_index) else {
            return false;
        };
        if !effect.compile_success {
            debug!(technique = %technique.name, "not enabling technique of failed effect");
            return false;
        }

        let was_enabled = technique.enabled;
        technique.enabled = true;
        technique.timeleft = technique.timeout;

        if effect.handle.is_none() && scheduler.enqueue(technique.effect_index) {
            trace!(effect = %effect.source_file.display(), "queued effect for compilation");
        }
        if !was_enabled {
            effect.rendering += 1;
        }
        true
    }

    /// Disables the technique at `index`. Returns whether it was enabled.
    pub fn disable(&mut self, index: usize) -> bool {
        let Some(technique) = self.techniques.get_mut(index) else {
            return false;
        };
        let was_enabled = technique.enabled;
        technique.enabled = false;
        technique.timeleft = std::time::Duration::ZERO;
        technique.average_cpu.clear();
        technique.average_gpu.clear();

        if was_enabled {
            if let Some(effect) = self.effects.get_mut(technique.effect_index) {
                effect.rendering = effect.rendering.saturating_sub(1);
            }
        }
        was_enabled
    }

    /// Disables every technique of one effect.
    pub(crate) fn disable_effect(&mut self, effect_index: usize) {
        for index in 0..self.techniques.len() {
            if self.techniques[index].effect_index == effect_index {
                self.disable(index);
            }
        }
    }

    /// Registers the techniques and uniforms of a freshly parsed module.
    ///
    /// Techniques are inserted after those of lower-indexed effects so the
    /// unsorted order does not depend on which worker finished first.
    pub(crate) fn register_module(&mut self, effect_index: usize, module: Arc<EffectModule>) {
        let insert_at = self
            .techniques
            .iter()
            .position(|t| t.effect_index > effect_index)
            .unwrap_or(self.techniques.len());
        let techniques = module
            .techniques
            .iter()
            .map(|info| Technique::from_info(info, effect_index));
        self.techniques.splice(insert_at..insert_at, techniques);

        for info in &module.uniforms {
            let offset = self.storage.allocate(info.ty.size());
            let uniform = Uniform::from_info(info, effect_index, offset);
            self.storage.reset(&uniform);
            self.uniforms.push(uniform);
        }

        if let Some(effect) = self.effects.get_mut(effect_index) {
            effect.module = Some(module);
        }
    }

    /// Orders techniques by their position in `order`. Names missing from
    /// the list keep their relative order at the end.
    pub fn sort_techniques(&mut self, order: &[String]) {
        self.techniques.sort_by_key(|technique| {
            order
                .iter()
                .position(|name| *name == technique.name)
                .unwrap_or(usize::MAX)
        });
    }

    /// Renders every enabled technique whose effect is resident.
    pub(crate) fn render(&mut self, backend: &dyn Backend) {
        let Self {
            effects,
            techniques,
            storage,
            ..
        } = self;
        for technique in techniques.iter_mut().filter(|t| t.enabled) {
            let Some(effect) = effects.get(technique.effect_index) else {
                continue;
            };
            let Some(handle) = effect.handle.filter(|_| effect.compile_success) else {
                continue;
            };
            let started = Instant::now();
            let gpu = backend.render_technique(handle, technique, storage.as_bytes());
            technique.average_cpu.append(started.elapsed());
            if let Some(gpu) = gpu {
                technique.average_gpu.append(gpu);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AnnotationValue, Annotations, TechniqueInfo, UniformBase, UniformInfo, UniformType,
    };
    use std::time::Duration;

    fn module(names: &[&str]) -> Arc<EffectModule> {
        Arc::new(EffectModule {
            techniques: names.iter().map(|name| TechniqueInfo::new(*name)).collect(),
            uniforms: vec![UniformInfo::new(
                "Strength",
                UniformType::scalar(UniformBase::Float),
            )],
        })
    }

    fn registry_with(effects: &[&[&str]]) -> Registry {
        let mut registry = Registry::new(UniformLayout::Native);
        for (index, names) in effects.iter().enumerate() {
            let effect = registry.add_effect(PathBuf::from(format!("effect{index}.fx")));
            registry.register_module(effect, module(names));
        }
        registry
    }

    #[test]
    fn failed_effect_cannot_be_enabled() {
        let mut registry = registry_with(&[&["Broken"]]);
        registry.effects[0].compile_success = false;
        let mut scheduler = ReloadScheduler::<()>::new();
        assert!(!registry.enable(0, &mut scheduler));
        assert!(!registry.techniques[0].is_enabled());
        assert_eq!(registry.effects[0].rendering(), 0);
        assert!(!scheduler.has_queued());
    }

    #[test]
    fn enable_disable_restores_reference_count() {
        let mut registry = registry_with(&[&["Bloom", "BloomBlur"]]);
        let mut scheduler = ReloadScheduler::<()>::new();
        registry.enable(0, &mut scheduler);
        registry.enable(0, &mut scheduler);
        registry.enable(1, &mut scheduler);
        assert_eq!(registry.effects[0].rendering(), 2);

        registry.disable(0);
        registry.disable(0);
        registry.disable(1);
        registry.disable(1);
        assert_eq!(registry.effects[0].rendering(), 0);
    }

    #[test]
    fn uncompiled_effect_is_queued_once() {
        let mut registry = registry_with(&[&["Bloom"], &["Vignette"]]);
        let mut scheduler = ReloadScheduler::<()>::new();
        registry.enable(1, &mut scheduler);
        registry.disable(1);
        registry.enable(1, &mut scheduler);
        assert_eq!(scheduler.queued(), &[1]);
        assert_eq!(scheduler.total(), 1);
    }

    #[test]
    fn compiled_effect_is_not_queued() {
        let mut registry = registry_with(&[&["Bloom"]]);
        registry.effects[0].handle = Some(BackendHandle(1));
        let mut scheduler = ReloadScheduler::<()>::new();
        registry.enable(0, &mut scheduler);
        assert!(!scheduler.has_queued());
    }

    #[test]
    fn enable_resets_timeout_and_disable_clears_timings() {
        let mut registry = Registry::new(UniformLayout::Native);
        let effect = registry.add_effect(PathBuf::from("flash.fx"));
        let mut info = TechniqueInfo::new("Flash");
        info.annotations = Annotations::new().with("timeout", AnnotationValue::Int(250));
        registry.register_module(
            effect,
            Arc::new(EffectModule {
                techniques: vec![info],
                uniforms: Vec::new(),
            }),
        );
        let mut scheduler = ReloadScheduler::<()>::new();
        registry.enable(0, &mut scheduler);
        assert_eq!(registry.techniques[0].timeleft(), Duration::from_millis(250));

        registry.techniques[0].average_cpu.append(Duration::from_millis(2));
        registry.disable(0);
        assert_eq!(registry.techniques[0].timeleft(), Duration::ZERO);
        assert!(registry.techniques[0].average_cpu().is_empty());
    }

    #[test]
    fn techniques_stay_grouped_by_effect() {
        let mut registry = Registry::new(UniformLayout::Native);
        let first = registry.add_effect(PathBuf::from("a.fx"));
        let second = registry.add_effect(PathBuf::from("b.fx"));
        registry.register_module(second, module(&["B1"]));
        registry.register_module(first, module(&["A1", "A2"]));
        let names: Vec<_> = registry.techniques().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn sort_moves_unlisted_to_end() {
        let mut registry = registry_with(&[&["A", "B", "C", "D"]]);
        registry.sort_techniques(&["C".to_string(), "A".to_string()]);
        let names: Vec<_> = registry.techniques().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn uniforms_get_disjoint_ranges() {
        let registry = registry_with(&[&["A"], &["B"]]);
        let first = registry.uniform("effect0.fx", "Strength").unwrap();
        let second = registry.uniform("effect1.fx", "Strength").unwrap();
        assert!(first.offset() + first.size() <= second.offset());
        assert!(second.offset() + second.size() <= registry.storage().len());
    }
}
