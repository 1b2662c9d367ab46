use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use configstore::{ConfigCache, GLOBAL_SECTION};
use runtime::preset::{find_adjacent_preset, list_presets, search_location, PresetLists};
use runtime::settings::{base_directory, GENERAL_SECTION};
use runtime::RuntimeSettings;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, PresetsAction};
use crate::paths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = paths::resolve_config_file(cli.config.as_deref())?;
    debug!(config = %config_path.display(), "resolved runtime configuration");
    let mut cache = ConfigCache::new();

    match cli.command {
        Command::Where => run_where(&mut cache, &config_path),
        Command::Presets(presets) => match presets.action {
            PresetsAction::List { filter } => run_list(&mut cache, &config_path, filter.as_deref()),
            PresetsAction::Next { filter } => {
                run_switch(&mut cache, &config_path, filter.as_deref(), false)
            }
            PresetsAction::Prev { filter } => {
                run_switch(&mut cache, &config_path, filter.as_deref(), true)
            }
            PresetsAction::Show => run_show(&mut cache, &config_path),
        },
    }
}

fn run_where(cache: &mut ConfigCache, config_path: &Path) -> Result<()> {
    let settings = RuntimeSettings::load(cache, config_path);
    let base = base_directory(config_path);
    let status = if config_path.exists() { "" } else { " (missing)" };
    println!("Runtime configuration:");
    println!("  config:     {}{status}", config_path.display());
    println!("  base:       {}", base.display());
    println!("  preset:     {}", settings.current_preset_path.display());
    println!("  transition: {:?}", settings.preset_transition_delay);
    println!("Effect search paths:");
    for path in &settings.effect_search_paths {
        println!("  {}", base.join(path).display());
    }
    Ok(())
}

fn run_list(cache: &mut ConfigCache, config_path: &Path, filter: Option<&Path>) -> Result<()> {
    let settings = RuntimeSettings::load(cache, config_path);
    let current = settings.current_preset_path;
    let (dir, text) = search_location(&current, filter.unwrap_or(Path::new("")));
    let (presets, current_index) = list_presets(cache, &dir, &text, &current);

    if presets.is_empty() {
        println!("No presets found in {}", dir.display());
        return Ok(());
    }
    println!("Presets in {}:", dir.display());
    for (index, preset) in presets.iter().enumerate() {
        let marker = if Some(index) == current_index { '*' } else { ' ' };
        let name = preset
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("{marker} {name}");
    }
    Ok(())
}

fn run_switch(
    cache: &mut ConfigCache,
    config_path: &Path,
    filter: Option<&Path>,
    reversed: bool,
) -> Result<()> {
    let settings = RuntimeSettings::load(cache, config_path);
    let current = settings.current_preset_path;
    let filter = filter.unwrap_or(Path::new(""));
    let Some(next) = find_adjacent_preset(cache, &current, filter, reversed) else {
        bail!("no preset found next to {}", current.display());
    };

    let stored = relative_to(&next, &base_directory(config_path));
    cache
        .load(config_path)
        .set(GENERAL_SECTION, "CurrentPresetPath", &stored)
        .context("failed to update current preset")?;
    cache
        .flush_path(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    info!(preset = %next.display(), "current preset changed");
    println!("{}", next.display());
    Ok(())
}

fn run_show(cache: &mut ConfigCache, config_path: &Path) -> Result<()> {
    let settings = RuntimeSettings::load(cache, config_path);
    let path = settings.current_preset_path;
    if !path.exists() {
        bail!("current preset {} does not exist yet", path.display());
    }

    let preset = cache.load(&path);
    let lists = PresetLists::read(preset);
    println!("Preset: {}", path.display());
    println!("  techniques:  {}", lists.techniques.join(", "));
    if lists.sorting != lists.techniques {
        println!("  sorting:     {}", lists.sorting.join(", "));
    }
    if !lists.definitions.is_empty() {
        println!("  definitions: {}", lists.definitions.join(" "));
    }

    let sections: Vec<String> = preset
        .sections()
        .filter(|section| *section != GLOBAL_SECTION)
        .map(str::to_string)
        .collect();
    for section in sections {
        println!("[{section}]");
        for key in preset.keys(&section) {
            if let Some(value) = preset.raw(&section, key) {
                println!("  {key} = {value}");
            }
        }
    }
    Ok(())
}

/// `path` relative to `base` when it lies inside it.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_to_strips_base_only_when_inside() {
        let base = Path::new("/home/user/.config/shadefx");
        assert_eq!(
            relative_to(&base.join("looks/Night.ini"), base),
            PathBuf::from("looks/Night.ini")
        );
        assert_eq!(
            relative_to(Path::new("/srv/presets/Day.ini"), base),
            PathBuf::from("/srv/presets/Day.ini")
        );
    }
}
