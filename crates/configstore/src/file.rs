use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use toml::{Table, Value};
use tracing::debug;

use crate::ConfigError;

/// Name of the section whose keys live at the top level of the document.
pub const GLOBAL_SECTION: &str = "";

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    values: Table,
}

/// One configuration document, addressed by `(section, key)`.
///
/// Reads never fail: a missing key or a value of the wrong shape yields
/// `None` and leaves caller state untouched. Writes only flag the file as
/// modified when the stored value actually changes.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    sections: Vec<Section>,
    modified: bool,
    read_only: bool,
}

impl ConfigFile {
    /// Creates an empty document that will be written to `path` on save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sections: Vec::new(),
            modified: false,
            read_only: false,
        }
    }

    /// Empty stand-in for a file that exists but could not be read. It
    /// serves defaults and is never written back.
    pub fn unreadable(path: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(path)
        }
    }

    /// Reads `path`; a file that does not exist yet is an empty document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(path));
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let mut file = Self::new(path);
        file.parse_into(&raw)?;
        Ok(file)
    }

    /// Parses a document from memory without touching the filesystem.
    pub fn from_toml_str(path: impl Into<PathBuf>, input: &str) -> Result<Self, ConfigError> {
        let mut file = Self::new(path);
        file.parse_into(input)?;
        Ok(file)
    }

    fn parse_into(&mut self, input: &str) -> Result<(), ConfigError> {
        let document: Table = toml::from_str(input).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut global = Table::new();
        for (name, value) in document {
            match value {
                Value::Table(values) => self.sections.push(Section { name, values }),
                other => {
                    global.insert(name, other);
                }
            }
        }
        if !global.is_empty() {
            self.sections.insert(
                0,
                Section {
                    name: GLOBAL_SECTION.to_string(),
                    values: global,
                },
            );
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Forgets pending changes without writing them.
    pub fn discard_changes(&mut self) {
        self.modified = false;
    }

    pub fn has(&self, section: &str, key: &str) -> bool {
        self.raw(section, key).is_some()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section(section).is_some()
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|section| section.name.as_str())
    }

    pub fn keys<'a>(&'a self, section: &str) -> impl Iterator<Item = &'a str> {
        self.section(section)
            .into_iter()
            .flat_map(|section| section.values.keys().map(String::as_str))
    }

    /// Raw TOML value stored under `(section, key)`.
    pub fn raw(&self, section: &str, key: &str) -> Option<&Value> {
        self.section(section)?.values.get(key)
    }

    /// Reads a typed value; `None` when absent or not convertible to `T`.
    ///
    /// A scalar also reads as a one-element sequence, so `Techniques = "Bloom"`
    /// and `Techniques = ["Bloom"]` are the same list.
    pub fn get<T: DeserializeOwned>(&self, section: &str, key: &str) -> Option<T> {
        let value = self.raw(section, key)?;
        let err = match value.clone().try_into::<T>() {
            Ok(value) => return Some(value),
            Err(err) => err,
        };
        if !matches!(value, Value::Array(_) | Value::Table(_)) {
            if let Ok(value) = Value::Array(vec![value.clone()]).try_into::<T>() {
                return Some(value);
            }
        }
        debug!(section, key, %err, "ignoring configuration value of unexpected type");
        None
    }

    /// Copies the stored sequence into the leading elements of `out`.
    ///
    /// Elements beyond the stored length keep their previous value, and a
    /// scalar is treated as a one-element sequence. Returns how many elements
    /// were written.
    pub fn get_into<T: DeserializeOwned>(&self, section: &str, key: &str, out: &mut [T]) -> usize {
        let Some(value) = self.raw(section, key) else {
            return 0;
        };
        let items = match value {
            Value::Array(items) => items.as_slice(),
            scalar => std::slice::from_ref(scalar),
        };

        let mut written = 0;
        for (slot, item) in out.iter_mut().zip(items) {
            match item.clone().try_into::<T>() {
                Ok(converted) => {
                    *slot = converted;
                    written += 1;
                }
                Err(err) => {
                    debug!(section, key, index = written, %err, "stopping at unconvertible element");
                    break;
                }
            }
        }
        written
    }

    /// Reads a duration stored as milliseconds or as a humantime string.
    pub fn get_duration(&self, section: &str, key: &str) -> Option<Duration> {
        self.get::<Millis>(section, key).map(|millis| millis.0)
    }

    /// Stores `value` under `(section, key)`, creating the section on demand.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        section: &str,
        key: &str,
        value: &T,
    ) -> Result<(), ConfigError> {
        let value = Value::try_from(value).map_err(|source| ConfigError::Encode {
            section: section.to_string(),
            key: key.to_string(),
            source,
        })?;
        self.set_raw(section, key, value);
        Ok(())
    }

    /// Stores the first `len` elements of `values` as a sequence.
    pub fn set_slice<T: Serialize>(
        &mut self,
        section: &str,
        key: &str,
        values: &[T],
        len: usize,
    ) -> Result<(), ConfigError> {
        let len = len.min(values.len());
        self.set(section, key, &values[..len])
    }

    pub fn set_duration(
        &mut self,
        section: &str,
        key: &str,
        value: Duration,
    ) -> Result<(), ConfigError> {
        let millis = i64::try_from(value.as_millis()).unwrap_or(i64::MAX);
        self.set_raw(section, key, Value::Integer(millis));
        Ok(())
    }

    pub fn set_raw(&mut self, section: &str, key: &str, value: Value) {
        let values = self.section_mut(section);
        if values.get(key) == Some(&value) {
            return;
        }
        values.insert(key.to_string(), value);
        self.modified = true;
    }

    pub fn remove(&mut self, section: &str, key: &str) -> Option<Value> {
        let position = self.sections.iter().position(|s| s.name == section)?;
        let removed = self.sections[position].values.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// Renders the document as TOML text.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let mut document = Table::new();
        if let Some(global) = self.section(GLOBAL_SECTION) {
            for (key, value) in &global.values {
                document.insert(key.clone(), value.clone());
            }
        }
        for section in self.sections.iter().filter(|s| s.name != GLOBAL_SECTION) {
            document.insert(section.name.clone(), Value::Table(section.values.clone()));
        }
        toml::to_string(&document).map_err(|source| ConfigError::Serialize {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes the document to its path and clears the modified flag.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        if self.read_only {
            return Err(ConfigError::ReadOnly {
                path: self.path.clone(),
            });
        }
        let rendered = self.to_toml_string()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, rendered).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.modified = false;
        debug!(path = %self.path.display(), "saved configuration file");
        Ok(())
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    fn section_mut(&mut self, name: &str) -> &mut Table {
        let position = match self.sections.iter().position(|s| s.name == name) {
            Some(position) => position,
            None => {
                let section = Section {
                    name: name.to_string(),
                    values: Table::new(),
                };
                if name == GLOBAL_SECTION {
                    self.sections.insert(0, section);
                    0
                } else {
                    self.sections.push(section);
                    self.sections.len() - 1
                }
            }
        };
        &mut self.sections[position].values
    }
}

/// A duration read from either an integer millisecond count or a
/// human-readable string such as `"750ms"` or `"2s"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Millis(pub Duration);

impl<'de> Deserialize<'de> for Millis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Millis;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a duration as milliseconds or human-readable string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(Millis)
                    .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Millis(Duration::from_millis(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration must be non-negative"));
                }
                Ok(Millis(Duration::from_millis(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v.is_nan() || v.is_sign_negative() {
                    return Err(E::custom("duration must be non-negative"));
                }
                Ok(Millis(Duration::from_secs_f64(v / 1000.0)))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
Techniques = ["Bloom", "Vignette"]
KeyBloom = [77, 0, 0, 0]

["Bloom.fx"]
Intensity = [0.5]
Passes = [3]

[INPUT]
PresetTransitionDelay = "1.5s"
"#;

    fn sample() -> ConfigFile {
        ConfigFile::from_toml_str("sample.ini", SAMPLE).expect("parse sample")
    }

    #[test]
    fn global_keys_live_in_empty_section() {
        let file = sample();
        let techniques: Vec<String> = file.get(GLOBAL_SECTION, "Techniques").unwrap();
        assert_eq!(techniques, vec!["Bloom", "Vignette"]);
        assert!(file.has("Bloom.fx", "Intensity"));
        assert!(!file.has(GLOBAL_SECTION, "Intensity"));
    }

    #[test]
    fn get_into_keeps_trailing_elements() {
        let file = sample();
        let mut values = [9.0f32; 4];
        let written = file.get_into("Bloom.fx", "Intensity", &mut values);
        assert_eq!(written, 1);
        assert_eq!(values, [0.5, 9.0, 9.0, 9.0]);

        let mut untouched = [7i32; 2];
        assert_eq!(file.get_into("Bloom.fx", "Missing", &mut untouched), 0);
        assert_eq!(untouched, [7, 7]);
    }

    #[test]
    fn scalar_reads_as_single_element_list() {
        let file = ConfigFile::from_toml_str("hand.ini", "Techniques = \"Bloom\"\nCount = 3\n").unwrap();
        let techniques: Vec<String> = file.get(GLOBAL_SECTION, "Techniques").unwrap();
        assert_eq!(techniques, vec!["Bloom"]);
        assert_eq!(file.get::<String>(GLOBAL_SECTION, "Techniques").as_deref(), Some("Bloom"));
        assert_eq!(file.get::<Vec<i64>>(GLOBAL_SECTION, "Count"), Some(vec![3]));
        assert_eq!(file.get::<Vec<i64>>(GLOBAL_SECTION, "Techniques"), None);
    }

    #[test]
    fn unreadable_document_refuses_to_save() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.ini");
        let mut file = ConfigFile::unreadable(&path);
        file.set(GLOBAL_SECTION, "Techniques", &["Bloom"]).unwrap();
        assert!(matches!(file.save(), Err(ConfigError::ReadOnly { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn integers_read_as_floats() {
        let file = sample();
        let mut values = [0.0f32; 1];
        file.get_into("Bloom.fx", "Passes", &mut values);
        assert_eq!(values[0], 3.0);
    }

    #[test]
    fn wrong_type_reads_as_none() {
        let file = sample();
        assert_eq!(file.get::<bool>(GLOBAL_SECTION, "Techniques"), None);
    }

    #[test]
    fn duration_accepts_strings_and_millis() {
        let mut file = sample();
        assert_eq!(
            file.get_duration("INPUT", "PresetTransitionDelay"),
            Some(Duration::from_millis(1500))
        );
        file.set_duration("INPUT", "PresetTransitionDelay", Duration::from_millis(250))
            .unwrap();
        assert_eq!(
            file.get_duration("INPUT", "PresetTransitionDelay"),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn unchanged_set_does_not_mark_modified() {
        let mut file = sample();
        file.set(GLOBAL_SECTION, "Techniques", &vec!["Bloom", "Vignette"])
            .unwrap();
        assert!(!file.is_modified());
        file.set(GLOBAL_SECTION, "Techniques", &vec!["Bloom"]).unwrap();
        assert!(file.is_modified());
    }

    #[test]
    fn rendered_document_parses_back() {
        let mut file = ConfigFile::new("out.ini");
        file.set("Tonemap.fx", "Gamma", &[2.2f32]).unwrap();
        file.set(GLOBAL_SECTION, "Techniques", &["Tonemap"]).unwrap();
        let rendered = file.to_toml_string().unwrap();

        let parsed = ConfigFile::from_toml_str("out.ini", &rendered).unwrap();
        let gamma: Vec<f32> = parsed.get("Tonemap.fx", "Gamma").unwrap();
        assert_eq!(gamma, vec![2.2f32]);
        let techniques: Vec<String> = parsed.get(GLOBAL_SECTION, "Techniques").unwrap();
        assert_eq!(techniques, vec!["Tonemap"]);
    }

    #[test]
    fn save_writes_and_clears_modified() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preset.ini");
        let mut file = ConfigFile::load(&path).unwrap();
        file.set(GLOBAL_SECTION, "Techniques", &["Bloom"]).unwrap();
        file.save().unwrap();
        assert!(!file.is_modified());

        let reloaded = ConfigFile::load(&path).unwrap();
        assert!(reloaded.has(GLOBAL_SECTION, "Techniques"));
    }

    #[test]
    fn rejects_malformed_document() {
        let err = ConfigFile::from_toml_str("bad.ini", "Techniques = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
