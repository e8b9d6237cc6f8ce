//! Distribution manifest (META.json / META.yml) normalization
//!
//! CPAN::Meta spec v2 nests prerequisites under `prereqs.<phase>.<relation>`;
//! v1.x (most META.yml files) uses flat `requires` / `build_requires` /
//! `configure_requires` keys. Each field is read through an ordered list of
//! key paths and the first present, non-null value wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::manifest::version_string;

/// Top-level `version:` scalar of a META.yml, as written
static YAML_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^version:[ \t]*['"]?([^'"\s#]+)"#).expect("static regex is valid")
});

/// A key path into the manifest document
type KeyPath = &'static [&'static str];

/// Ordered alternatives for one manifest field
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub field: &'static str,
    pub paths: &'static [KeyPath],
}

pub const VERSION: Rule = Rule {
    field: "version",
    paths: &[&["version"]],
};

pub const RUNTIME_REQUIRES: Rule = Rule {
    field: "requires",
    paths: &[&["requires"], &["prereqs", "runtime", "requires"]],
};

pub const BUILD_REQUIRES: Rule = Rule {
    field: "build_requires",
    paths: &[&["prereqs", "build", "requires"], &["build_requires"]],
};

pub const CONFIGURE_REQUIRES: Rule = Rule {
    field: "configure_requires",
    paths: &[&["prereqs", "configure", "requires"], &["configure_requires"]],
};

pub const CONFLICTS: Rule = Rule {
    field: "conflicts",
    paths: &[&["conflicts"], &["prereqs", "runtime", "conflicts"]],
};

pub const DYNAMIC_CONFIG: Rule = Rule {
    field: "dynamic_config",
    paths: &[&["dynamic_config"]],
};

impl Rule {
    /// First present, non-null value along the rule's key paths
    pub fn apply<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.paths.iter().find_map(|path| {
            let mut node = doc;
            for key in path.iter() {
                node = node.get(*key)?;
            }
            (!node.is_null()).then_some(node)
        })
    }
}

/// Manifest fields the resolver cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistManifest {
    pub version: Option<String>,
    pub requires: BTreeMap<String, String>,
    pub build_requires: BTreeMap<String, String>,
    pub configure_requires: BTreeMap<String, String>,
    pub conflicts: BTreeMap<String, String>,
    pub dynamic_config: bool,
}

impl DistManifest {
    /// Normalize a decoded META document.
    ///
    /// Only a string `version` is taken. A number has already lost its
    /// trailing zeros (`1.10` reads as `1.1`), which changes how it compares
    /// against core versions.
    pub fn from_value(doc: &Value) -> Self {
        Self {
            version: VERSION.apply(doc).and_then(Value::as_str).map(str::to_string),
            requires: RUNTIME_REQUIRES.apply(doc).map(dependency_map).unwrap_or_default(),
            build_requires: BUILD_REQUIRES.apply(doc).map(dependency_map).unwrap_or_default(),
            configure_requires: CONFIGURE_REQUIRES
                .apply(doc)
                .map(dependency_map)
                .unwrap_or_default(),
            conflicts: CONFLICTS.apply(doc).map(dependency_map).unwrap_or_default(),
            dynamic_config: DYNAMIC_CONFIG.apply(doc).map(truthy).unwrap_or(false),
        }
    }

    /// Decode META.json text
    pub fn from_json(text: &str) -> Result<Self, String> {
        let doc: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        Self::from_document(doc)
    }

    /// Decode META.yml text.
    ///
    /// Unquoted versions are common in v1.x files; their text is taken from
    /// the source rather than the parsed number.
    pub fn from_yaml(text: &str) -> Result<Self, String> {
        let doc: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        let numeric_version = VERSION.apply(&doc).is_some_and(Value::is_number);
        let mut manifest = Self::from_document(doc)?;
        if numeric_version {
            manifest.version = YAML_VERSION
                .captures(text)
                .map(|caps| caps[1].to_string());
        }
        Ok(manifest)
    }

    fn from_document(doc: Value) -> Result<Self, String> {
        match doc.as_object() {
            Some(map) if !map.is_empty() => Ok(Self::from_value(&doc)),
            Some(_) => Err("empty manifest".to_string()),
            None => Err("manifest is not a mapping".to_string()),
        }
    }

    /// Build and configure requirements merged; configure wins on conflict
    pub fn build_and_configure(&self) -> BTreeMap<String, String> {
        let mut merged = self.build_requires.clone();
        merged.extend(
            self.configure_requires
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged
    }
}

/// `{name: constraint}` or `[name, ...]` -> name -> constraint
fn dependency_map(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, spec)| (name.clone(), version_string(spec).unwrap_or_else(|| "0".into())))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|name| (name.to_string(), "0".to_string()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
