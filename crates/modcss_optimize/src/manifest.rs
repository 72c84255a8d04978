//! On-disk form of the stylesheet compiler's output.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::stylesheet::{ExportMap, RuleTree};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub stylesheets: Vec<StylesheetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylesheetEntry {
    /// Stylesheet path, relative to the project root
    pub path: PathBuf,
    #[serde(default)]
    pub exports: ExportMap,
    #[serde(default)]
    pub rules: RuleTree,
    /// Loader prefix of the extraction pass that also compiled this stylesheet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_loader: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        debug!("Loaded {} stylesheets from {}", manifest.stylesheets.len(), path.display());
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text + "\n")
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::Rule;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"{
  "stylesheets": [
    {
      "path": "src/button.module.css",
      "exports": { "btn": "a1b2", "card": "c3d4" },
      "rules": [
        { "type": "style", "selector": ".a1b2", "declarations": ["color: red"] },
        { "type": "style", "selector": ".c3d4", "declarations": ["padding: 0"] }
      ],
      "extract_loader": "mini-css-extract"
    },
    { "path": "src/empty.css" }
  ]
}"#;

    #[test]
    fn test_load_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("css-modules.json");
        fs::write(&path, MANIFEST).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.stylesheets.len(), 2);
        let button = &manifest.stylesheets[0];
        assert_eq!(button.exports.keys().collect::<Vec<_>>(), vec!["btn", "card"]);
        assert_eq!(button.rules.rules[1], Rule::style(".c3d4", &["padding: 0"]));
        assert_eq!(button.extract_loader.as_deref(), Some("mini-css-extract"));

        let empty = &manifest.stylesheets[1];
        assert!(empty.exports.is_empty() && empty.rules.is_empty());
        assert_eq!(empty.extract_loader, None);
    }

    #[test]
    fn test_save_then_load_keeps_order() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in.json");
        fs::write(&src, MANIFEST).unwrap();
        let manifest = Manifest::load(&src).unwrap();

        let out = temp_dir.path().join("out").join("css-modules.json");
        manifest.save(&out).unwrap();
        assert_eq!(Manifest::load(&out).unwrap(), manifest);
        assert!(!fs::read_to_string(&out).unwrap().contains("\"extract_loader\": null"));
    }

    #[test]
    fn test_load_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
        assert!(Manifest::load(&temp_dir.path().join("missing.json")).is_err());
    }
}
