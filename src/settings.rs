use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregator::WeightPolicy;
use crate::error::{MapasError, Result};
use crate::fmt;
use crate::layout::Geometry;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_dir: String,
    pub output_dir: String,
    pub classification_rules: String,
    pub conversion_rules: String,
    pub company_name: String,
    pub report_title: String,
    /// Image drawn in the page header. Without one the company name is framed instead.
    pub logo_path: Option<String>,
    /// City → driver for customers billed individually.
    pub individual_operators: BTreeMap<String, String>,
    /// City → driver for the consolidated city map.
    pub consolidated_operators: BTreeMap<String, String>,
    pub weight_policy: WeightPolicy,
    pub geometry: Geometry,
}

fn operators(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(city, name)| (city.to_string(), name.to_string()))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: "xml_entrada".to_string(),
            output_dir: "mapas_pdf".to_string(),
            classification_rules: "regras/clientes_individuais.xlsx".to_string(),
            conversion_rules: "regras/conversao_embalagens.xlsx".to_string(),
            company_name: "FRIOVEL".to_string(),
            report_title: "MAPA DE SEPARAÇÃO DE PRODUTOS".to_string(),
            logo_path: None,
            individual_operators: operators(&[
                ("PATO BRANCO", "Iloi"),
                ("FRANCISCO BELTRAO", "Josué"),
            ]),
            consolidated_operators: operators(&[
                ("PATO BRANCO", "Rogerio"),
                ("FRANCISCO BELTRAO", "José Dirceu"),
            ]),
            weight_policy: WeightPolicy::default(),
            geometry: Geometry::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mapas")
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Load settings from `path`, or from the default location. A missing
/// default file yields defaults; a missing explicit file is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_settings_path(), false),
    };
    if !path.exists() {
        if explicit {
            return Err(MapasError::Settings(format!(
                "settings file not found: {}",
                path.display()
            )));
        }
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| MapasError::Settings(format!("{}: {e}", path.display())))
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| MapasError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> PathBuf {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return PathBuf::from(path.replacen('~', &home.to_string_lossy(), 1));
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Operator labels
// ---------------------------------------------------------------------------

/// Driver labels keyed by normalized city. Unmapped cities resolve to "".
#[derive(Debug, Clone, Default)]
pub struct OperatorDirectory {
    individual: BTreeMap<String, String>,
    consolidated: BTreeMap<String, String>,
}

impl OperatorDirectory {
    pub fn new(
        individual: &BTreeMap<String, String>,
        consolidated: &BTreeMap<String, String>,
    ) -> Self {
        let normalize = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(city, name)| (fmt::city(city), name.trim().to_string()))
                .collect()
        };
        Self {
            individual: normalize(individual),
            consolidated: normalize(consolidated),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.individual_operators, &settings.consolidated_operators)
    }

    pub fn individual(&self, city: &str) -> &str {
        self.individual
            .get(&fmt::city(city))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn consolidated(&self, city: &str) -> &str {
        self.consolidated
            .get(&fmt::city(city))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.input_dir = "/tmp/notas".to_string();
        settings.weight_policy = WeightPolicy::PerLineItem;
        save_settings(&settings, &path).unwrap();
        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.input_dir, "/tmp/notas");
        assert_eq!(loaded.weight_policy, WeightPolicy::PerLineItem);
        assert_eq!(loaded.geometry, Geometry::default());
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let json = r#"{"output_dir": "saida", "weight_policy": "per_line_item", "geometry": {"margin_bottom": 25.0}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.output_dir, "saida");
        assert_eq!(s.input_dir, "xml_entrada");
        assert_eq!(s.weight_policy, WeightPolicy::PerLineItem);
        assert_eq!(s.geometry.margin_bottom, 25.0);
        assert_eq!(s.geometry.page_width, 210.0);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("none.json"))).unwrap_err();
        assert!(matches!(err, MapasError::Settings(_)));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn test_operator_lookup_normalizes_city() {
        let ops = OperatorDirectory::from_settings(&Settings::default());
        assert_eq!(ops.individual("Pato Branco"), "Iloi");
        assert_eq!(ops.consolidated("Francisco Beltrão"), "José Dirceu");
        assert_eq!(ops.individual("CURITIBA"), "");
        assert_eq!(ops.consolidated(""), "");
    }

    #[test]
    fn test_shellexpand_home() {
        let expanded = shellexpand_path("~/mapas");
        if dirs::home_dir().is_some() {
            assert!(!expanded.to_string_lossy().starts_with('~'));
        }
        assert_eq!(shellexpand_path("relativo/x"), PathBuf::from("relativo/x"));
    }
}
