use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{MapasError, Result};
use crate::fmt::{self, QuantityDisplay};
use crate::models::ConversionRule;

// ---------------------------------------------------------------------------
// Tabular input
// ---------------------------------------------------------------------------

/// A header row plus string cells, read from the first worksheet of a
/// spreadsheet or from a CSV file.
#[derive(Debug, Default)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn header_key(raw: &str) -> String {
    fmt::city(&raw.replace('_', " ")).replace(' ', "_")
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: headers.iter().map(|h| header_key(h)).collect(),
            rows,
        }
    }

    /// Index of the first column whose header matches one of `names`.
    fn column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| {
            let key = header_key(name);
            self.headers.iter().position(|h| *h == key)
        })
    }

    fn require(&self, names: &[&str], source: &str) -> Result<usize> {
        self.column(names).ok_or_else(|| {
            MapasError::RuleTable(format!("{source}: missing column {}", names[0]))
        })
    }

    fn cell<'a>(row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(|s| s.trim()).unwrap_or("")
    }
}

pub fn read_sheet(path: &Path) -> Result<Sheet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        #[cfg(feature = "xlsx")]
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path),
        _ => Err(MapasError::UnsupportedFormat(path.display().to_string())),
    }
}

fn read_csv(path: &Path) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(Sheet::new(headers, rows))
}

#[cfg(feature = "xlsx")]
fn read_workbook(path: &Path) -> Result<Sheet> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| MapasError::RuleTable(format!("Failed to open {}: {e}", path.display())))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MapasError::RuleTable(format!("{}: no worksheets", path.display())))?
        .map_err(|e| MapasError::RuleTable(format!("{}: {e}", path.display())))?;

    let cell_text = |cell: &Data| -> String {
        match cell {
            Data::String(s) => s.clone(),
            // Numeric CNPJ and code columns come back as floats
            Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            Data::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    };

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(row) => row.iter().map(cell_text).collect(),
        None => Vec::new(),
    };
    let rows = rows.map(|row| row.iter().map(cell_text).collect()).collect();
    Ok(Sheet::new(headers, rows))
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Classification and package-conversion lookups. Built once, then shared
/// read-only by the aggregator and the layout engine.
#[derive(Debug, Default, Clone)]
pub struct RuleTable {
    individual: BTreeSet<(String, String)>,
    conversions: BTreeMap<String, ConversionRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both rule files. The classification file is required; a missing
    /// conversion file means "no conversions".
    pub fn load(classification: &Path, conversions: Option<&Path>) -> Result<Self> {
        if !classification.exists() {
            return Err(MapasError::MissingRules(classification.display().to_string()));
        }
        let mut table = Self::new();
        let source = classification.display().to_string();
        table.add_classification_sheet(&read_sheet(classification)?, &source)?;
        info!(path = %source, rules = table.individual.len(), "loaded classification rules");

        match conversions {
            Some(path) if path.exists() => {
                let source = path.display().to_string();
                table.add_conversion_sheet(&read_sheet(path)?, &source)?;
                info!(path = %source, rules = table.conversions.len(), "loaded conversion rules");
            }
            Some(path) => {
                info!(path = %path.display(), "no conversion rules file, reporting raw units");
            }
            None => {}
        }
        Ok(table)
    }

    pub fn add_individual(&mut self, city: &str, tax_id: &str) {
        self.individual.insert((fmt::city(city), fmt::padded_tax_id(tax_id)));
    }

    pub fn add_conversion(&mut self, rule: ConversionRule) {
        self.conversions.insert(rule.product_code.clone(), rule);
    }

    pub fn add_classification_sheet(&mut self, sheet: &Sheet, source: &str) -> Result<()> {
        let city_col = sheet.require(&["Cidade", "City"], source)?;
        let id_col = sheet.require(&["CNPJ", "CPF", "Taxpayer_Id"], source)?;
        for row in &sheet.rows {
            let city = Sheet::cell(row, city_col);
            let id = Sheet::cell(row, id_col);
            if city.is_empty() || fmt::tax_id(id).is_empty() {
                debug!(source, "skipping incomplete classification row");
                continue;
            }
            self.add_individual(city, id);
        }
        Ok(())
    }

    pub fn add_conversion_sheet(&mut self, sheet: &Sheet, source: &str) -> Result<()> {
        let code_col = sheet.require(&["Codigo", "Code"], source)?;
        let label_col = sheet.require(&["Tipo", "Unit"], source)?;
        let per_col = sheet.require(&["Un_por_embalagem", "Units_per_package"], source)?;
        for row in &sheet.rows {
            let code = Sheet::cell(row, code_col);
            let label = Sheet::cell(row, label_col);
            let per_raw = Sheet::cell(row, per_col);
            if code.is_empty() {
                continue;
            }
            let per = match per_raw.replace(',', ".").parse::<f64>() {
                Ok(v) if v >= 1.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) => v as u32,
                _ => {
                    warn!(source, code, value = per_raw, "skipping conversion with invalid units per package");
                    continue;
                }
            };
            self.add_conversion(ConversionRule {
                product_code: code.to_string(),
                unit_label: label.to_uppercase(),
                units_per_package: per,
            });
        }
        Ok(())
    }

    /// Exact match on the normalized (city, taxpayer id) pair.
    pub fn is_individual(&self, city: &str, tax_id: &str) -> bool {
        self.individual
            .contains(&(fmt::city(city), fmt::padded_tax_id(tax_id)))
    }

    pub fn conversion(&self, product_code: &str) -> Option<&ConversionRule> {
        self.conversions.get(product_code.trim())
    }

    pub fn format_quantity(&self, product_code: &str, total_units: f64) -> QuantityDisplay {
        fmt::quantity(total_units, self.conversion(product_code))
    }

    pub fn individual_rules(&self) -> impl Iterator<Item = &(String, String)> {
        self.individual.iter()
    }

    pub fn conversion_rules(&self) -> impl Iterator<Item = &ConversionRule> {
        self.conversions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_classification_csv() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write(
            dir.path(),
            "clientes.csv",
            "Cidade,CNPJ\npato branco ,12.345.678/0001-90\nFrancisco Beltrão,98765432000100\n,123\n",
        );
        let table = RuleTable::load(&rules, None).unwrap();
        assert!(table.is_individual("PATO BRANCO", "12345678000190"));
        assert!(table.is_individual("Francisco Beltrao", "98.765.432/0001-00"));
        assert!(!table.is_individual("PATO BRANCO", "98765432000100"));
        assert_eq!(table.individual_rules().count(), 2);
    }

    #[test]
    fn test_tax_id_without_leading_zero_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write(
            dir.path(),
            "clientes.csv",
            "Cidade,CNPJ\nPATO BRANCO,1111111000111\nPATO BRANCO,123456789\n",
        );
        let table = RuleTable::load(&rules, None).unwrap();
        assert!(table.is_individual("PATO BRANCO", "01.111.111/0001-11"));
        assert!(table.is_individual("PATO BRANCO", "01111111000111"));
        assert!(table.is_individual("PATO BRANCO", "001.234.567-89"));
        assert!(!table.is_individual("PATO BRANCO", "11111110001110"));
    }

    #[test]
    fn test_missing_classification_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuleTable::load(&dir.path().join("nope.xlsx"), None).unwrap_err();
        assert!(matches!(err, MapasError::MissingRules(_)));
    }

    #[test]
    fn test_missing_conversion_file_means_no_conversions() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write(dir.path(), "c.csv", "City,CNPJ\nPATO BRANCO,1\n");
        let missing = dir.path().join("conversao.csv");
        let table = RuleTable::load(&rules, Some(&missing)).unwrap();
        assert_eq!(table.conversion_rules().count(), 0);
        assert_eq!(table.format_quantity("A1", 30.0).text, "30 UN");
    }

    #[test]
    fn test_load_conversions_csv() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write(dir.path(), "c.csv", "Cidade,CNPJ\n");
        let conv = write(
            dir.path(),
            "conv.csv",
            "Codigo,Tipo,Un_por_embalagem\nA1,cx,12\nB2,FD,6.0\nC3,CX,0\nD4,CX,abc\n",
        );
        let table = RuleTable::load(&rules, Some(&conv)).unwrap();
        assert_eq!(table.conversion_rules().count(), 2);
        let a1 = table.conversion("A1").unwrap();
        assert_eq!(a1.unit_label, "CX");
        assert_eq!(a1.units_per_package, 12);
        assert_eq!(table.format_quantity("A1", 30.0).text, "2 CX + 6 UN");
        assert_eq!(table.format_quantity("B2", 12.0).text, "2 FD");
        assert!(table.conversion("C3").is_none());
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write(dir.path(), "c.csv", "Cidade,Nome\nX,Y\n");
        let err = RuleTable::load(&rules, None).unwrap_err();
        assert!(err.to_string().contains("CNPJ"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write(dir.path(), "c.txt", "Cidade,CNPJ\n");
        let err = RuleTable::load(&rules, None).unwrap_err();
        assert!(matches!(err, MapasError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_header_matching_ignores_case_and_accents() {
        let sheet = Sheet::new(
            vec!["CÓDIGO".to_string(), "tipo".to_string(), "Un por embalagem".to_string()],
            vec![vec!["A1".to_string(), "CX".to_string(), "12".to_string()]],
        );
        let mut table = RuleTable::new();
        table.add_conversion_sheet(&sheet, "test").unwrap();
        assert_eq!(table.conversion("A1").unwrap().units_per_package, 12);
    }
}
