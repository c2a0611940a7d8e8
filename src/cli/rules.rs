use comfy_table::{Cell, Table};

use crate::cli::{display, RuleFiles};
use crate::error::Result;
use crate::settings::Settings;

pub fn list(settings: &Settings, rule_files: &RuleFiles) -> Result<()> {
    let rules = rule_files.load(settings)?;

    let mut table = Table::new();
    table.set_header(vec!["Cidade", "CNPJ/CPF"]);
    for (city, tax_id) in rules.individual_rules() {
        table.add_row(vec![Cell::new(city), Cell::new(tax_id)]);
    }
    println!(
        "Individual customers ({})\n{table}",
        display(&rule_files.classification_path(settings))
    );

    let conversions: Vec<_> = rules.conversion_rules().collect();
    if conversions.is_empty() {
        println!("No package conversions, quantities are reported in units.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Código", "Embalagem", "Unidades"]);
    for rule in conversions {
        table.add_row(vec![
            Cell::new(&rule.product_code),
            Cell::new(&rule.unit_label),
            Cell::new(rule.units_per_package),
        ]);
    }
    println!(
        "Package conversions ({})\n{table}",
        display(&rule_files.conversion_path(settings))
    );
    Ok(())
}
