use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::aggregator::{Aggregator, Classification};
use crate::cli::RuleFiles;
use crate::error::{MapasError, Result};
use crate::extractor::extract_file;
use crate::fmt;
use crate::rules::RuleTable;
use crate::settings::{OperatorDirectory, Settings};

pub fn run(settings: &Settings, file: &str, rule_files: &RuleFiles) -> Result<()> {
    let record = extract_file(&PathBuf::from(file))?;

    let rules = match rule_files.load(settings) {
        Ok(rules) => rules,
        Err(MapasError::MissingRules(path)) => {
            println!("{} {path}", "No classification rules at".yellow());
            RuleTable::new()
        }
        Err(e) => return Err(e),
    };
    let operators = OperatorDirectory::from_settings(settings);
    let class = Aggregator::new(&rules, settings.weight_policy)
        .classify(&record.city, &record.customer.tax_id);

    let (label, operator) = match class {
        Classification::Individual => ("individual".cyan(), operators.individual(&record.city)),
        Classification::Consolidated => ("consolidado".yellow(), operators.consolidated(&record.city)),
    };

    println!("{}", record.source.bold());
    println!("Cliente:    {}", record.customer.name);
    println!("CNPJ/CPF:   {}", record.customer.tax_id);
    println!("Endereço:   {}", record.customer.address.formatted());
    println!("Cidade:     {}", record.city);
    println!("Mapa:       {label}");
    println!("Motorista:  {operator}");
    println!(
        "Peso:       {} líquido / {} bruto",
        fmt::weight(record.net_weight),
        fmt::weight(record.gross_weight)
    );

    let mut table = Table::new();
    table.set_header(vec!["Código", "Produto", "Qtd", "Mapa"]);
    for item in &record.items {
        let qty = rules.format_quantity(&item.product_code, item.quantity);
        table.add_row(vec![
            Cell::new(&item.product_code),
            Cell::new(&item.product_name),
            Cell::new(item.quantity),
            Cell::new(qty.text),
        ]);
    }
    println!("{table}");
    Ok(())
}
