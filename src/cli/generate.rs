use colored::Colorize;
use comfy_table::{Cell, Table};
use tracing::warn;

use crate::batch::{self, BatchOptions, ReportKind};
use crate::cli::{display, report_header, RuleFiles};
use crate::error::Result;
use crate::pdf::Logo;
use crate::settings::{shellexpand_path, OperatorDirectory, Settings};

pub fn run(
    settings: &Settings,
    input: Option<&str>,
    output: Option<&str>,
    rule_files: &RuleFiles,
    dry_run: bool,
) -> Result<()> {
    let input_dir = shellexpand_path(input.unwrap_or(&settings.input_dir));
    let output_dir = shellexpand_path(output.unwrap_or(&settings.output_dir));

    let rules = rule_files.load(settings)?;
    let operators = OperatorDirectory::from_settings(settings);
    let header = report_header(settings);
    let logo = load_logo(settings);

    let options = BatchOptions {
        input_dir: &input_dir,
        output_dir: &output_dir,
        weight_policy: settings.weight_policy,
        logo: logo.as_ref(),
        dry_run,
    };
    let summary = batch::run(&rules, &operators, &settings.geometry, &header, &options)?;

    let mut table = Table::new();
    table.set_header(vec!["Mapa", "Cidade", "Motorista", "Cliente", "Produtos", "Páginas", "Arquivo"]);
    for report in &summary.reports {
        let kind = match report.kind {
            ReportKind::Individual => "individual".cyan(),
            ReportKind::Consolidated => "consolidado".yellow(),
        };
        let file = report
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(&report.city),
            Cell::new(&report.operator),
            Cell::new(report.customer.as_deref().unwrap_or("")),
            Cell::new(report.products),
            Cell::new(report.pages),
            Cell::new(file),
        ]);
    }
    println!("{table}");

    let verb = if dry_run { "Would write" } else { "Wrote" };
    println!(
        "{} {} maps from {} invoices to {}",
        verb,
        summary.reports.len().to_string().green().bold(),
        summary.documents,
        display(&output_dir)
    );
    Ok(())
}

/// An unreadable logo falls back to the framed company name.
fn load_logo(settings: &Settings) -> Option<Logo> {
    let path = shellexpand_path(settings.logo_path.as_deref()?);
    match Logo::load(&path) {
        Ok(logo) => Some(logo),
        Err(e) => {
            warn!(error = %e, "logo not loaded, using placeholder");
            None
        }
    }
}
