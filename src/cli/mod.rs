pub mod generate;
pub mod init;
pub mod inspect;
pub mod rules;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::layout::ReportHeader;
use crate::rules::RuleTable;
use crate::settings::{shellexpand_path, Settings};

#[derive(Parser)]
#[command(name = "mapas", about = "Generate picking-map PDFs from NF-e invoice XML files.")]
pub struct Cli {
    /// Settings file (default: ~/.config/mapas/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read every invoice in the input directory and write one PDF per map.
    Generate {
        /// Directory containing NF-e XML files
        #[arg(long)]
        input: Option<String>,
        /// Directory for the generated PDFs (created if missing)
        #[arg(long)]
        output: Option<String>,
        #[command(flatten)]
        rules: RuleFiles,
        /// Lay out the maps but do not write any file
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// List the loaded classification and conversion rules.
    Rules {
        #[command(flatten)]
        rules: RuleFiles,
    },
    /// Show what one invoice file contributes and how it is classified.
    Inspect {
        /// Path to an NF-e XML file
        file: String,
        #[command(flatten)]
        rules: RuleFiles,
    },
    /// Write a settings file with the default values.
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct RuleFiles {
    /// Individual-customer rules (xlsx/ods/csv with Cidade, CNPJ columns)
    #[arg(long = "rules")]
    pub classification: Option<String>,
    /// Package conversions (xlsx/ods/csv with Codigo, Tipo, Un_por_embalagem)
    #[arg(long)]
    pub conversions: Option<String>,
}

impl RuleFiles {
    pub fn classification_path(&self, settings: &Settings) -> PathBuf {
        shellexpand_path(
            self.classification
                .as_deref()
                .unwrap_or(&settings.classification_rules),
        )
    }

    pub fn conversion_path(&self, settings: &Settings) -> PathBuf {
        shellexpand_path(
            self.conversions
                .as_deref()
                .unwrap_or(&settings.conversion_rules),
        )
    }

    pub fn load(&self, settings: &Settings) -> Result<RuleTable> {
        let conversions = self.conversion_path(settings);
        RuleTable::load(
            &self.classification_path(settings),
            Some(conversions.as_path()),
        )
    }
}

pub(crate) fn report_header(settings: &Settings) -> ReportHeader {
    ReportHeader {
        company: settings.company_name.clone(),
        title: settings.report_title.clone(),
        date: chrono::Local::now().format("%d/%m/%Y").to_string(),
    }
}

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}
