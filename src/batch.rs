use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, info_span};

use crate::aggregator::{Aggregator, WeightPolicy};
use crate::error::Result;
use crate::extractor::extract_file;
use crate::layout::{Geometry, LayoutEngine, ReportHeader};
use crate::pdf::{self, Logo};
use crate::rules::RuleTable;
use crate::settings::OperatorDirectory;

const CONSOLIDATED_MARKER: &str = "CONSOLIDADO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Individual,
    Consolidated,
}

/// One rendered (or, on a dry run, laid-out) picking map.
#[derive(Debug, Clone)]
pub struct ReportFile {
    pub kind: ReportKind,
    pub city: String,
    pub operator: String,
    pub customer: Option<String>,
    pub path: PathBuf,
    pub pages: usize,
    pub products: usize,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub documents: usize,
    pub reports: Vec<ReportFile>,
}

pub struct BatchOptions<'a> {
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    pub weight_policy: WeightPolicy,
    pub logo: Option<&'a Logo>,
    pub dry_run: bool,
}

/// Every `*.xml` file (any case) directly inside `dir`, sorted by name.
pub fn scan_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_xml = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("xml"));
        if is_xml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("valid regex"))
}

/// `{city}_{operator}_{suffix}.pdf` with spaces turned into underscores.
pub fn report_file_name(city: &str, operator: &str, suffix: &str) -> String {
    let raw = format!("{city}_{operator}_{suffix}.pdf").replace(' ', "_");
    unsafe_chars().replace_all(&raw, "-").into_owned()
}

/// Parse every document, fold them all, then lay out and write one PDF per
/// bucket. Any failing document aborts the batch.
pub fn run(
    rules: &RuleTable,
    operators: &OperatorDirectory,
    geometry: &Geometry,
    header: &ReportHeader,
    options: &BatchOptions,
) -> Result<BatchSummary> {
    let files = scan_documents(options.input_dir)?;
    info!(dir = %options.input_dir.display(), files = files.len(), "scanning invoices");

    let mut aggregator = Aggregator::new(rules, options.weight_policy);
    for path in &files {
        let _span = info_span!("invoice", file = %path.display()).entered();
        let record = extract_file(path)?;
        let class = aggregator.accumulate(&record);
        info!(?class, items = record.items.len(), "folded");
    }

    if !options.dry_run {
        std::fs::create_dir_all(options.output_dir)?;
    }

    let engine = LayoutEngine::new(geometry, rules, header);
    let mut summary = BatchSummary {
        documents: aggregator.documents_folded(),
        reports: Vec::new(),
    };

    for bucket in aggregator.customer_buckets() {
        let operator = operators.individual(&bucket.city);
        let pages = engine.layout(&bucket.city, &bucket.tally, operator, Some(&bucket.identity));
        let name = report_file_name(&bucket.city, operator, &bucket.identity.name);
        let path = options.output_dir.join(name);
        write_report(&pages, &path, geometry, header, options)?;
        summary.reports.push(ReportFile {
            kind: ReportKind::Individual,
            city: bucket.city.clone(),
            operator: operator.to_string(),
            customer: Some(bucket.identity.name.clone()),
            path,
            pages: pages.len(),
            products: bucket.tally.products.len(),
        });
    }

    for bucket in aggregator.city_buckets() {
        let operator = operators.consolidated(&bucket.city);
        let pages = engine.layout(&bucket.city, &bucket.tally, operator, None);
        let name = report_file_name(&bucket.city, operator, CONSOLIDATED_MARKER);
        let path = options.output_dir.join(name);
        write_report(&pages, &path, geometry, header, options)?;
        summary.reports.push(ReportFile {
            kind: ReportKind::Consolidated,
            city: bucket.city.clone(),
            operator: operator.to_string(),
            customer: None,
            path,
            pages: pages.len(),
            products: bucket.tally.products.len(),
        });
    }

    Ok(summary)
}

fn write_report(
    pages: &[crate::layout::Page],
    path: &Path,
    geometry: &Geometry,
    header: &ReportHeader,
    options: &BatchOptions,
) -> Result<()> {
    if options.dry_run {
        info!(path = %path.display(), pages = pages.len(), "dry run, not writing");
        return Ok(());
    }
    let bytes = pdf::render(pages, &header.title, geometry, options.logo)?;
    std::fs::write(path, bytes)?;
    info!(path = %path.display(), pages = pages.len(), "wrote report");
    Ok(())
}
