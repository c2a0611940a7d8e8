use serde::{Deserialize, Serialize};
use textwrap::{Options, WordSeparator, WordSplitter, WrapAlgorithm};

use crate::aggregator::Tally;
use crate::fmt;
use crate::models::CustomerIdentity;
use crate::rules::RuleTable;

const PT_TO_MM: f32 = 0.3528;
const TOTAL_PACKAGE_LABEL: &str = "CX";

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Page geometry in millimetres, measured from the top-left corner. Font
/// sizes are in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,

    pub logo_x: f32,
    pub logo_top: f32,
    pub logo_width: f32,
    pub logo_height: f32,
    pub title_y: f32,
    pub header_line_gap: f32,
    /// First usable y below the repeated header block.
    pub header_height: f32,
    pub identity_line_gap: f32,
    pub identity_bottom_gap: f32,

    pub table_header_height: f32,
    pub cell_padding_x: f32,
    pub product_col_width: f32,
    pub checkbox_col_width: f32,
    pub checkbox_size: f32,
    pub line_height: f32,
    pub row_padding: f32,
    pub min_row_height: f32,
    pub row_gap: f32,

    pub footer_block_height: f32,
    /// The totals block never ends closer than this to the bottom edge.
    pub footer_min_bottom: f32,
    pub page_number_offset: f32,

    pub font_size: f32,
    pub title_size: f32,
    pub small_size: f32,
    /// Average glyph width as a fraction of the font size (mm per pt).
    pub char_width_factor: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        // A4
        Self {
            page_width: 210.0,
            page_height: 297.0,
            margin_left: 20.0,
            margin_right: 20.0,
            margin_bottom: 30.0,

            logo_x: 12.0,
            logo_top: 10.0,
            logo_width: 60.0,
            logo_height: 30.0,
            title_y: 50.0,
            header_line_gap: 7.0,
            header_height: 82.0,
            identity_line_gap: 7.0,
            identity_bottom_gap: 5.0,

            table_header_height: 9.0,
            cell_padding_x: 2.0,
            product_col_width: 122.0,
            checkbox_col_width: 16.0,
            checkbox_size: 4.0,
            line_height: 4.5,
            row_padding: 4.5,
            min_row_height: 9.0,
            row_gap: 1.5,

            footer_block_height: 38.0,
            footer_min_bottom: 18.0,
            page_number_offset: 12.0,

            font_size: 10.0,
            title_size: 14.0,
            small_size: 8.0,
            char_width_factor: 0.18,
        }
    }
}

impl Geometry {
    pub fn table_width(&self) -> f32 {
        self.page_width - self.margin_left - self.margin_right
    }

    /// Lowest y a table row may reach.
    pub fn usable_bottom(&self) -> f32 {
        self.page_height - self.margin_bottom
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * self.char_width_factor
    }

    pub fn block_height(&self, line_count: usize) -> f32 {
        (line_count as f32 * self.line_height + self.row_padding).max(self.min_row_height)
    }

    /// Top of the first row on a page without the customer block.
    pub fn first_row_top(&self) -> f32 {
        self.header_height + self.table_header_height + self.row_gap
    }

    fn product_x(&self) -> f32 {
        self.margin_left + self.cell_padding_x
    }

    fn checkbox_center(&self) -> f32 {
        self.margin_left + self.cell_padding_x + self.product_col_width + self.checkbox_col_width / 2.0
    }

    fn quantity_right(&self) -> f32 {
        self.page_width - self.margin_right - self.cell_padding_x
    }

    /// Baseline that vertically centres one line of text in a box.
    fn centred_baseline(&self, top: f32, height: f32, size: f32) -> f32 {
        top + height / 2.0 + size * PT_TO_MM / 3.0
    }
}

/// Greedy word wrap against the column width. Words are separated on ASCII
/// spaces and never split, so a single overlong word stays on its own line.
pub fn wrap_text(text: &str, width: f32, size: f32, geometry: &Geometry) -> Vec<String> {
    let per_char = size * geometry.char_width_factor;
    let max_chars = if per_char > 0.0 {
        (width / per_char).floor().max(1.0) as usize
    } else {
        usize::MAX
    };
    let options = Options::new(max_chars)
        .break_words(false)
        .word_separator(WordSeparator::AsciiSpace)
        .word_splitter(WordSplitter::NoHyphenation)
        .wrap_algorithm(WrapAlgorithm::FirstFit);
    textwrap::wrap(text, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// A positioned drawing primitive. `y` is a text baseline or a box's top edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        align: Align,
    },
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    HLine {
        x1: f32,
        x2: f32,
        y: f32,
    },
    /// The company logo, or a framed box with `label` when no image is set.
    Logo {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    pub elements: Vec<Element>,
}

impl Page {
    fn new(number: usize) -> Self {
        Self {
            number,
            elements: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    #[cfg(test)]
    pub fn count_text(&self, needle: &str) -> usize {
        self.texts().filter(|t| *t == needle).count()
    }

    #[cfg(test)]
    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().any(|t| t.contains(needle))
    }

    fn text(&mut self, text: impl Into<String>, x: f32, y: f32, size: f32, bold: bool, align: Align) {
        self.elements.push(Element::Text {
            text: text.into(),
            x,
            y,
            size,
            bold,
            align,
        });
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.elements.push(Element::Rect { x, y, width, height });
    }

    fn hline(&mut self, x1: f32, x2: f32, y: f32) {
        self.elements.push(Element::HLine { x1, x2, y });
    }
}

// ---------------------------------------------------------------------------
// Layout engine
// ---------------------------------------------------------------------------

/// Labels repeated in every page header.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub company: String,
    pub title: String,
    pub date: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PackageTotals {
    packages: u64,
    units: u64,
}

pub struct LayoutEngine<'a> {
    geometry: &'a Geometry,
    rules: &'a RuleTable,
    header: &'a ReportHeader,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(geometry: &'a Geometry, rules: &'a RuleTable, header: &'a ReportHeader) -> Self {
        Self {
            geometry,
            rules,
            header,
        }
    }

    /// Lay out one bucket. Consolidated buckets pass no customer.
    pub fn layout(
        &self,
        city: &str,
        tally: &Tally,
        operator: &str,
        customer: Option<&CustomerIdentity>,
    ) -> Vec<Page> {
        let g = self.geometry;
        let mut pages = Vec::new();

        let mut page = self.open_page(1, city, operator);
        let mut y = g.header_height;
        if let Some(identity) = customer {
            y = self.identity_block(&mut page, identity, y);
        }
        y = self.table_header(&mut page, y);

        let mut totals = PackageTotals::default();
        let mut rows_on_page = 0usize;

        // `products` is a BTreeMap, so this walks names in ascending order
        for item in tally.products.values() {
            let display = format!("{} - {}", item.product_code, item.product_name);
            let lines = wrap_text(&display, g.product_col_width, g.font_size, g);
            let block = g.block_height(lines.len());

            // A row taller than a fresh page is drawn where it stands
            let fits_fresh_page = g.usable_bottom() - g.first_row_top() >= block;
            if g.usable_bottom() - y < block && (rows_on_page > 0 || fits_fresh_page) {
                self.page_footer(&mut page);
                pages.push(page);
                page = self.open_page(pages.len() + 1, city, operator);
                y = self.table_header(&mut page, g.header_height);
                rows_on_page = 0;
            }

            let qty = self.rules.format_quantity(&item.product_code, item.quantity);
            totals.packages += qty.packages;
            totals.units += qty.units;

            self.place_row(&mut page, y, block, &lines, &qty.text);
            y += block + g.row_gap;
            rows_on_page += 1;
        }

        self.totals_block(&mut page, y, totals, tally);
        self.page_footer(&mut page);
        pages.push(page);
        pages
    }

    fn open_page(&self, number: usize, city: &str, operator: &str) -> Page {
        let g = self.geometry;
        let mut page = Page::new(number);
        page.elements.push(Element::Logo {
            x: g.logo_x,
            y: g.logo_top,
            width: g.logo_width,
            height: g.logo_height,
            label: self.header.company.clone(),
        });

        let mut y = g.title_y;
        page.text(&self.header.title, g.margin_left, y, g.title_size, true, Align::Left);
        y += g.header_line_gap + 3.0;
        page.text(format!("Cidade: {city}"), g.margin_left, y, g.font_size, false, Align::Left);
        y += g.header_line_gap;
        page.text(format!("Motorista: {operator}"), g.margin_left, y, g.font_size, false, Align::Left);
        y += g.header_line_gap;
        page.text(format!("Data: {}", self.header.date), g.margin_left, y, g.font_size, false, Align::Left);
        page.hline(g.margin_left, g.page_width - g.margin_right, g.header_height - 3.0);
        page
    }

    fn identity_block(&self, page: &mut Page, identity: &CustomerIdentity, mut y: f32) -> f32 {
        let g = self.geometry;
        y += g.identity_line_gap - 2.0;
        page.text(format!("Cliente: {}", identity.name), g.margin_left, y, g.font_size, true, Align::Left);
        y += g.identity_line_gap;
        page.text(format!("CNPJ/CPF: {}", identity.tax_id), g.margin_left, y, g.font_size, false, Align::Left);

        let address = format!("Endereço: {}", identity.address.formatted());
        for line in wrap_text(&address, g.table_width(), g.font_size, g) {
            y += g.identity_line_gap;
            page.text(line, g.margin_left, y, g.font_size, false, Align::Left);
        }
        y + g.identity_bottom_gap
    }

    fn table_header(&self, page: &mut Page, y: f32) -> f32 {
        let g = self.geometry;
        let h = g.table_header_height;
        page.rect(g.margin_left, y, g.table_width(), h);
        let baseline = g.centred_baseline(y, h, g.font_size);
        page.text("Produto", g.product_x(), baseline, g.font_size, true, Align::Left);
        page.text("Conf.", g.checkbox_center(), baseline, g.font_size, true, Align::Center);
        page.text("Quantidade", g.quantity_right(), baseline, g.font_size, true, Align::Right);
        y + h + g.row_gap
    }

    fn place_row(&self, page: &mut Page, y: f32, block: f32, lines: &[String], quantity: &str) {
        let g = self.geometry;
        page.rect(g.margin_left, y, g.table_width(), block);

        let text_top = y + (block - lines.len() as f32 * g.line_height) / 2.0;
        for (i, line) in lines.iter().enumerate() {
            let baseline = text_top + g.line_height * (i as f32 + 0.75);
            page.text(line.as_str(), g.product_x(), baseline, g.font_size, false, Align::Left);
        }

        let size = g.checkbox_size;
        page.rect(g.checkbox_center() - size / 2.0, y + (block - size) / 2.0, size, size);

        let baseline = g.centred_baseline(y, block, g.font_size);
        page.text(quantity, g.quantity_right(), baseline, g.font_size, true, Align::Right);
    }

    fn totals_block(&self, page: &mut Page, y: f32, totals: PackageTotals, tally: &Tally) {
        let g = self.geometry;
        // Clamped rather than paginated: the block may overdraw the margin
        let top = if g.usable_bottom() - y >= g.footer_block_height {
            y
        } else {
            y.min(g.page_height - g.footer_min_bottom - g.footer_block_height)
        };

        let right = g.page_width - g.margin_right;
        page.hline(g.margin_left, right, top + 1.0);
        page.text(
            format!(
                "Total: {} {TOTAL_PACKAGE_LABEL} + {} UN",
                totals.packages, totals.units
            ),
            g.margin_left,
            top + 7.0,
            g.font_size,
            true,
            Align::Left,
        );
        page.text(
            format!("Peso líquido: {}", fmt::weight(tally.net_weight)),
            g.margin_left,
            top + 13.5,
            g.font_size,
            false,
            Align::Left,
        );
        page.text(
            format!("Peso bruto: {}", fmt::weight(tally.gross_weight)),
            g.margin_left,
            top + 19.5,
            g.font_size,
            false,
            Align::Left,
        );
        page.hline(g.margin_left, g.margin_left + 80.0, top + 31.0);
        page.text(
            "Assinatura do conferente",
            g.margin_left,
            top + 35.0,
            g.small_size,
            false,
            Align::Left,
        );
    }

    fn page_footer(&self, page: &mut Page) {
        let g = self.geometry;
        let label = format!("Página {}", page.number);
        page.text(
            label,
            g.page_width / 2.0,
            g.page_height - g.page_number_offset,
            g.small_size,
            false,
            Align::Center,
        );
    }
}
