use std::io::BufWriter;
use std::path::Path;

use printpdf::image_crate;
use printpdf::*;
use tracing::debug;

use crate::error::{MapasError, Result};
use crate::layout::{Align, Element, Geometry, Page};

const OUTLINE: f32 = 0.5;
const LOGO_DPI: f32 = 300.0;
const MM_PER_INCH: f32 = 25.4;

/// Company logo drawn into the header box of every page.
#[derive(Debug, Clone)]
pub struct Logo {
    image: ImageXObject,
}

impl Logo {
    /// Any format the image decoder understands (PNG, JPEG, ...).
    pub fn load(path: &Path) -> Result<Self> {
        let decoded = image_crate::open(path)
            .map_err(|e| MapasError::Pdf(format!("logo {}: {e}", path.display())))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(MapasError::Pdf(format!("logo {} is empty", path.display())));
        }
        Ok(Self {
            image: ImageXObject::from_dynamic_image(&decoded),
        })
    }

    /// Size in millimetres at `LOGO_DPI`.
    fn natural_size(&self) -> (f32, f32) {
        let mm = |px: Px| px.0 as f32 * MM_PER_INCH / LOGO_DPI;
        (mm(self.image.width), mm(self.image.height))
    }
}

struct PdfWriter<'a> {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    current_page: PdfPageIndex,
    current_layer: PdfLayerIndex,
    geometry: &'a Geometry,
    logo: Option<&'a Logo>,
    pages: usize,
}

impl<'a> PdfWriter<'a> {
    fn new(title: &str, geometry: &'a Geometry, logo: Option<&'a Logo>) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(
            title,
            Mm(geometry.page_width),
            Mm(geometry.page_height),
            "Layer 1",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| MapasError::Pdf(format!("{e:?}")))?;
        let font_bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| MapasError::Pdf(format!("{e:?}")))?;
        Ok(Self {
            doc,
            font,
            font_bold,
            current_page: page,
            current_layer: layer,
            geometry,
            logo,
            pages: 1,
        })
    }

    /// Layout y runs top-down; PDF y runs bottom-up.
    fn pdf_y(&self, y: f32) -> f32 {
        self.geometry.page_height - y
    }

    fn layer(&self) -> PdfLayerReference {
        self.doc
            .get_page(self.current_page)
            .get_layer(self.current_layer)
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(
            Mm(self.geometry.page_width),
            Mm(self.geometry.page_height),
            "Layer",
        );
        self.current_page = page;
        self.current_layer = layer;
        self.pages += 1;
    }

    fn text(&self, s: &str, x: f32, y: f32, size: f32, bold: bool, align: Align) {
        let font = if bold {
            self.font_bold.clone()
        } else {
            self.font.clone()
        };
        let width = self.geometry.text_width(s, size);
        let x = match align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };
        self.layer()
            .use_text(s, size, Mm(x), Mm(self.pdf_y(y)), &font);
    }

    fn polyline(&self, points: &[(f32, f32)], closed: bool) {
        let layer = self.layer();
        layer.set_outline_thickness(OUTLINE);
        let line = Line {
            points: points
                .iter()
                .map(|&(x, y)| (Point::new(Mm(x), Mm(self.pdf_y(y))), false))
                .collect(),
            is_closed: closed,
        };
        layer.add_line(line);
    }

    fn rect(&self, x: f32, y: f32, width: f32, height: f32) {
        self.polyline(
            &[(x, y), (x + width, y), (x + width, y + height), (x, y + height)],
            true,
        );
    }

    /// Fit the logo inside the box, keeping its aspect ratio, centred.
    fn image(&self, logo: &Logo, x: f32, y: f32, width: f32, height: f32) {
        let (natural_w, natural_h) = logo.natural_size();
        let scale = (width / natural_w).min(height / natural_h);
        let (w, h) = (natural_w * scale, natural_h * scale);
        let left = x + (width - w) / 2.0;
        let bottom = y + (height + h) / 2.0;
        Image::from(logo.image.clone()).add_to_layer(
            self.layer(),
            ImageTransform {
                translate_x: Some(Mm(left)),
                translate_y: Some(Mm(self.pdf_y(bottom))),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(LOGO_DPI),
                ..Default::default()
            },
        );
    }

    fn draw(&self, element: &Element) {
        match element {
            Element::Text {
                text,
                x,
                y,
                size,
                bold,
                align,
            } => self.text(text, *x, *y, *size, *bold, *align),
            Element::Rect {
                x,
                y,
                width,
                height,
            } => self.rect(*x, *y, *width, *height),
            Element::HLine { x1, x2, y } => self.polyline(&[(*x1, *y), (*x2, *y)], false),
            Element::Logo {
                x,
                y,
                width,
                height,
                label,
            } => match self.logo {
                Some(logo) => self.image(logo, *x, *y, *width, *height),
                None => {
                    self.rect(*x, *y, *width, *height);
                    let size = self.geometry.title_size;
                    self.text(label, x + width / 2.0, y + height / 2.0 + size * 0.12, size, true, Align::Center);
                }
            },
        }
    }

    fn to_bytes(self) -> Result<Vec<u8>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| MapasError::Pdf(format!("{e:?}")))?;
        buf.into_inner().map_err(|e| MapasError::Pdf(e.to_string()))
    }
}

/// Render laid-out pages into a PDF document. Without a logo the header
/// shows a framed company name instead.
pub fn render(pages: &[Page], title: &str, geometry: &Geometry, logo: Option<&Logo>) -> Result<Vec<u8>> {
    let mut pdf = PdfWriter::new(title, geometry, logo)?;
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            pdf.new_page();
        }
        for element in &page.elements {
            pdf.draw(element);
        }
    }
    debug!(title, pages = pdf.pages, logo = logo.is_some(), "rendered pdf");
    pdf.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Tally;
    use crate::layout::{LayoutEngine, ReportHeader};
    use crate::models::LineItem;
    use crate::rules::RuleTable;

    fn header() -> ReportHeader {
        ReportHeader {
            company: "FRIOVEL".to_string(),
            title: "MAPA DE SEPARAÇÃO DE PRODUTOS".to_string(),
            date: "17/10/2026".to_string(),
        }
    }

    #[test]
    fn test_render_empty_bucket_produces_pdf() {
        let g = Geometry::default();
        let rules = RuleTable::new();
        let header = header();
        let pages = LayoutEngine::new(&g, &rules, &header).layout("X", &Tally::default(), "", None);
        let bytes = render(&pages, "mapa", &g, None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_multi_page_produces_pdf() {
        let g = Geometry::default();
        let rules = RuleTable::new();
        let header = header();
        let mut tally = Tally::default();
        for i in 0..80 {
            tally.add_item(&LineItem {
                product_code: format!("{i}"),
                product_name: format!("PRODUTO {i:03}"),
                quantity: 2.0,
            });
        }
        let pages = LayoutEngine::new(&g, &rules, &header).layout("X", &tally, "Rogerio", None);
        assert!(pages.len() > 1);
        let bytes = render(&pages, "mapa", &g, None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        image_crate::RgbImage::from_pixel(width, height, image_crate::Rgb([200, 30, 30]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_logo_scales_into_header_box() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        write_png(&path, 600, 150);
        let logo = Logo::load(&path).unwrap();
        let (w, h) = logo.natural_size();
        assert!((w - 50.8).abs() < 1e-3);
        assert!((h - 12.7).abs() < 1e-3);

        let g = Geometry::default();
        let rules = RuleTable::new();
        let header = header();
        let pages = LayoutEngine::new(&g, &rules, &header).layout("X", &Tally::default(), "", None);
        let bytes = render(&pages, "mapa", &g, Some(&logo)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_missing_logo_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Logo::load(&dir.path().join("nao_existe.png")).unwrap_err();
        assert!(matches!(err, MapasError::Pdf(_)));
    }
}
