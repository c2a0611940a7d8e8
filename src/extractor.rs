use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{MapasError, Result};
use crate::fmt;
use crate::models::{Address, CustomerIdentity, InvoiceRecord, LineItem};

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

pub fn extract_file(path: &Path) -> Result<InvoiceRecord> {
    let xml = std::fs::read_to_string(path)?;
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    parse_invoice(&xml, &source)
}

/// Parse one NF-e (`nfeProc` or bare `NFe`) document. Elements are matched by
/// local name so both default-namespace and prefixed documents are accepted.
pub fn parse_invoice(xml: &str, source: &str) -> Result<InvoiceRecord> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut p = NfeParsed::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "det" {
                    p.current_item = Some(RawItem::default());
                }
                path.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| MapasError::Xml {
                    file: source.to_string(),
                    message: err.to_string(),
                })?;
                let text = text.trim();
                if !text.is_empty() {
                    p.handle_text(&path, text, source)?;
                }
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim();
                if !text.is_empty() {
                    p.handle_text(&path, text, source)?;
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("det") {
                    if let Some(item) = p.current_item.take() {
                        p.items.push(item);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MapasError::Xml {
                    file: source.to_string(),
                    message: e.to_string(),
                });
            }
            _ => {}
        }
    }

    p.into_record(source)
}

// ---------------------------------------------------------------------------
// Parser state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RawItem {
    code: String,
    name: Option<String>,
    quantity: Option<String>,
}

#[derive(Default)]
struct NfeParsed {
    city: Option<String>,
    customer_name: Option<String>,
    cnpj: Option<String>,
    cpf: Option<String>,
    address: Address,
    net_weight: f64,
    gross_weight: f64,
    items: Vec<RawItem>,
    current_item: Option<RawItem>,
}

fn ends_with(path: &[String], tail: &[&str]) -> bool {
    path.len() >= tail.len()
        && path[path.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a == b)
}

fn parse_decimal(raw: &str, field: &'static str, source: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(MapasError::InvalidNumber {
            file: source.to_string(),
            field,
            value: raw.to_string(),
        }),
    }
}

impl NfeParsed {
    fn handle_text(&mut self, path: &[String], text: &str, source: &str) -> Result<()> {
        let at = |tail: &[&str]| ends_with(path, tail);

        if at(&["dest", "xNome"]) {
            self.customer_name = Some(text.to_string());
        } else if at(&["dest", "CNPJ"]) {
            self.cnpj = Some(text.to_string());
        } else if at(&["dest", "CPF"]) {
            self.cpf = Some(text.to_string());
        } else if at(&["enderDest", "xMun"]) {
            self.city = Some(text.to_string());
        } else if at(&["enderDest", "xLgr"]) {
            self.address.street = text.to_string();
        } else if at(&["enderDest", "nro"]) {
            self.address.number = text.to_string();
        } else if at(&["enderDest", "xBairro"]) {
            self.address.district = text.to_string();
        } else if at(&["enderDest", "CEP"]) {
            self.address.postal_code = text.to_string();
        } else if at(&["enderDest", "UF"]) {
            self.address.state = text.to_string();
        } else if at(&["det", "prod", "cProd"]) {
            if let Some(item) = self.current_item.as_mut() {
                item.code = text.to_string();
            }
        } else if at(&["det", "prod", "xProd"]) {
            if let Some(item) = self.current_item.as_mut() {
                item.name = Some(text.to_string());
            }
        } else if at(&["det", "prod", "qCom"]) {
            if let Some(item) = self.current_item.as_mut() {
                item.quantity = Some(text.to_string());
            }
        } else if at(&["transp", "vol", "pesoL"]) {
            self.net_weight += parse_decimal(text, "pesoL", source)?;
        } else if at(&["transp", "vol", "pesoB"]) {
            self.gross_weight += parse_decimal(text, "pesoB", source)?;
        }
        Ok(())
    }

    fn into_record(self, source: &str) -> Result<InvoiceRecord> {
        let missing = |field: &'static str| MapasError::MissingField {
            file: source.to_string(),
            field,
        };

        let city = fmt::city(&self.city.ok_or_else(|| missing("enderDest/xMun"))?);
        let name = fmt::name(&self.customer_name.ok_or_else(|| missing("dest/xNome"))?);
        let raw_id = self
            .cnpj
            .or(self.cpf)
            .ok_or_else(|| missing("dest/CNPJ|CPF"))?;

        let mut items = Vec::with_capacity(self.items.len());
        for raw in self.items {
            let product_name = raw.name.ok_or_else(|| missing("det/prod/xProd"))?;
            let quantity = raw.quantity.ok_or_else(|| missing("det/prod/qCom"))?;
            items.push(LineItem {
                product_code: raw.code.trim().to_string(),
                product_name: fmt::name(&product_name),
                quantity: parse_decimal(&quantity, "qCom", source)?,
            });
        }

        let address = Address {
            city: city.clone(),
            ..self.address
        };

        Ok(InvoiceRecord {
            source: source.to_string(),
            city,
            customer: CustomerIdentity {
                name,
                tax_id: fmt::tax_id(&raw_id),
                address,
            },
            net_weight: self.net_weight,
            gross_weight: self.gross_weight,
            items,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn nfe_xml(city: &str, customer: &str, id_tag: &str, id: &str, items: &[(&str, &str, &str)]) -> String {
        let dets: String = items
            .iter()
            .enumerate()
            .map(|(i, (code, name, qty))| {
                format!(
                    "<det nItem=\"{}\"><prod><cProd>{code}</cProd><xProd>{name}</xProd>\
                     <uCom>UN</uCom><qCom>{qty}</qCom></prod></det>",
                    i + 1
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <nfeProc xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"4.00\"><NFe><infNFe>\
             <emit><xNome>FRIOVEL DISTRIBUIDORA</xNome><enderEmit><xMun>CURITIBA</xMun></enderEmit></emit>\
             <dest><{id_tag}>{id}</{id_tag}><xNome>{customer}</xNome>\
             <enderDest><xLgr>RUA TOCANTINS</xLgr><nro>120</nro><xBairro>CENTRO</xBairro>\
             <xMun>{city}</xMun><UF>PR</UF><CEP>85501000</CEP></enderDest></dest>\
             {dets}\
             <transp><vol><qVol>2</qVol><pesoL>10.500</pesoL><pesoB>11.000</pesoB></vol>\
             <vol><pesoL>1.500</pesoL><pesoB>2.000</pesoB></vol></transp>\
             </infNFe></NFe></nfeProc>"
        )
    }

    #[test]
    fn test_parse_invoice_fields() {
        let xml = nfe_xml(
            "Pato Branco",
            "Mercado Bom Preço",
            "CNPJ",
            "12.345.678/0001-90",
            &[("A1", "Apple Juice", "30.0000"), ("B2", "suco de uva 1l", "4")],
        );
        let rec = parse_invoice(&xml, "nota1.xml").unwrap();
        assert_eq!(rec.source, "nota1.xml");
        assert_eq!(rec.city, "PATO BRANCO");
        assert_eq!(rec.customer.name, "MERCADO BOM PREÇO");
        assert_eq!(rec.customer.tax_id, "12345678000190");
        assert_eq!(
            rec.customer.address.formatted(),
            "RUA TOCANTINS, 120 - CENTRO - PATO BRANCO/PR - CEP 85501000"
        );
        assert_eq!(rec.items.len(), 2);
        assert_eq!(rec.items[0].product_code, "A1");
        assert_eq!(rec.items[0].product_name, "APPLE JUICE");
        assert_eq!(rec.items[0].quantity, 30.0);
        assert_eq!(rec.items[1].product_name, "SUCO DE UVA 1L");
        assert!((rec.net_weight - 12.0).abs() < 1e-9);
        assert!((rec.gross_weight - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_invoice_cpf_fallback() {
        let xml = nfe_xml("Francisco Beltrão", "Joao da Silva", "CPF", "123.456.789-09", &[]);
        let rec = parse_invoice(&xml, "cpf.xml").unwrap();
        assert_eq!(rec.city, "FRANCISCO BELTRAO");
        assert_eq!(rec.customer.tax_id, "12345678909");
        assert!(rec.items.is_empty());
    }

    #[test]
    fn test_parse_invoice_ignores_issuer_fields() {
        let xml = nfe_xml("Pato Branco", "Cliente", "CNPJ", "1", &[]);
        let rec = parse_invoice(&xml, "x.xml").unwrap();
        assert_ne!(rec.customer.name, "FRIOVEL DISTRIBUIDORA");
        assert_eq!(rec.city, "PATO BRANCO");
    }

    #[test]
    fn test_parse_invoice_prefixed_namespace() {
        let xml = "<nfe:NFe xmlns:nfe=\"http://www.portalfiscal.inf.br/nfe\"><nfe:infNFe>\
                   <nfe:dest><nfe:CNPJ>99</nfe:CNPJ><nfe:xNome>Loja &amp; Cia</nfe:xNome>\
                   <nfe:enderDest><nfe:xMun>Pato Branco</nfe:xMun></nfe:enderDest></nfe:dest>\
                   <nfe:det><nfe:prod><nfe:cProd>Z9</nfe:cProd><nfe:xProd>X</nfe:xProd>\
                   <nfe:qCom>15.7</nfe:qCom></nfe:prod></nfe:det>\
                   </nfe:infNFe></nfe:NFe>";
        let rec = parse_invoice(xml, "p.xml").unwrap();
        assert_eq!(rec.customer.name, "LOJA & CIA");
        assert_eq!(rec.items[0].quantity, 15.7);
        assert_eq!(rec.net_weight, 0.0);
    }

    #[test]
    fn test_missing_city_is_an_error() {
        let xml = "<NFe><infNFe><dest><CNPJ>1</CNPJ><xNome>A</xNome></dest></infNFe></NFe>";
        let err = parse_invoice(xml, "bad.xml").unwrap_err();
        assert!(matches!(
            err,
            MapasError::MissingField { field: "enderDest/xMun", .. }
        ));
        assert!(err.to_string().contains("bad.xml"));
    }

    #[test]
    fn test_missing_tax_id_is_an_error() {
        let xml = "<NFe><dest><xNome>A</xNome><enderDest><xMun>X</xMun></enderDest></dest></NFe>";
        let err = parse_invoice(xml, "bad.xml").unwrap_err();
        assert!(matches!(err, MapasError::MissingField { field: "dest/CNPJ|CPF", .. }));
    }

    #[test]
    fn test_invalid_quantity_is_an_error() {
        let xml = nfe_xml("X", "A", "CNPJ", "1", &[("A1", "P", "dez")]);
        let err = parse_invoice(&xml, "q.xml").unwrap_err();
        assert!(matches!(err, MapasError::InvalidNumber { field: "qCom", .. }));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let err = parse_invoice("<NFe><dest></NFe>", "m.xml").unwrap_err();
        assert!(matches!(err, MapasError::Xml { .. }));
    }

    #[test]
    fn test_extract_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nota.xml");
        std::fs::write(&path, nfe_xml("Pato Branco", "A", "CNPJ", "1", &[("A1", "P", "1")])).unwrap();
        let rec = extract_file(&path).unwrap();
        assert_eq!(rec.source, "nota.xml");
        assert_eq!(rec.items.len(), 1);
    }
}
