use crate::models::ConversionRule;

/// Fold the Portuguese accented letters that show up in NF-e city names.
fn fold_accent(c: char) -> char {
    match c {
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        'Ñ' => 'N',
        other => other,
    }
}

/// Uppercase, trim and collapse inner whitespace.
pub fn upper_collapsed(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Normalize a city name for lookup and storage: `" Francisco  Beltrão. "`
/// becomes `"FRANCISCO BELTRAO"`. Apostrophes and hyphens survive
/// (`ITAPEJARA D'OESTE`).
pub fn city(raw: &str) -> String {
    let folded: String = upper_collapsed(raw)
        .chars()
        .map(fold_accent)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'' || *c == '-')
        .collect();
    upper_collapsed(&folded)
}

/// Keep only the digits of a CNPJ/CPF.
pub fn tax_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

const CPF_DIGITS: usize = 11;
const CNPJ_DIGITS: usize = 14;

/// Digits of a CPF/CNPJ left-padded back to their registry width. A
/// spreadsheet that stores `01.111.111/0001-11` as a number keeps
/// `1111111000111`. Eleven digits or fewer read as a CPF.
pub fn padded_tax_id(raw: &str) -> String {
    let digits = tax_id(raw);
    let width = match digits.len() {
        0 => return digits,
        n if n <= CPF_DIGITS => CPF_DIGITS,
        n if n <= CNPJ_DIGITS => CNPJ_DIGITS,
        _ => return digits,
    };
    format!("{digits:0>width$}")
}

/// Customer and product names are compared case-insensitively.
pub fn name(raw: &str) -> String {
    upper_collapsed(raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityDisplay {
    pub text: String,
    pub packages: u64,
    pub units: u64,
}

/// Whole units of an accumulated quantity; fractions are truncated.
pub fn whole_units(total: f64) -> u64 {
    if total.is_finite() && total > 0.0 {
        total.trunc() as u64
    } else {
        0
    }
}

/// Split a quantity into packages and leftover units according to `rule`.
pub fn quantity(total: f64, rule: Option<&ConversionRule>) -> QuantityDisplay {
    let n = whole_units(total);
    let Some(rule) = rule else {
        return QuantityDisplay {
            text: format!("{n} UN"),
            packages: 0,
            units: n,
        };
    };
    let per = u64::from(rule.units_per_package.max(1));
    let packages = n / per;
    let units = n % per;
    let text = match (packages, units) {
        (p, u) if p > 0 && u > 0 => format!("{p} {} + {u} UN", rule.unit_label),
        (p, _) if p > 0 => format!("{p} {}", rule.unit_label),
        (_, u) => format!("{u} UN"),
    };
    QuantityDisplay {
        text,
        packages,
        units,
    }
}

/// Format a weight in kilograms with Brazilian separators: 1.234,500 kg
pub fn weight(val: f64) -> String {
    let fixed = format!("{:.3}", val.abs());
    let (int_part, dec_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "000"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if val < 0.0 {
        format!("-{grouped},{dec_part} kg")
    } else {
        format!("{grouped},{dec_part} kg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_tax_id_restores_leading_zeros() {
        assert_eq!(padded_tax_id("1111111000111"), "01111111000111");
        assert_eq!(padded_tax_id("01.111.111/0001-11"), "01111111000111");
        assert_eq!(padded_tax_id("123456789"), "00123456789");
        assert_eq!(padded_tax_id("123.456.789-09"), "12345678909");
        assert_eq!(padded_tax_id(""), "");
        assert_eq!(padded_tax_id("123456789012345"), "123456789012345");
    }

    fn rule(label: &str, per: u32) -> ConversionRule {
        ConversionRule {
            product_code: "A1".to_string(),
            unit_label: label.to_string(),
            units_per_package: per,
        }
    }

    #[test]
    fn test_city_normalization() {
        assert_eq!(city("  Francisco   Beltrão. "), "FRANCISCO BELTRAO");
        assert_eq!(city("pato branco"), "PATO BRANCO");
        assert_eq!(city("Itapejara d'Oeste"), "ITAPEJARA D'OESTE");
        assert_eq!(city("São João"), "SAO JOAO");
    }

    #[test]
    fn test_tax_id_keeps_digits() {
        assert_eq!(tax_id("12.345.678/0001-90"), "12345678000190");
        assert_eq!(tax_id("123.456.789-09"), "12345678909");
        assert_eq!(tax_id(""), "");
    }

    #[test]
    fn test_quantity_with_packages_and_units() {
        let q = quantity(30.0, Some(&rule("CX", 12)));
        assert_eq!(q.text, "2 CX + 6 UN");
        assert_eq!((q.packages, q.units), (2, 6));
    }

    #[test]
    fn test_quantity_exact_packages() {
        let q = quantity(24.0, Some(&rule("FD", 12)));
        assert_eq!(q.text, "2 FD");
        assert_eq!((q.packages, q.units), (2, 0));
    }

    #[test]
    fn test_quantity_below_one_package() {
        let q = quantity(5.0, Some(&rule("CX", 12)));
        assert_eq!(q.text, "5 UN");
        let zero = quantity(0.0, Some(&rule("CX", 12)));
        assert_eq!(zero.text, "0 UN");
    }

    #[test]
    fn test_quantity_without_rule_truncates() {
        let q = quantity(15.7, None);
        assert_eq!(q.text, "15 UN");
        assert_eq!((q.packages, q.units), (0, 15));
    }

    #[test]
    fn test_quantity_split_conserves_units() {
        for per in [1u32, 5, 6, 12, 24] {
            let r = rule("CX", per);
            for tenths in 0..400u32 {
                let q = f64::from(tenths) / 10.0 * 3.7;
                let d = quantity(q, Some(&r));
                assert_eq!(d.packages * u64::from(per) + d.units, q.floor() as u64);
            }
        }
    }

    #[test]
    fn test_weight_formatting() {
        assert_eq!(weight(0.0), "0,000 kg");
        assert_eq!(weight(12.5), "12,500 kg");
        assert_eq!(weight(1234.5678), "1.234,568 kg");
        assert_eq!(weight(1000000.0), "1.000.000,000 kg");
    }
}
