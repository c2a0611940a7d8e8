#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub product_code: String,
    pub product_name: String,
    pub quantity: f64,
}

/// Package conversion for one product code, e.g. 12 units per `CX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRule {
    pub product_code: String,
    pub unit_label: String,
    pub units_per_package: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

impl Address {
    pub fn formatted(&self) -> String {
        format!(
            "{}, {} - {} - {}/{} - CEP {}",
            self.street, self.number, self.district, self.city, self.state, self.postal_code
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerIdentity {
    pub name: String,
    pub tax_id: String,
    pub address: Address,
}

/// One NF-e document after extraction and normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub source: String,
    pub city: String,
    pub customer: CustomerIdentity,
    pub net_weight: f64,
    pub gross_weight: f64,
    pub items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_formatted() {
        let addr = Address {
            street: "RUA TOCANTINS".to_string(),
            number: "120".to_string(),
            district: "CENTRO".to_string(),
            city: "PATO BRANCO".to_string(),
            state: "PR".to_string(),
            postal_code: "85501000".to_string(),
        };
        assert_eq!(
            addr.formatted(),
            "RUA TOCANTINS, 120 - CENTRO - PATO BRANCO/PR - CEP 85501000"
        );
    }

    #[test]
    fn test_empty_address_keeps_separators() {
        assert_eq!(Address::default().formatted(), ",  -  - / - CEP ");
    }
}
