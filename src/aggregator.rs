use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fmt;
use crate::models::{CustomerIdentity, InvoiceRecord, LineItem};
use crate::rules::RuleTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Individual,
    Consolidated,
}

/// How a document's net/gross weight is folded into its bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    /// Once per document.
    #[default]
    PerDocument,
    /// Once per line item, so an N-item invoice counts its weight N times.
    PerLineItem,
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// Additive totals shared by customer and city buckets. Products are keyed
/// and ordered by product name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub net_weight: f64,
    pub gross_weight: f64,
    pub products: BTreeMap<String, LineItem>,
}

impl Tally {
    pub fn add_item(&mut self, item: &LineItem) {
        let entry = self
            .products
            .entry(item.product_name.clone())
            .or_insert_with(|| LineItem {
                product_code: String::new(),
                product_name: item.product_name.clone(),
                quantity: 0.0,
            });
        entry.quantity += item.quantity;
        entry.product_code = item.product_code.clone();
    }

    pub fn add_weight(&mut self, net: f64, gross: f64) {
        self.net_weight += net;
        self.gross_weight += gross;
    }

    #[cfg(test)]
    pub fn quantity_of(&self, product_name: &str) -> f64 {
        self.products
            .get(product_name)
            .map(|p| p.quantity)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerBucket {
    pub city: String,
    pub identity: CustomerIdentity,
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityBucket {
    pub city: String,
    pub tally: Tally,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct Aggregator<'a> {
    rules: &'a RuleTable,
    weight_policy: WeightPolicy,
    customers: BTreeMap<(String, String), CustomerBucket>,
    cities: BTreeMap<String, CityBucket>,
    documents: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(rules: &'a RuleTable, weight_policy: WeightPolicy) -> Self {
        Self {
            rules,
            weight_policy,
            customers: BTreeMap::new(),
            cities: BTreeMap::new(),
            documents: 0,
        }
    }

    /// A non-matching pair, typos included, is Consolidated.
    pub fn classify(&self, city: &str, tax_id: &str) -> Classification {
        if self.rules.is_individual(city, tax_id) {
            Classification::Individual
        } else {
            Classification::Consolidated
        }
    }

    fn customer_bucket(&mut self, city: &str, identity: &CustomerIdentity) -> &mut CustomerBucket {
        let bucket = self
            .customers
            .entry((city.to_string(), identity.name.clone()))
            .or_insert_with(|| CustomerBucket {
                city: city.to_string(),
                identity: identity.clone(),
                tally: Tally::default(),
            });
        // Address and tax id follow the last document seen for the customer
        bucket.identity = identity.clone();
        bucket
    }

    fn city_bucket(&mut self, city: &str) -> &mut CityBucket {
        self.cities
            .entry(city.to_string())
            .or_insert_with(|| CityBucket {
                city: city.to_string(),
                tally: Tally::default(),
            })
    }

    fn tally_for(&mut self, class: Classification, record: &InvoiceRecord) -> &mut Tally {
        let city = fmt::city(&record.city);
        match class {
            Classification::Individual => &mut self.customer_bucket(&city, &record.customer).tally,
            Classification::Consolidated => &mut self.city_bucket(&city).tally,
        }
    }

    /// Fold one document into its bucket. Returns how it was classified.
    pub fn accumulate(&mut self, record: &InvoiceRecord) -> Classification {
        let class = self.classify(&record.city, &record.customer.tax_id);
        self.documents += 1;
        debug!(
            source = %record.source,
            city = %record.city,
            customer = %record.customer.name,
            items = record.items.len(),
            ?class,
            "folding document"
        );
        if record.items.is_empty() {
            return class;
        }

        let policy = self.weight_policy;
        let tally = self.tally_for(class, record);
        for item in &record.items {
            tally.add_item(item);
            if policy == WeightPolicy::PerLineItem {
                tally.add_weight(record.net_weight, record.gross_weight);
            }
        }
        if policy == WeightPolicy::PerDocument {
            tally.add_weight(record.net_weight, record.gross_weight);
        }
        class
    }

    /// Ordered by city, then customer name.
    pub fn customer_buckets(&self) -> impl Iterator<Item = &CustomerBucket> {
        self.customers.values()
    }

    /// Ordered by city.
    pub fn city_buckets(&self) -> impl Iterator<Item = &CityBucket> {
        self.cities.values()
    }

    pub fn documents_folded(&self) -> usize {
        self.documents
    }
}
