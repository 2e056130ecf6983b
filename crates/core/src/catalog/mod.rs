//! Catalog snapshot and the search/filter/sort query run against it.
//!
//! The catalog is an immutable snapshot. Queries never mutate it and always allocate a fresh
//! result, so concurrent readers need no coordination.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::product::{Product, ProductId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    #[serde(default)]
    pub search_term: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub hide_out_of_stock: bool,
}

impl CatalogQuery {
    pub fn new(search_term: impl Into<String>, hide_out_of_stock: bool) -> Self {
        Self { search_term: Some(search_term.into()), hide_out_of_stock }
    }

    /// Builds a query from raw query-string pairs. Keys match case-insensitively and the first
    /// occurrence of a repeated key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut search_term = None;
        let mut hide_out_of_stock = None;
        for (key, value) in pairs {
            let key = key.as_ref();
            if key.eq_ignore_ascii_case("searchTerm") && search_term.is_none() {
                search_term = Some(value.into());
            } else if key.eq_ignore_ascii_case("hideOutOfStock") && hide_out_of_stock.is_none() {
                let value: String = value.into();
                hide_out_of_stock = Some(parse_flag(&value));
            }
        }
        Self { search_term, hide_out_of_stock: hide_out_of_stock.unwrap_or(false) }
    }

    /// The search term when it carries any non-whitespace text.
    pub fn effective_search_term(&self) -> Option<&str> {
        self.search_term.as_deref().filter(|term| !term.trim().is_empty())
    }
}

/// Reads a checkbox-style flag. Only the first comma-separated item counts; `true` and `on`
/// (any case) and `1` are set, anything else including an empty value is unset.
pub fn parse_flag(raw: &str) -> bool {
    let first = raw.split(',').next().unwrap_or_default().trim();
    first.eq_ignore_ascii_case("true") || first.eq_ignore_ascii_case("on") || first == "1"
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Number(i64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawFlag::deserialize(deserializer) {
        Ok(RawFlag::Bool(value)) => value,
        Ok(RawFlag::Number(value)) => value == 1,
        Ok(RawFlag::Text(value)) => parse_flag(&value),
        Ok(RawFlag::Other(_)) | Err(_) => false,
    })
}

/// Query result together with the parameters that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSearchView {
    pub products: Vec<Product>,
    pub search_term: String,
    pub hide_out_of_stock: bool,
}

#[derive(Clone, Debug)]
pub struct Catalog {
    products: Arc<[Product]>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products: products.into() }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|product| &product.id == product_id)
    }

    pub fn query(&self, query: &CatalogQuery) -> Vec<Product> {
        get_products(&self.products, query)
    }

    pub fn search(&self, query: &CatalogQuery) -> CatalogSearchView {
        CatalogSearchView {
            products: self.query(query),
            search_term: query.search_term.clone().unwrap_or_default(),
            hide_out_of_stock: query.hide_out_of_stock,
        }
    }
}

/// Filters by search term and stock, then orders in-stock products first and by name.
pub fn get_products(products: &[Product], query: &CatalogQuery) -> Vec<Product> {
    let needle = query.effective_search_term().map(str::to_lowercase);

    let mut matched: Vec<Product> = products
        .iter()
        .filter(|product| match &needle {
            Some(needle) => matches_term(product, needle),
            None => true,
        })
        .filter(|product| !(query.hide_out_of_stock && product.is_out_of_stock()))
        .cloned()
        .collect();

    // `sort_by` is stable, so products with equal keys keep catalog order.
    matched.sort_by(compare_for_listing);
    matched
}

fn matches_term(product: &Product, lowered_term: &str) -> bool {
    product.name.to_lowercase().contains(lowered_term)
        || product.description.to_lowercase().contains(lowered_term)
}

/// Ordinal, case-sensitive name comparison after the stock partition.
fn compare_for_listing(left: &Product, right: &Product) -> Ordering {
    left.is_out_of_stock()
        .cmp(&right.is_out_of_stock())
        .then_with(|| left.name.as_bytes().cmp(right.name.as_bytes()))
}
