//! Catalog seed data loaded at process start.

use rust_decimal::Decimal;

use storefront_core::catalog::Catalog;
use storefront_core::domain::product::{Product, ProductId};

const SEED_STOCK: [i32; 5] = [5, 0, 10, 0, 3];

/// Products 1..=5: `Product N`, `Description N`, price `N*10 + 0.99`, `/images/productN.jpg`.
pub fn seed_products() -> Vec<Product> {
    SEED_STOCK
        .iter()
        .zip(1_i32..)
        .map(|(&available_stock, n)| Product {
            id: ProductId(n),
            name: format!("Product {n}"),
            description: format!("Description {n}"),
            price: Decimal::new(i64::from(n) * 1000 + 99, 2),
            available_stock,
            image_url: format!("/images/product{n}.jpg"),
        })
        .collect()
}

pub fn seed_catalog() -> Catalog {
    Catalog::new(seed_products())
}
