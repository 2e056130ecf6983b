use storefront_core::catalog::CatalogQuery;
use storefront_db::seed_catalog;

use crate::commands::CommandResult;

/// Runs the query against the seeded catalog and prints the result view as JSON.
pub fn run(search_term: Option<String>, hide_out_of_stock: bool) -> CommandResult {
    let query = CatalogQuery { search_term, hide_out_of_stock };
    CommandResult::json("catalog", 0, &seed_catalog().search(&query))
}
