//! Order totals and the product lookup table.
//!
//! Money is integer minor units throughout. Catalog prices arrive as major
//! unit floats; each unit price is converted on its own and only then
//! multiplied and summed, so rounding never compounds across lines.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use model::{OrderProductItem, ProductItem};
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Upper bound on units of one product in a single order.
pub const MAX_LINE_QUANTITY: u32 = 1_000;
/// Upper bound on units across all lines of a single order.
pub const MAX_ORDER_QUANTITY: u32 = 5_000;

/// Catalog entry: display name and shipping weight of one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogProduct {
    pub product_ref: String,
    pub name: String,
    pub weight_grams: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<String, CatalogProduct>,
}

impl Catalog {
    pub fn new(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|product| (product.product_ref.clone(), product))
                .collect(),
        }
    }

    /// Product table used when no catalog file is configured.
    pub fn builtin() -> Self {
        let entry = |product_ref: &str, name: &str, weight_grams| CatalogProduct {
            product_ref: product_ref.to_string(),
            name: name.to_string(),
            weight_grams,
        };
        Self::new([
            entry("PICKLE-MANGO-500", "Mango Pickle 500g", 600),
            entry("PICKLE-LIME-500", "Lime Pickle 500g", 600),
            entry("PICKLE-GARLIC-250", "Garlic Pickle 250g", 320),
            entry("PODI-GUNPOWDER-250", "Gunpowder Podi 250g", 300),
            entry("GHEE-A2-500", "A2 Cow Ghee 500ml", 550),
            entry("HONEY-RAW-500", "Raw Forest Honey 500g", 650),
        ])
    }

    /// Parses a JSON array of [`CatalogProduct`].
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let products: Vec<CatalogProduct> = serde_json::from_str(json)?;
        Ok(Self::new(products))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid catalog file {}", path.display()))
    }

    pub fn get(&self, product_ref: &str) -> Option<&CatalogProduct> {
        self.products.get(product_ref)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Display name, or the raw reference for products missing from the table.
    pub fn display_name(&self, product_ref: &str) -> String {
        self.get(product_ref)
            .map(|product| product.name.clone())
            .unwrap_or_else(|| product_ref.to_string())
    }

    /// Σ unit weight × quantity. Unknown products weigh nothing.
    pub fn total_weight(&self, items: &[ProductItem]) -> u32 {
        items.iter().fold(0u32, |total, item| {
            let unit = self.get(&item.product_ref).map_or(0, |p| p.weight_grams);
            total.saturating_add(unit.saturating_mul(item.quantity))
        })
    }

    /// Human-readable item list, e.g. `"Mango Pickle 500g x2, Lime Pickle 500g x1"`.
    pub fn describe(&self, items: &[ProductItem]) -> String {
        items
            .iter()
            .map(|item| format!("{} x{}", self.display_name(&item.product_ref), item.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Converts a catalog selection into priced items.
    ///
    /// # Errors
    /// [`ServiceError::Validation`] for an empty selection, a product missing
    /// from the table, a zero or oversized quantity, or a negative or
    /// non-finite price.
    pub fn price_selection(
        &self,
        lines: &[OrderProductItem],
        default_currency: &str,
    ) -> Result<Vec<ProductItem>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::Validation("empty catalog selection".to_string()));
        }

        let items = lines
            .iter()
            .map(|line| {
                if self.get(&line.product_retailer_id).is_none() {
                    return Err(ServiceError::Validation(format!(
                        "unknown product {}",
                        line.product_retailer_id
                    )));
                }
                if line.quantity == 0 {
                    return Err(ServiceError::Validation(format!(
                        "zero quantity for {}",
                        line.product_retailer_id
                    )));
                }
                if line.quantity > MAX_LINE_QUANTITY {
                    return Err(ServiceError::Validation(format!(
                        "at most {MAX_LINE_QUANTITY} units of {} per order",
                        line.product_retailer_id
                    )));
                }
                let unit_price = to_minor_units(line.item_price).ok_or_else(|| {
                    ServiceError::Validation(format!(
                        "invalid price {} for {}",
                        line.item_price, line.product_retailer_id
                    ))
                })?;
                let currency = if line.currency.is_empty() {
                    default_currency.to_string()
                } else {
                    line.currency.clone()
                };

                Ok(ProductItem {
                    product_ref: line.product_retailer_id.clone(),
                    quantity: line.quantity,
                    unit_price,
                    currency,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        match total_quantity(&items) {
            Some(units) if units <= MAX_ORDER_QUANTITY => Ok(items),
            _ => Err(ServiceError::Validation(format!(
                "at most {MAX_ORDER_QUANTITY} units per order"
            ))),
        }
    }
}

/// Σ quantities, `None` on overflow.
pub fn total_quantity(items: &[ProductItem]) -> Option<u32> {
    items
        .iter()
        .try_fold(0u32, |total, item| total.checked_add(item.quantity))
}

/// Major-unit price to minor units, rounding half away from zero.
/// `None` for negative, non-finite or out-of-range values.
pub fn to_minor_units(major: f64) -> Option<i64> {
    if !major.is_finite() || major < 0.0 {
        return None;
    }
    let minor = (major * 100.0).round();
    if minor > i64::MAX as f64 {
        return None;
    }
    Some(minor as i64)
}

pub fn line_total(item: &ProductItem) -> Option<i64> {
    item.unit_price.checked_mul(i64::from(item.quantity))
}

/// Σ line totals.
///
/// # Errors
/// [`ServiceError::Validation`] if the total overflows.
pub fn subtotal(items: &[ProductItem]) -> Result<i64, ServiceError> {
    items
        .iter()
        .try_fold(0i64, |sum, item| line_total(item).and_then(|line| sum.checked_add(line)))
        .ok_or_else(|| ServiceError::Validation("order total overflows".to_string()))
}

/// COD total = items + handling fee + shipping. Always computed from scratch.
pub fn cod_total(subtotal: i64, cod_fee: i64, shipping: i64) -> i64 {
    subtotal
        .max(0)
        .saturating_add(cod_fee.max(0))
        .saturating_add(shipping.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product: &str, quantity: u32, price: f64) -> OrderProductItem {
        OrderProductItem {
            product_retailer_id: product.to_string(),
            quantity,
            item_price: price,
            currency: "INR".to_string(),
        }
    }

    #[test]
    fn test_selection_amount_in_minor_units() {
        let catalog = Catalog::builtin();
        let items = catalog
            .price_selection(&[line("PICKLE-MANGO-500", 2, 100.0)], "INR")
            .unwrap();
        assert_eq!(items[0].unit_price, 10000);
        assert_eq!(subtotal(&items).unwrap(), 20000);
    }

    #[test]
    fn test_per_line_rounding_is_order_independent() {
        let catalog = Catalog::builtin();
        let forward = [
            line("PICKLE-MANGO-500", 3, 0.1),
            line("PICKLE-LIME-500", 1, 0.2),
            line("GHEE-A2-500", 7, 19.99),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let a = subtotal(&catalog.price_selection(&forward, "INR").unwrap()).unwrap();
        let b = subtotal(&catalog.price_selection(&backward, "INR").unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 3 * 10 + 20 + 7 * 1999);
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let err = Catalog::builtin()
            .price_selection(&[line("NOPE", 1, 10.0)], "INR")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("NOPE")));
    }

    #[test]
    fn test_bad_lines_are_rejected() {
        let catalog = Catalog::builtin();
        assert!(catalog.price_selection(&[], "INR").is_err());
        assert!(catalog.price_selection(&[line("PICKLE-MANGO-500", 0, 10.0)], "INR").is_err());
        assert!(catalog.price_selection(&[line("PICKLE-MANGO-500", 1, -1.0)], "INR").is_err());
        assert!(catalog.price_selection(&[line("PICKLE-MANGO-500", 1, f64::NAN)], "INR").is_err());
    }

    #[test]
    fn test_oversized_quantities_are_rejected() {
        let catalog = Catalog::builtin();
        let huge = [
            line("PICKLE-MANGO-500", 3_000_000_000, 0.01),
            line("PICKLE-LIME-500", 3_000_000_000, 0.01),
        ];
        assert!(matches!(
            catalog.price_selection(&huge, "INR"),
            Err(ServiceError::Validation(_))
        ));

        let products = [
            "PICKLE-MANGO-500",
            "PICKLE-LIME-500",
            "PICKLE-GARLIC-250",
            "PODI-GUNPOWDER-250",
            "GHEE-A2-500",
            "HONEY-RAW-500",
        ];
        let per_line_ok: Vec<_> = products
            .into_iter()
            .map(|product| line(product, MAX_LINE_QUANTITY, 1.0))
            .collect();
        assert!(matches!(
            catalog.price_selection(&per_line_ok, "INR"),
            Err(ServiceError::Validation(msg)) if msg.contains("units per order")
        ));

        let at_limit = catalog
            .price_selection(&[line("PICKLE-MANGO-500", MAX_LINE_QUANTITY, 1.0)], "INR")
            .unwrap();
        assert_eq!(total_quantity(&at_limit), Some(MAX_LINE_QUANTITY));
    }

    #[test]
    fn test_total_quantity_overflow_is_none() {
        let item = |quantity| ProductItem {
            product_ref: "X".into(),
            quantity,
            unit_price: 1,
            currency: "INR".into(),
        };
        assert_eq!(total_quantity(&[item(2), item(3)]), Some(5));
        assert_eq!(total_quantity(&[item(u32::MAX), item(1)]), None);
    }

    #[test]
    fn test_missing_currency_uses_default() {
        let mut selection = line("PICKLE-MANGO-500", 1, 10.0);
        selection.currency.clear();
        let items = Catalog::builtin().price_selection(&[selection], "INR").unwrap();
        assert_eq!(items[0].currency, "INR");
    }

    #[test]
    fn test_weight_and_description() {
        let catalog = Catalog::builtin();
        let items = catalog
            .price_selection(
                &[line("PICKLE-MANGO-500", 2, 100.0), line("HONEY-RAW-500", 1, 250.0)],
                "INR",
            )
            .unwrap();
        assert_eq!(catalog.total_weight(&items), 2 * 600 + 650);
        assert_eq!(catalog.describe(&items), "Mango Pickle 500g x2, Raw Forest Honey 500g x1");
    }

    #[test]
    fn test_cod_total_recomputes() {
        assert_eq!(cod_total(20000, 15000, 8550), 43550);
        assert_eq!(cod_total(20000, 15000, 0), 35000);
        assert_eq!(cod_total(cod_total(20000, 15000, 8550) - 15000 - 8550, 15000, 8550), 43550);
    }

    #[test]
    fn test_subtotal_overflow_is_validation_error() {
        let items = vec![ProductItem {
            product_ref: "X".into(),
            quantity: u32::MAX,
            unit_price: i64::MAX / 2,
            currency: "INR".into(),
        }];
        assert!(matches!(subtotal(&items), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog = Catalog::from_json(
            r#"[{"product_ref":"SKU-1","name":"Widget","weight_grams":250}]"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.display_name("SKU-1"), "Widget");
        assert_eq!(catalog.display_name("SKU-2"), "SKU-2");
    }
}
