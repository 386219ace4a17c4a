//! Built-in catalog: inventory records and the returns logged against them.
//!
//! Served whenever the configured catalog or registry comes back empty.

use super::{ColumnRef, EntityInfo, JoinKey};
use crate::spec::{FieldPair, JoinKind};

pub const INVENTORY: &str = "inventory";
pub const RETURNS: &str = "returns";

pub fn entities() -> Vec<EntityInfo> {
    vec![
        EntityInfo::new(INVENTORY).with_display_name("Inventory Records"),
        EntityInfo::new(RETURNS).with_display_name("Return Records"),
    ]
}

/// Default columns for a built-in entity; empty for anything else.
pub fn columns(entity: &str) -> Vec<ColumnRef> {
    match entity {
        INVENTORY => vec![
            ColumnRef::text(INVENTORY, "sku").with_label("SKU"),
            ColumnRef::text(INVENTORY, "productName"),
            ColumnRef::text(INVENTORY, "category"),
            ColumnRef::text(INVENTORY, "brand"),
            ColumnRef::text(INVENTORY, "warehouse"),
            ColumnRef::text(INVENTORY, "region"),
            ColumnRef::numeric(INVENTORY, "quantity"),
            ColumnRef::numeric(INVENTORY, "unitCost"),
            ColumnRef::numeric(INVENTORY, "revenue"),
            ColumnRef::date(INVENTORY, "receivedDate"),
        ],
        RETURNS => vec![
            ColumnRef::text(RETURNS, "returnId").with_label("Return ID"),
            ColumnRef::text(RETURNS, "sku").with_label("SKU"),
            ColumnRef::text(RETURNS, "reason"),
            ColumnRef::text(RETURNS, "condition"),
            ColumnRef::text(RETURNS, "channel"),
            ColumnRef::numeric(RETURNS, "quantityReturned"),
            ColumnRef::numeric(RETURNS, "refundAmount"),
            ColumnRef::date(RETURNS, "returnDate"),
        ],
        _ => Vec::new(),
    }
}

/// The single default join: inventory to returns on SKU.
pub fn join_keys() -> Vec<JoinKey> {
    let mut key = JoinKey::new(INVENTORY, RETURNS).with_pair(FieldPair::new("sku", "sku"));
    key.default_join_kind = JoinKind::Left;
    key.is_default = true;
    vec![key]
}

/// Physical table names for the built-in entities.
pub(crate) const TABLES: &[(&str, &str)] = &[
    (INVENTORY, "inventory_records"),
    (RETURNS, "return_records"),
];

/// Physical column names for built-in fields whose names are not a plain
/// lower-casing away from the column.
pub(crate) const FIELDS: &[(&str, &str, &str)] = &[
    (INVENTORY, "productName", "product_name"),
    (INVENTORY, "unitCost", "unit_cost"),
    (INVENTORY, "receivedDate", "received_date"),
    (RETURNS, "returnId", "return_id"),
    (RETURNS, "quantityReturned", "quantity_returned"),
    (RETURNS, "refundAmount", "refund_amount"),
    (RETURNS, "returnDate", "return_date"),
];
