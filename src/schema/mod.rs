//! Canonical transaction schema and the normalizer that maps raw export
//! layouts onto it.
//!
//! Raw purchase-order exports arrive with differing header spellings and
//! column orders. [`SchemaNormalizer::resolve`] maps a source header onto
//! [`CANONICAL_COLUMNS`] once per file, and [`SchemaNormalizer::normalize`]
//! turns batches of raw rows into [`TransactionRecord`]s without ever failing
//! on an individual cell.

mod price;

pub use price::{normalize_datetime, AmountParser, CANONICAL_DATETIME_FORMAT};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, SupplyError};

/// Column layout of the canonical transaction table, in output order
pub const CANONICAL_COLUMNS: [&str; 29] = [
    "PO ID",
    "Creation Date",
    "PO #",
    "PR ID",
    "Buyer: First Name",
    "Buyer: Last Name",
    "Buyer: Email",
    "Supplier ID",
    "Supplier Name",
    "Supplier Number",
    "Supplier Duns No",
    "PO Line #",
    "Quantity",
    "Unit Price",
    "Extended Price",
    "Currency",
    "SKU/Catalog #",
    "Supplier PartAuxiliary ID",
    "Amount/UOM & UOM",
    "Product Description",
    "Manufacturer",
    "Mfr Catalog #",
    "Category Level 1",
    "Category Level 2",
    "Category Level 3",
    "Category Level 4",
    "Category Level 5",
    "UNSPSC",
    "Original Requisition Requestor",
];

/// Column appended by the indexer
pub const CLUSTER_COLUMN: &str = "Cluster";

/// Columns without which a source file cannot contribute to the table
pub const REQUIRED_COLUMNS: [&str; 3] = ["Product Description", "Supplier Name", "Unit Price"];

/// Numeric columns coerced through [`AmountParser`]
pub const AMOUNT_COLUMNS: [&str; 3] = ["Quantity", "Unit Price", "Extended Price"];

/// Native header of the full purchase-order export.
///
/// Files whose header cannot be matched by name but whose width equals this
/// layout are mapped positionally.
pub const EXPORT_COLUMNS: [&str; 113] = [
    "PO ID",
    "Creation Date",
    "Original Revision Date",
    "Last Revision Date",
    "Last Distribution Date",
    "Workflow Completion Date",
    "PO #",
    "Requested Deliver Date",
    "PR ID",
    "Payment Type",
    "PO Terms",
    "Buyer: First Name",
    "Buyer: Last Name",
    "Buyer Phone",
    "Buyer: Email",
    "Department",
    "Supplier Fax",
    "BillTo Address Code",
    "BillTo Address Internal Name",
    "BillTo Contact 1",
    "BillTo Address 1",
    "BillTo City",
    "BillTo State",
    "BillTo Postal Code",
    "BillTo Country",
    "Accounting Date",
    "ShipTo Address Code",
    "ShipTo Address Internal Name",
    "ShipTo Contact 1",
    "ShipTo Contact 2",
    "ShipTo Contact 3",
    "ShipTo Address 1",
    "ShipTo Address 2",
    "ShipTo City",
    "ShipTo State",
    "ShipTo Postal Code",
    "ShipTo Country",
    "Supplier ID",
    "Customer SupplierId",
    "Supplier Name",
    "Supplier Number",
    "Header Notes",
    "PO Line #",
    "Quantity",
    "Unit Price",
    "Unit Price Date",
    "Extended Price",
    "List Price",
    "List Price Date",
    "Current - 1 Unit Price",
    "Current - 1 Unit Price Date",
    "Current - 1 List Price",
    "Current - 1 List Price Date",
    "Currency",
    "SKU/Catalog #",
    "Supplier PartAuxiliary ID",
    "Amount/UOM & UOM",
    "Product Size",
    "Product Description",
    "Shipping Method",
    "Carrier",
    "LineItem Notes",
    "Non Catalog",
    "Product Type",
    "Supplier Duns No",
    "Supplier Phone",
    "Contract No",
    "Contract Renewal No",
    "Contract Name",
    "Contract Effective Date",
    "Contract Expiration Date",
    "Contract Unit Price",
    "Contract Unit Price Variance",
    "FormId",
    "Replenishment Order",
    "Stock Item ID",
    "Stock Item Name",
    "Stock Units",
    "Stock Supplier Name",
    "Stock Supplier ID",
    "Stock FC Name",
    "Stock FC ID",
    "Line Status",
    "Manufacturer",
    "Mfr Catalog #",
    "Category Preference",
    "Category Level 1",
    "Category Level 2",
    "Category Level 3",
    "Category Level 4",
    "Category Level 5",
    "Category Name",
    "CAS #",
    "UNSPSC",
    "Commodity Code",
    "Shipping Charge",
    "Tax 1",
    "Tax 2",
    "DMR_MatchType",
    "Flex Field 1",
    "Contract Number",
    "Flex Pull 2",
    "Flex Pull 1",
    "Freight Terms",
    "Flex Field 2",
    "Reference Number",
    "Order Delivery",
    "Price Set Name",
    "Consortium Spend",
    "Original Requisition ID",
    "Original Requisition Name",
    "Original Requisition Requestor",
    "Payment Transaction ID|Payment Transaction Amount",
];

/// One normalized purchase-order line item
///
/// Text columns use the empty string for "missing"; amounts are `None` when
/// the source cell held no numeric content. `PR ID` and `Supplier Duns No`
/// are always text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "PO ID")]
    pub po_id: String,
    #[serde(rename = "Creation Date")]
    pub creation_date: String,
    #[serde(rename = "PO #")]
    pub po_number: String,
    #[serde(rename = "PR ID")]
    pub pr_id: String,
    #[serde(rename = "Buyer: First Name")]
    pub buyer_first_name: String,
    #[serde(rename = "Buyer: Last Name")]
    pub buyer_last_name: String,
    #[serde(rename = "Buyer: Email")]
    pub buyer_email: String,
    #[serde(rename = "Supplier ID")]
    pub supplier_id: String,
    #[serde(rename = "Supplier Name")]
    pub supplier_name: String,
    #[serde(rename = "Supplier Number")]
    pub supplier_number: String,
    #[serde(rename = "Supplier Duns No")]
    pub supplier_duns_no: String,
    #[serde(rename = "PO Line #")]
    pub po_line: String,
    #[serde(rename = "Quantity")]
    pub quantity: Option<f64>,
    #[serde(rename = "Unit Price")]
    pub unit_price: Option<f64>,
    #[serde(rename = "Extended Price")]
    pub extended_price: Option<f64>,
    #[serde(rename = "Currency")]
    pub currency: String,
    #[serde(rename = "SKU/Catalog #")]
    pub sku: String,
    #[serde(rename = "Supplier PartAuxiliary ID")]
    pub supplier_part_aux_id: String,
    #[serde(rename = "Amount/UOM & UOM")]
    pub unit_of_measure: String,
    #[serde(rename = "Product Description")]
    pub product_description: String,
    #[serde(rename = "Manufacturer")]
    pub manufacturer: String,
    #[serde(rename = "Mfr Catalog #")]
    pub mfr_catalog: String,
    #[serde(rename = "Category Level 1")]
    pub category_level_1: String,
    #[serde(rename = "Category Level 2")]
    pub category_level_2: String,
    #[serde(rename = "Category Level 3")]
    pub category_level_3: String,
    #[serde(rename = "Category Level 4")]
    pub category_level_4: String,
    #[serde(rename = "Category Level 5")]
    pub category_level_5: String,
    #[serde(rename = "UNSPSC")]
    pub unspsc: String,
    #[serde(rename = "Original Requisition Requestor")]
    pub requisition_requestor: String,
    /// Assigned by the indexer; absent on a freshly ingested table
    #[serde(rename = "Cluster")]
    pub cluster: Option<u32>,
}

impl TransactionRecord {
    /// Cells in [`CANONICAL_COLUMNS`] order
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.po_id.clone(),
            self.creation_date.clone(),
            self.po_number.clone(),
            self.pr_id.clone(),
            self.buyer_first_name.clone(),
            self.buyer_last_name.clone(),
            self.buyer_email.clone(),
            self.supplier_id.clone(),
            self.supplier_name.clone(),
            self.supplier_number.clone(),
            self.supplier_duns_no.clone(),
            self.po_line.clone(),
            format_amount(self.quantity),
            format_amount(self.unit_price),
            format_amount(self.extended_price),
            self.currency.clone(),
            self.sku.clone(),
            self.supplier_part_aux_id.clone(),
            self.unit_of_measure.clone(),
            self.product_description.clone(),
            self.manufacturer.clone(),
            self.mfr_catalog.clone(),
            self.category_level_1.clone(),
            self.category_level_2.clone(),
            self.category_level_3.clone(),
            self.category_level_4.clone(),
            self.category_level_5.clone(),
            self.unspsc.clone(),
            self.requisition_requestor.clone(),
        ]
    }

    /// Buyer display name from the first/last name columns, if any
    pub fn buyer_full_name(&self) -> Option<String> {
        let name = format!(
            "{} {}",
            self.buyer_first_name.trim(),
            self.buyer_last_name.trim()
        );
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn text_slot(&mut self, column: &str) -> Option<&mut String> {
        let slot = match column {
            "PO ID" => &mut self.po_id,
            "Creation Date" => &mut self.creation_date,
            "PO #" => &mut self.po_number,
            "PR ID" => &mut self.pr_id,
            "Buyer: First Name" => &mut self.buyer_first_name,
            "Buyer: Last Name" => &mut self.buyer_last_name,
            "Buyer: Email" => &mut self.buyer_email,
            "Supplier ID" => &mut self.supplier_id,
            "Supplier Name" => &mut self.supplier_name,
            "Supplier Number" => &mut self.supplier_number,
            "Supplier Duns No" => &mut self.supplier_duns_no,
            "PO Line #" => &mut self.po_line,
            "Currency" => &mut self.currency,
            "SKU/Catalog #" => &mut self.sku,
            "Supplier PartAuxiliary ID" => &mut self.supplier_part_aux_id,
            "Amount/UOM & UOM" => &mut self.unit_of_measure,
            "Product Description" => &mut self.product_description,
            "Manufacturer" => &mut self.manufacturer,
            "Mfr Catalog #" => &mut self.mfr_catalog,
            "Category Level 1" => &mut self.category_level_1,
            "Category Level 2" => &mut self.category_level_2,
            "Category Level 3" => &mut self.category_level_3,
            "Category Level 4" => &mut self.category_level_4,
            "Category Level 5" => &mut self.category_level_5,
            "UNSPSC" => &mut self.unspsc,
            "Original Requisition Requestor" => &mut self.requisition_requestor,
            _ => return None,
        };
        Some(slot)
    }

    fn amount_slot(&mut self, column: &str) -> Option<&mut Option<f64>> {
        match column {
            "Quantity" => Some(&mut self.quantity),
            "Unit Price" => Some(&mut self.unit_price),
            "Extended Price" => Some(&mut self.extended_price),
            _ => None,
        }
    }
}

/// Render an amount cell; missing amounts become an empty cell
pub fn format_amount(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Where each canonical column lives in a particular source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    /// Source cell index per entry of [`CANONICAL_COLUMNS`]
    slots: Vec<Option<usize>>,
    /// Whether the header was mapped positionally onto [`EXPORT_COLUMNS`]
    positional: bool,
}

impl SourceLayout {
    pub fn is_positional(&self) -> bool {
        self.positional
    }

    /// Canonical columns this source does not provide
    pub fn missing_columns(&self) -> Vec<&'static str> {
        CANONICAL_COLUMNS
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Source index of a canonical column, if the source has it
    pub fn source_index(&self, column: &str) -> Option<usize> {
        CANONICAL_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.slots[i])
    }
}

/// Maps raw source rows onto the canonical layout
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    /// Normalized header spelling -> canonical column index
    lookup: AHashMap<String, usize>,
    amounts: AmountParser,
}

impl SchemaNormalizer {
    /// Create a normalizer; `aliases` maps extra source header names onto
    /// canonical column names.
    pub fn new(aliases: &BTreeMap<String, String>) -> Result<Self> {
        let mut lookup = AHashMap::new();
        for (index, column) in CANONICAL_COLUMNS.iter().enumerate() {
            lookup.insert(header_key(column), index);
        }

        for (alias, target) in aliases {
            let index = CANONICAL_COLUMNS
                .iter()
                .position(|c| c == target)
                .ok_or_else(|| SupplyError::InvalidConfigValue {
                    path: format!("ingest.aliases.{}", alias),
                    message: format!("'{}' is not a canonical column", target),
                })?;
            lookup.insert(header_key(alias), index);
        }

        Ok(Self {
            lookup,
            amounts: AmountParser::new()?,
        })
    }

    /// Resolve a source header to a [`SourceLayout`].
    ///
    /// Name matching is case-insensitive and whitespace-tolerant; the first
    /// occurrence of a duplicated column wins. Fails when a required column
    /// cannot be located either by name or positionally.
    pub fn resolve(&self, header: &[String], path: &Path) -> Result<SourceLayout> {
        let mut slots = vec![None; CANONICAL_COLUMNS.len()];
        for (source_index, name) in header.iter().enumerate() {
            if let Some(&canonical) = self.lookup.get(&header_key(name)) {
                if slots[canonical].is_none() {
                    slots[canonical] = Some(source_index);
                }
            }
        }

        let by_name = SourceLayout {
            slots,
            positional: false,
        };
        let missing = missing_required(&by_name);
        if missing.is_empty() {
            return Ok(by_name);
        }

        if header.len() == EXPORT_COLUMNS.len() {
            tracing::debug!(
                "Header of {} not recognised, mapping {} columns positionally",
                path.display(),
                EXPORT_COLUMNS.len()
            );
            return Ok(Self::export_layout());
        }

        Err(SupplyError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        })
    }

    /// Positional layout of the full procurement export
    pub fn export_layout() -> SourceLayout {
        let slots = CANONICAL_COLUMNS
            .iter()
            .map(|column| EXPORT_COLUMNS.iter().position(|c| c == column))
            .collect();
        SourceLayout {
            slots,
            positional: true,
        }
    }

    /// Normalize a batch of raw rows. Pure; never fails on a cell.
    pub fn normalize(&self, layout: &SourceLayout, rows: &[Vec<String>]) -> Vec<TransactionRecord> {
        rows.iter()
            .map(|row| self.normalize_row(layout, row))
            .collect()
    }

    /// Normalize a single raw row. Short rows leave trailing columns missing.
    pub fn normalize_row(&self, layout: &SourceLayout, row: &[String]) -> TransactionRecord {
        let mut record = TransactionRecord::default();

        for (column, slot) in CANONICAL_COLUMNS.iter().zip(&layout.slots) {
            let Some(raw) = slot.and_then(|i| row.get(i)) else {
                continue;
            };

            if let Some(amount) = record.amount_slot(column) {
                *amount = self.amounts.parse(raw);
            } else if *column == "Creation Date" {
                record.creation_date = normalize_datetime(raw);
            } else if let Some(text) = record.text_slot(column) {
                *text = raw.trim().to_string();
            }
        }

        record
    }
}

fn missing_required(layout: &SourceLayout) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|c| layout.source_index(c).is_none())
        .map(|c| c.to_string())
        .collect()
}

fn header_key(name: &str) -> String {
    name.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn normalizer() -> SchemaNormalizer {
        SchemaNormalizer::new(&BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_canonical_columns_exist_in_export_layout() {
        for column in CANONICAL_COLUMNS {
            assert!(
                EXPORT_COLUMNS.contains(&column),
                "{} missing from export layout",
                column
            );
        }
    }

    #[test]
    fn test_resolve_by_name_ignores_case_and_spacing() {
        let header = strings(&["unit price", "  Supplier   Name ", "PRODUCT DESCRIPTION", "Notes"]);
        let layout = normalizer()
            .resolve(&header, &PathBuf::from("a.csv"))
            .unwrap();

        assert!(!layout.is_positional());
        assert_eq!(layout.source_index("Unit Price"), Some(0));
        assert_eq!(layout.source_index("Supplier Name"), Some(1));
        assert_eq!(layout.source_index("Product Description"), Some(2));
        assert!(layout.missing_columns().contains(&"PO ID"));
    }

    #[test]
    fn test_missing_required_columns() {
        let header = strings(&["PO ID", "Supplier Name"]);
        let result = normalizer().resolve(&header, &PathBuf::from("b.csv"));

        match result {
            Err(SupplyError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["Product Description", "Unit Price"]);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_fallback_for_full_export() {
        let header: Vec<String> = (0..EXPORT_COLUMNS.len()).map(|i| format!("c{}", i)).collect();
        let layout = normalizer()
            .resolve(&header, &PathBuf::from("export.csv"))
            .unwrap();

        assert!(layout.is_positional());
        assert_eq!(layout.source_index("PO ID"), Some(0));
        assert_eq!(layout.source_index("Product Description"), Some(58));
    }

    #[test]
    fn test_aliases() {
        let mut aliases = BTreeMap::new();
        aliases.insert("Vendor".to_string(), "Supplier Name".to_string());
        aliases.insert("Item".to_string(), "Product Description".to_string());
        aliases.insert("Price".to_string(), "Unit Price".to_string());
        let normalizer = SchemaNormalizer::new(&aliases).unwrap();

        let layout = normalizer
            .resolve(&strings(&["Item", "Vendor", "Price"]), &PathBuf::from("c.csv"))
            .unwrap();
        let record = normalizer.normalize_row(&layout, &strings(&["Steel pipe", "Acme", "$9.50"]));

        assert_eq!(record.supplier_name, "Acme");
        assert_eq!(record.product_description, "Steel pipe");
        assert_eq!(record.unit_price, Some(9.5));
    }

    #[test]
    fn test_alias_to_unknown_column_is_rejected() {
        let mut aliases = BTreeMap::new();
        aliases.insert("Vendor".to_string(), "Vendor Name".to_string());
        assert!(SchemaNormalizer::new(&aliases).is_err());
    }

    #[test]
    fn test_normalize_row_coerces_and_keeps_identifiers_as_text() {
        let normalizer = normalizer();
        let header = strings(&[
            "PR ID",
            "Supplier Duns No",
            "Unit Price",
            "Extended Price",
            "Supplier Name",
            "Product Description",
            "Creation Date",
        ]);
        let layout = normalizer.resolve(&header, &PathBuf::from("d.csv")).unwrap();

        let record = normalizer.normalize_row(
            &layout,
            &strings(&["000123", "00-456-7890", "$1,200.00", "call for quote", " Acme ", "Pipe", "2024-01-31"]),
        );

        assert_eq!(record.pr_id, "000123");
        assert_eq!(record.supplier_duns_no, "00-456-7890");
        assert_eq!(record.unit_price, Some(1200.0));
        assert_eq!(record.extended_price, None);
        assert_eq!(record.supplier_name, "Acme");
        assert_eq!(record.creation_date, "2024-01-31 00:00:00");
        assert_eq!(record.cluster, None);
    }

    #[test]
    fn test_short_rows_leave_columns_missing() {
        let normalizer = normalizer();
        let header = strings(&["Product Description", "Supplier Name", "Unit Price"]);
        let layout = normalizer.resolve(&header, &PathBuf::from("e.csv")).unwrap();

        let record = normalizer.normalize_row(&layout, &strings(&["Gloves"]));
        assert_eq!(record.product_description, "Gloves");
        assert_eq!(record.supplier_name, "");
        assert_eq!(record.unit_price, None);
    }

    #[test]
    fn test_to_row_matches_canonical_width() {
        let record = TransactionRecord {
            unit_price: Some(2.5),
            ..Default::default()
        };
        let row = record.to_row();
        assert_eq!(row.len(), CANONICAL_COLUMNS.len());
        assert_eq!(row[13], "2.5");
        assert_eq!(row[12], "");
    }

    #[test]
    fn test_buyer_full_name() {
        let mut record = TransactionRecord::default();
        assert_eq!(record.buyer_full_name(), None);

        record.buyer_first_name = "Ada".to_string();
        assert_eq!(record.buyer_full_name().as_deref(), Some("Ada"));

        record.buyer_last_name = "Lovelace".to_string();
        assert_eq!(record.buyer_full_name().as_deref(), Some("Ada Lovelace"));
    }
}
