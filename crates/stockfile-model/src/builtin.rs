//! Schemas for the workbooks the business actually sends us.

use crate::document::DocumentType;
use crate::schema::{ColumnSchema, DocumentSchema, RuleKind, SheetSchema, ValueType};

fn material() -> ColumnSchema {
    ColumnSchema::new("Material", ValueType::String)
        .aliases(["Material Code", "Material No", "Material Number", "Material No."])
        .required()
        .rule(RuleKind::MinLength(1), "Material code is missing")
}

fn material_description() -> ColumnSchema {
    ColumnSchema::new("Material Description", ValueType::String)
        .aliases(["Material Desc", "Material Desc.", "Description"])
}

fn stock_columns() -> Vec<ColumnSchema> {
    vec![
        material(),
        material_description().required(),
        ColumnSchema::new("Plant", ValueType::String)
            .aliases(["Plant Code", "Plnt"])
            .required(),
        ColumnSchema::new("Storage Location", ValueType::String)
            .aliases(["SLoc", "Stor. Loc.", "Storage Loc"]),
        ColumnSchema::new("Batch", ValueType::String).aliases(["Batch No", "Batch Number"]),
        ColumnSchema::new("Stock", ValueType::Number)
            .aliases(["Unrestricted Stock", "Unrestricted", "Stock Qty", "Closing Stock"])
            .required(),
        ColumnSchema::new("Base Unit of Measure", ValueType::String)
            .aliases(["BUn", "UoM", "Unit", "Base Unit"])
            .rule(RuleKind::MaxLength(8), "Unit of measure looks malformed"),
        ColumnSchema::new("Currency", ValueType::String)
            .aliases(["Crcy", "Curr"])
            .rule(
                RuleKind::Regex("^[A-Za-z]{3}$".to_string()),
                "Currency should be a 3-letter ISO code",
            ),
        ColumnSchema::new("Total Stock Value", ValueType::Number)
            .aliases(["Stock Value", "Total Value", "Value of Stock"])
            .required(),
    ]
}

pub fn inventory_schema() -> DocumentSchema {
    DocumentSchema::new(DocumentType::Inventory, "Inventory")
        .sheet(
            SheetSchema::new("FG Value", DocumentType::Inventory)
                .aliases(["FG", "FG Stock", "Finished Goods", "Inventory"])
                .columns(stock_columns()),
        )
        .sheet(
            SheetSchema::new("RPM", DocumentType::Inventory)
                .aliases(["RPM Value", "RPM Stock", "Raw Material", "Raw and Packing Material"])
                .columns(stock_columns())
                .optional(),
        )
}

fn open_quantity() -> ColumnSchema {
    ColumnSchema::new("Open Quantity", ValueType::Number)
        .aliases(["Open Qty", "OSR Qty", "Pending Qty", "Pending Quantity"])
}

fn open_value() -> ColumnSchema {
    ColumnSchema::new("Open Value", ValueType::Number)
        .aliases(["OSR Value", "Pending Value", "Net Value"])
        .required()
}

pub fn osr_schema() -> DocumentSchema {
    DocumentSchema::new(DocumentType::Osr, "Open Sales Orders")
        .sheet(
            SheetSchema::new("OSR Main Sheet HC", DocumentType::Osr)
                .aliases(["OSR Main Sheet", "OSR Main", "Main Sheet HC", "OSR HC"])
                .columns([
                    ColumnSchema::new("Customer Name", ValueType::String)
                        .aliases(["Customer", "Sold-to Party Name", "Party Name"])
                        .required(),
                    ColumnSchema::new("Sales Document", ValueType::String)
                        .aliases(["Sales Order", "SO Number", "SO No", "Sales Doc."])
                        .required()
                        .rule(RuleKind::MinLength(1), "Sales document number is missing"),
                    material(),
                    material_description(),
                    ColumnSchema::new("Order Quantity", ValueType::Number)
                        .aliases(["Order Qty", "SO Qty"]),
                    open_quantity()
                        .required()
                        .rule(RuleKind::Min(0.0), "Open quantity should not be negative"),
                    open_value(),
                    ColumnSchema::new("Delivery Date", ValueType::Date)
                        .aliases(["Req. Delivery Date", "Delivery Dt", "Due Date"]),
                    ColumnSchema::new("Plant", ValueType::String).aliases(["Plant Code", "Plnt"]),
                    ColumnSchema::new("Region", ValueType::String).aliases(["Zone", "Branch"]),
                ]),
        )
        .sheet(
            SheetSchema::new("OSR Summary", DocumentType::Osr)
                .aliases(["Summary", "OSR Summary Sheet"])
                .columns([
                    ColumnSchema::new("Region", ValueType::String)
                        .aliases(["Zone", "Branch"])
                        .required(),
                    open_quantity(),
                    open_value(),
                ])
                .optional(),
        )
}

pub fn builtin_schemas() -> Vec<DocumentSchema> {
    vec![inventory_schema(), osr_schema()]
}
