use std::sync::MutexGuard;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{CatalinkError, Result};
use crate::models::{
    ExtractionStatus, FieldValue, IdentityField, ProductField, ProductPatch, ProductRecord,
    ProductSummary, StoredProduct,
};
use crate::storage::filter::Filter;

use super::Repository;

/// Column list matching `row_to_product`; fields 1..=17 follow `ProductField::ALL`.
const PRODUCT_COLUMNS: &str = "id, default_code, barcode, code_ean, name, manufacturer,
    manufacturer_ref, category, country_of_origin, short_description, ecommerce_description,
    features_description, hs_code, length, width, height, weight, list_price,
    extra, confidence, sources, status, image_count, created_at, updated_at";

pub(crate) const SUMMARY_COLUMNS: &str =
    "id, name, default_code, barcode, manufacturer, status, image_count, created_at";

/// Creation order, then insertion order for records created in the same instant.
pub(crate) const STORE_ORDER: &str = "created_at ASC, rowid ASC";

pub trait ProductRepository: Repository<Entity = StoredProduct, Id = Uuid> {
    fn find(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredProduct>>;
    fn count(&self, filter: &Filter) -> Result<usize>;
    fn update(&self, id: &Uuid, patch: &ProductPatch) -> Result<usize>;
}

pub struct SqliteProductRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteProductRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<StoredProduct> {
        let mut record = ProductRecord::default();
        for (i, field) in ProductField::ALL.into_iter().enumerate() {
            let col = i + 1;
            if field.is_numeric() {
                if let Some(n) = row.get::<_, Option<f64>>(col)? {
                    record.set(field, FieldValue::Number(n));
                }
            } else if let Some(s) = row.get::<_, Option<String>>(col)? {
                record.set(field, FieldValue::Text(s));
            }
        }
        record.extra = parse_json(row, 18)?;

        Ok(StoredProduct {
            id: parse_uuid(row, 0)?,
            record,
            confidence: parse_json(row, 19)?,
            sources: parse_json(row, 20)?,
            status: parse_status(row, 21)?,
            image_count: row.get(22)?,
            created_at: parse_timestamp(row, 23)?,
            updated_at: parse_timestamp(row, 24)?,
        })
    }
}

pub(crate) fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<ProductSummary> {
    Ok(ProductSummary {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        default_code: row.get(2)?,
        barcode: row.get(3)?,
        manufacturer: row.get(4)?,
        status: parse_status(row, 5)?,
        image_count: row.get(6)?,
        created_at: parse_timestamp(row, 7)?,
    })
}

fn parse_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<ExtractionStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn column_value(field: ProductField, value: &FieldValue) -> Option<Value> {
    match value {
        FieldValue::Number(n) if field.is_numeric() => Some(Value::Real(*n)),
        FieldValue::Number(n) => Some(Value::Text(n.to_string())),
        FieldValue::Text(s) if field.is_numeric() => s.trim().parse::<f64>().ok().map(Value::Real),
        FieldValue::Text(s) => Some(Value::Text(s.trim().to_string())),
    }
}

/// Turn a unique-index failure into `UniqueViolation`, naming the identity
/// column from the SQLite message (`UNIQUE constraint failed: products.barcode`).
fn map_write_error(
    err: rusqlite::Error,
    value_of: impl Fn(IdentityField) -> Option<String>,
) -> CatalinkError {
    if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
        if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            let column = msg.rsplit('.').next().unwrap_or_default().trim();
            if let Ok(field) = column.parse::<IdentityField>() {
                return CatalinkError::UniqueViolation {
                    field,
                    value: value_of(field).unwrap_or_default(),
                };
            }
        }
    }
    err.into()
}

impl<'a> Repository for SqliteProductRepository<'a> {
    type Entity = StoredProduct;
    type Id = Uuid;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = self
            .conn
            .query_row(&sql, params![id.to_string()], Self::row_to_product)
            .optional()?;
        Ok(product)
    }

    fn insert(&self, product: &Self::Entity) -> Result<()> {
        let record = &product.record;
        let mut values = vec![Value::Text(product.id.to_string())];
        for field in ProductField::ALL {
            let value = record
                .get(field)
                .and_then(|v| column_value(field, &v))
                .unwrap_or(Value::Null);
            values.push(value);
        }
        values.push(Value::Text(serde_json::to_string(&record.extra)?));
        values.push(Value::Text(serde_json::to_string(&product.confidence)?));
        values.push(Value::Text(serde_json::to_string(&product.sources)?));
        values.push(Value::Text(product.status.to_string()));
        values.push(Value::Integer(i64::from(product.image_count)));
        values.push(Value::Text(format_timestamp(&product.created_at)));
        values.push(Value::Text(format_timestamp(&product.updated_at)));

        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ({placeholders})");
        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| map_write_error(e, |f| record.text(f.field()).map(str::to_string)))?;
        Ok(())
    }
}

impl<'a> ProductRepository for SqliteProductRepository<'a> {
    fn find(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredProduct>> {
        let (clause, mut values) = filter.where_clause();
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {clause} ORDER BY {STORE_ORDER} LIMIT ?"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::row_to_product)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self, filter: &Filter) -> Result<usize> {
        let (clause, values) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM products WHERE {clause}");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Apply `patch` in one `UPDATE`; returns the number of rows modified.
    fn update(&self, id: &Uuid, patch: &ProductPatch) -> Result<usize> {
        let mut sets = Vec::new();
        let mut values = Vec::new();

        for (field, value) in &patch.fields {
            if let Some(v) = column_value(*field, value) {
                sets.push(format!("{} = ?", field.as_str()));
                values.push(v);
            }
        }
        if let Some(confidence) = &patch.confidence {
            sets.push("confidence = ?".to_string());
            values.push(Value::Text(serde_json::to_string(confidence)?));
        }
        if let Some(sources) = &patch.sources {
            sets.push("sources = ?".to_string());
            values.push(Value::Text(serde_json::to_string(sources)?));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?".to_string());
            values.push(Value::Text(status.to_string()));
        }
        sets.push("updated_at = ?".to_string());
        values.push(Value::Text(format_timestamp(&patch.updated_at)));
        values.push(Value::Text(id.to_string()));

        let sql = format!("UPDATE products SET {} WHERE id = ?", sets.join(", "));
        let modified = self
            .conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| {
                map_write_error(e, |f| patch.fields.get(&f.field()).map(|v| v.to_string()))
            })?;
        Ok(modified)
    }
}
