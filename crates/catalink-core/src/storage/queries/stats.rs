use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

use crate::error::Result;
use crate::models::ExtractionStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub total: usize,
    pub with_default_code: usize,
    pub with_barcode: usize,
    pub with_code_ean: usize,
    pub without_identity: usize,
    pub raw: usize,
    pub enriched: usize,
    pub validated: usize,
    pub exported: usize,
    pub with_images: usize,
}

pub struct ProductStatsQuery<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> ProductStatsQuery<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    pub fn get_stats(&self) -> Result<ProductStats> {
        let total = self.count_where("1")?;
        let with_default_code = self.count_where("default_code IS NOT NULL")?;
        let with_barcode = self.count_where("barcode IS NOT NULL")?;
        let with_code_ean = self.count_where("code_ean IS NOT NULL")?;
        let without_identity = self.count_where(
            "default_code IS NULL AND barcode IS NULL AND code_ean IS NULL",
        )?;
        let with_images = self.count_where("image_count > 0")?;

        Ok(ProductStats {
            total,
            with_default_code,
            with_barcode,
            with_code_ean,
            without_identity,
            raw: self.count_by_status(ExtractionStatus::Raw)?,
            enriched: self.count_by_status(ExtractionStatus::Enriched)?,
            validated: self.count_by_status(ExtractionStatus::Validated)?,
            exported: self.count_by_status(ExtractionStatus::Exported)?,
            with_images,
        })
    }

    pub fn count_by_status(&self, status: ExtractionStatus) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE status = ?1",
            rusqlite::params![status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_where(&self, clause: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM products WHERE {clause}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
