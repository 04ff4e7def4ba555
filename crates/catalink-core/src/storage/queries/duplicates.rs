use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

use crate::error::Result;
use crate::models::{IdentityField, ProductSummary};
use crate::storage::repositories::product_repository::{
    STORE_ORDER, SUMMARY_COLUMNS, row_to_summary,
};

/// Parameters of a group-by-identity aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub field: IdentityField,
    pub min_count: usize,
    pub skip: usize,
    pub limit: usize,
}

impl GroupSpec {
    pub fn new(field: IdentityField) -> Self {
        Self {
            field,
            min_count: 2,
            skip: 0,
            limit: 50,
        }
    }
}

/// One value of the grouped field with every record carrying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityGroupRow {
    pub value: String,
    pub count: usize,
    pub members: Vec<ProductSummary>,
}

pub struct IdentityGroupQuery<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> IdentityGroupQuery<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    /// Groups with at least `spec.min_count` members, largest first (ties by
    /// value), paginated. The second element counts every qualifying group.
    pub fn run(&self, spec: &GroupSpec) -> Result<(Vec<IdentityGroupRow>, usize)> {
        let col = spec.field.as_str();
        let min_count = spec.min_count as i64;
        let grouped = format!(
            "FROM products WHERE {col} IS NOT NULL AND TRIM({col}) != ''
             GROUP BY {col} HAVING COUNT(*) >= ?1"
        );

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM (SELECT 1 {grouped})"),
            params![min_count],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {col}, COUNT(*) AS n {grouped} ORDER BY n DESC, {col} ASC LIMIT ?2 OFFSET ?3"
        ))?;
        let keys = stmt
            .query_map(
                params![min_count, spec.limit as i64, spec.skip as i64],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut members_stmt = self.conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM products WHERE {col} = ?1 ORDER BY {STORE_ORDER}"
        ))?;
        let mut groups = Vec::with_capacity(keys.len());
        for (value, count) in keys {
            let members = members_stmt
                .query_map(params![value], row_to_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            groups.push(IdentityGroupRow {
                value,
                count: count as usize,
                members,
            });
        }

        Ok((groups, total as usize))
    }
}
