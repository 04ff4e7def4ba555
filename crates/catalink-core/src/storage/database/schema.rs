use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::IdentityField;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}

/// SQL name of the Unicode-aware lowercase function used by substring filters.
/// SQLite's builtin `LOWER` only folds ASCII.
pub const CASEFOLD_FN: &str = "casefold";

pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        CASEFOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id                    TEXT PRIMARY KEY,
            default_code          TEXT,
            barcode               TEXT,
            code_ean              TEXT,
            name                  TEXT,
            manufacturer          TEXT,
            manufacturer_ref      TEXT,
            category              TEXT,
            country_of_origin     TEXT,
            short_description     TEXT,
            ecommerce_description TEXT,
            features_description  TEXT,
            hs_code               TEXT,
            length                REAL,
            width                 REAL,
            height                REAL,
            weight                REAL,
            list_price            REAL,
            extra                 TEXT NOT NULL DEFAULT '{}',
            confidence            TEXT NOT NULL DEFAULT '{}',
            sources               TEXT NOT NULL DEFAULT '[]',
            status                TEXT NOT NULL DEFAULT 'raw'
                                  CHECK(status IN ('raw', 'enriched', 'validated', 'exported')),
            image_count           INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_products_manufacturer_ref
            ON products(manufacturer_ref, manufacturer);
        CREATE INDEX IF NOT EXISTS idx_products_name       ON products(name);
        CREATE INDEX IF NOT EXISTS idx_products_status     ON products(status);
        CREATE INDEX IF NOT EXISTS idx_products_created_at ON products(created_at);
        ",
    )?;
    Ok(())
}

/// Index each identity column. With `unique` set the store rejects a second
/// record carrying the same value; absent values never collide.
///
/// Index names are fixed, so whichever mode first creates them sticks for the
/// lifetime of the database file.
pub fn create_identity_indexes(conn: &Connection, unique: bool) -> Result<()> {
    let kind = if unique { "UNIQUE INDEX" } else { "INDEX" };
    for field in IdentityField::PRECEDENCE {
        let col = field.as_str();
        conn.execute_batch(&format!(
            "CREATE {kind} IF NOT EXISTS idx_products_{col} ON products({col}) WHERE {col} IS NOT NULL;"
        ))?;
    }
    Ok(())
}

/// Whether the identity indexes of this database enforce uniqueness.
pub fn identity_is_unique(conn: &Connection) -> Result<bool> {
    let unique: Option<i64> = conn
        .query_row(
            "SELECT \"unique\" FROM pragma_index_list('products') WHERE name = 'idx_products_default_code'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(unique == Some(1))
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}
