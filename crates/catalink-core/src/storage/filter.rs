use rusqlite::types::Value;

use super::database::schema::CASEFOLD_FN;
use crate::models::ProductField;

/// Predicate over stored products, compiled to a SQL `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Exact equality on a field.
    Eq(ProductField, String),
    /// Exact equality with any of the given values.
    In(ProductField, Vec<String>),
    /// Case-insensitive substring match.
    Contains(ProductField, String),
    /// Field is present and not blank.
    NonEmpty(ProductField),
    Any(Vec<Filter>),
    All(Vec<Filter>),
}

impl Filter {
    /// Matches every product.
    pub fn all() -> Self {
        Filter::All(Vec::new())
    }

    pub fn eq(field: ProductField, value: impl Into<String>) -> Self {
        Filter::Eq(field, value.into())
    }

    /// Field contains at least one of `needles`, ignoring case.
    pub fn contains_any<I, S>(field: ProductField, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Any(
            needles
                .into_iter()
                .map(|n| Filter::Contains(field, n.into()))
                .collect(),
        )
    }

    /// Append the SQL for this filter to `sql`, pushing bound values to `params`
    /// in placeholder order.
    pub fn to_sql(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Filter::Eq(field, value) => {
                sql.push_str(&format!("{} = ?", field.as_str()));
                params.push(bind(*field, value));
            }
            Filter::In(_, values) if values.is_empty() => sql.push('0'),
            Filter::In(field, values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!("{} IN ({placeholders})", field.as_str()));
                params.extend(values.iter().map(|v| bind(*field, v)));
            }
            Filter::Contains(field, needle) => {
                sql.push_str(&format!(
                    "{CASEFOLD_FN}(CAST({} AS TEXT)) LIKE ? ESCAPE '\\'",
                    field.as_str()
                ));
                params.push(Value::Text(format!("%{}%", escape_like(&needle.to_lowercase()))));
            }
            Filter::NonEmpty(field) if field.is_numeric() => {
                sql.push_str(&format!("{} IS NOT NULL", field.as_str()));
            }
            Filter::NonEmpty(field) => {
                let col = field.as_str();
                sql.push_str(&format!("({col} IS NOT NULL AND TRIM({col}) != '')"));
            }
            Filter::Any(filters) => join(filters, " OR ", "0", sql, params),
            Filter::All(filters) => join(filters, " AND ", "1", sql, params),
        }
    }

    pub fn where_clause(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.to_sql(&mut sql, &mut params);
        (sql, params)
    }
}

fn join(filters: &[Filter], sep: &str, empty: &str, sql: &mut String, params: &mut Vec<Value>) {
    if filters.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            sql.push_str(sep);
        }
        filter.to_sql(sql, params);
    }
    sql.push(')');
}

fn bind(field: ProductField, value: &str) -> Value {
    if field.is_numeric() {
        if let Ok(n) = value.trim().parse::<f64>() {
            return Value::Real(n);
        }
    }
    Value::Text(value.to_string())
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_clause() {
        let (sql, params) = Filter::eq(ProductField::Barcode, "123").where_clause();
        assert_eq!(sql, "barcode = ?");
        assert_eq!(params, vec![Value::Text("123".to_string())]);
    }

    #[test]
    fn test_contains_any_escapes_wildcards() {
        let (sql, params) =
            Filter::contains_any(ProductField::DefaultCode, ["AB_1", "50%"]).where_clause();
        assert_eq!(
            sql,
            "(casefold(CAST(default_code AS TEXT)) LIKE ? ESCAPE '\\' OR casefold(CAST(default_code AS TEXT)) LIKE ? ESCAPE '\\')"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("%ab\\_1%".to_string()),
                Value::Text("%50\\%%".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_combinators() {
        assert_eq!(Filter::all().where_clause().0, "1");
        assert_eq!(Filter::Any(Vec::new()).where_clause().0, "0");
        assert_eq!(Filter::In(ProductField::Barcode, Vec::new()).where_clause().0, "0");
    }

    #[test]
    fn test_nested_filters() {
        let filter = Filter::All(vec![
            Filter::NonEmpty(ProductField::DefaultCode),
            Filter::In(
                ProductField::Barcode,
                vec!["1".to_string(), "2".to_string()],
            ),
        ]);
        let (sql, params) = filter.where_clause();
        assert_eq!(
            sql,
            "((default_code IS NOT NULL AND TRIM(default_code) != '') AND barcode IN (?, ?))"
        );
        assert_eq!(params.len(), 2);
    }
}
