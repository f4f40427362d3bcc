pub mod csv_bars;
pub mod memory;
pub mod postgres_bars;
pub mod postgres_work_items;

/// Table names are interpolated into SQL text (they cannot be bind
/// parameters), so they are restricted to identifier characters up front.
pub(crate) fn validate_table_name(table: &str) -> Result<(), String> {
    if table.is_empty() {
        return Err("table name is empty".to_string());
    }
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(format!("invalid table name: {table}"));
    }
    for part in parts {
        let mut chars = part.chars();
        let Some(first) = chars.next() else {
            return Err(format!("invalid table name: {table}"));
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(format!("invalid table name: {table}"));
        }
        if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(format!("invalid table name: {table}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_table_name;

    #[test]
    fn validate_table_name_accepts_schema_qualified_names() {
        assert!(validate_table_name("work_items").is_ok());
        assert!(validate_table_name("public.work_items").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("items;drop").is_err());
        assert!(validate_table_name("a.b.c").is_err());
    }
}
