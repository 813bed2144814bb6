//! Row extraction helpers that fold decode failures into
//! [`StoreError::CorruptRow`] instead of panicking mid-query.

use crate::errors::StoreError;

/// Get a required column value from a row.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string column into an enum.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Escape LIKE special characters for safe pattern matching.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use homolog_core::HomologationStatus;

    #[test]
    fn escape_like_special_chars() {
        assert_eq!(escape_like("payroll"), "payroll");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("foo_bar"), "foo\\_bar");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("%_\\"), "\\%\\_\\\\");
    }

    #[test]
    fn parse_enum_success() {
        let result: Result<HomologationStatus, _> =
            parse_enum("approved", "homologations", "status");
        assert_eq!(result.unwrap(), HomologationStatus::Approved);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<HomologationStatus, _> =
            parse_enum("APPROVED", "homologations", "status");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "homologations", column: "status", .. })
        ));
    }

}
