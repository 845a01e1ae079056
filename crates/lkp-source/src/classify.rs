// SPDX-License-Identifier: MIT OR Apache-2.0
//! Statement classification shared by the drivers.

/// Leading keywords that mark a query string as raw statement text rather
/// than a bare procedure name.
const RAW_PREFIXES: &[&str] = &[
    "select", "with", "exec", "execute", "insert", "update", "delete",
];

/// Whether `query` should execute as raw statement text.
///
/// The check is case-insensitive and ignores leading whitespace; anything
/// else is treated as a (possibly qualified) procedure name.
#[must_use]
pub fn is_raw_statement(query: &str) -> bool {
    let first = query.trim_start().split_whitespace().next().unwrap_or("");
    RAW_PREFIXES
        .iter()
        .any(|prefix| first.eq_ignore_ascii_case(prefix))
}

/// Strip a tolerated leading bind sigil (`:` or `@`) from a parameter name.
#[must_use]
pub fn clean_parameter_name(name: &str) -> &str {
    name.trim_start_matches([':', '@'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_classify_as_raw_text() {
        assert!(is_raw_statement("SELECT * FROM trades"));
        assert!(is_raw_statement("  with cte as (select 1) select * from cte"));
        assert!(is_raw_statement("ExEc dbo.sp_refresh"));
        assert!(is_raw_statement("EXECUTE dbo.sp_refresh"));
        assert!(is_raw_statement("insert into t values (1)"));
        assert!(is_raw_statement("UPDATE t SET x = 1"));
        assert!(is_raw_statement("delete from t"));
    }

    #[test]
    fn procedure_names_are_not_raw_text() {
        assert!(!is_raw_statement("dbo.sp_GetDailyTrades"));
        assert!(!is_raw_statement("pkg_exports.daily_headcount"));
        assert!(!is_raw_statement("selecting_things")); // whole-word match only
        assert!(!is_raw_statement(""));
    }

    #[test]
    fn parameter_sigils_are_stripped() {
        assert_eq!(clean_parameter_name(":p_start"), "p_start");
        assert_eq!(clean_parameter_name("@StartDate"), "StartDate");
        assert_eq!(clean_parameter_name("plain"), "plain");
    }
}
