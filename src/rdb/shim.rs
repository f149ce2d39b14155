//! Dialect shims: source-to-source transforms applied between parsing and
//! execution. The input dialect is always SQLite; targets normalize what
//! the backend cannot express natively.

use sqlparser::ast::{ColumnDef, ColumnOption, DataType, Ident, ObjectName, Statement};
use sqlparser::tokenizer::Token;

/// Rewrites SQLite auto-increment columns for PostgreSQL.
///
/// SQLite aliases `INTEGER PRIMARY KEY` to `rowid` even without the
/// `AUTOINCREMENT` keyword, so any integer primary-key column becomes
/// `serial`, with the `AUTOINCREMENT` flag stripped and the `PRIMARY KEY`
/// constraint kept. Everything that is not a `CREATE TABLE` passes through
/// unchanged.
pub(crate) fn ddl_shim_postgres(stmt: Statement) -> Statement {
    let Statement::CreateTable(mut create) = stmt else {
        return stmt;
    };

    for col in &mut create.columns {
        if !is_auto_increment_column(col) {
            continue;
        }
        col.data_type = DataType::Custom(ObjectName(vec![Ident::new("serial")]), vec![]);
        col.options.retain(|def| !is_autoincrement_option(&def.option));
    }

    Statement::CreateTable(create)
}

fn is_auto_increment_column(col: &ColumnDef) -> bool {
    if !matches!(col.data_type, DataType::Int(_) | DataType::Integer(_)) {
        return false;
    }
    col.options.iter().any(|def| {
        matches!(
            def.option,
            ColumnOption::Unique {
                is_primary: true,
                ..
            }
        )
    })
}

fn is_autoincrement_option(option: &ColumnOption) -> bool {
    let ColumnOption::DialectSpecific(tokens) = option else {
        return false;
    };
    tokens
        .iter()
        .any(|t| matches!(t, Token::Word(w) if w.value.eq_ignore_ascii_case("AUTOINCREMENT")))
}

/// Rewrites `?` placeholders to `$1, $2, ...` in source order for
/// PostgreSQL, returning the rewritten statement and the placeholder count.
///
/// Characters inside single- or double-quoted string literals are skipped;
/// a doubled quote (`''`, `""`) is an escape and stays inside the literal.
pub(crate) fn rewrite_placeholders_postgres(stmt: &str) -> (String, usize) {
    let mut out = String::with_capacity(stmt.len() + 8);
    let mut index = 0usize;
    let mut in_string = false;
    let mut quote = '\0';

    let mut chars = stmt.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' || ch == '"' {
            if !in_string {
                in_string = true;
                quote = ch;
            } else if ch == quote {
                if chars.peek() == Some(&quote) {
                    out.push(ch);
                    out.push(chars.next().unwrap_or(quote));
                    continue;
                }
                in_string = false;
            }
            out.push(ch);
            continue;
        }

        if !in_string && ch == '?' {
            index += 1;
            out.push('$');
            out.push_str(&index.to_string());
            continue;
        }

        out.push(ch);
    }

    (out, index)
}

/// Counts `?` placeholders outside string literals, with the same quoting
/// rules as [`rewrite_placeholders_postgres`]. SQLite statements keep their
/// placeholders as-is, so only the count is needed for validation.
pub(crate) fn count_placeholders(stmt: &str) -> usize {
    let mut count = 0usize;
    let mut in_string = false;
    let mut quote = '\0';

    let mut chars = stmt.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' || ch == '"' {
            if !in_string {
                in_string = true;
                quote = ch;
            } else if ch == quote {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    continue;
                }
                in_string = false;
            }
            continue;
        }

        if !in_string && ch == '?' {
            count += 1;
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::SQLiteDialect;
    use sqlparser::parser::Parser;

    fn parse_one(sql: &str) -> Statement {
        Parser::parse_sql(&SQLiteDialect {}, sql)
            .expect("parse")
            .remove(0)
    }

    #[test]
    fn rewrites_placeholders_in_order() {
        let (sql, n) = rewrite_placeholders_postgres("INSERT INTO t(a, b, c) VALUES (?, ?, ?)");
        assert_eq!(sql, "INSERT INTO t(a, b, c) VALUES ($1, $2, $3)");
        assert_eq!(n, 3);
    }

    #[test]
    fn skips_placeholders_inside_string_literals() {
        let (sql, n) = rewrite_placeholders_postgres(
            "INSERT INTO t(name, note) VALUES (?, 'has ? inside')",
        );
        assert_eq!(sql, "INSERT INTO t(name, note) VALUES ($1, 'has ? inside')");
        assert_eq!(n, 1);
    }

    #[test]
    fn doubled_quotes_stay_inside_the_literal() {
        let (sql, n) = rewrite_placeholders_postgres("SELECT 'it''s a ? test', ? FROM t");
        assert_eq!(sql, "SELECT 'it''s a ? test', $1 FROM t");
        assert_eq!(n, 1);

        let (sql, n) = rewrite_placeholders_postgres(r#"SELECT "a""b?", ? FROM t"#);
        assert_eq!(sql, r#"SELECT "a""b?", $1 FROM t"#);
        assert_eq!(n, 1);
    }

    #[test]
    fn counts_placeholders_with_quoting_rules() {
        assert_eq!(count_placeholders("SELECT * FROM t WHERE a = ? AND b = ?"), 2);
        assert_eq!(count_placeholders("SELECT '?' FROM t WHERE a = ?"), 1);
        assert_eq!(count_placeholders("SELECT 'no placeholders here'"), 0);
    }

    #[test]
    fn integer_primary_key_becomes_serial() {
        let stmt = parse_one(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
        );
        let rendered = ddl_shim_postgres(stmt).to_string().to_lowercase();
        assert!(rendered.contains("id serial primary key"), "{rendered}");
        assert!(!rendered.contains("autoincrement"), "{rendered}");
        assert!(rendered.contains("name text not null"), "{rendered}");
    }

    #[test]
    fn integer_primary_key_without_autoincrement_also_converts() {
        let stmt = parse_one("CREATE TABLE a (id INTEGER PRIMARY KEY, n INTEGER)");
        let rendered = ddl_shim_postgres(stmt).to_string().to_lowercase();
        assert!(rendered.contains("id serial primary key"), "{rendered}");
        assert!(rendered.contains("n integer"), "{rendered}");
    }

    #[test]
    fn int_alias_converts_too() {
        let stmt = parse_one("CREATE TABLE a (id INT PRIMARY KEY)");
        let rendered = ddl_shim_postgres(stmt).to_string().to_lowercase();
        assert!(rendered.contains("id serial primary key"), "{rendered}");
    }

    #[test]
    fn non_integer_primary_key_is_untouched() {
        let stmt = parse_one("CREATE TABLE a (id TEXT PRIMARY KEY, n INTEGER)");
        let rendered = ddl_shim_postgres(stmt).to_string().to_lowercase();
        assert!(rendered.contains("id text primary key"), "{rendered}");
        assert!(!rendered.contains("serial"), "{rendered}");
    }

    #[test]
    fn non_create_table_ddl_passes_through() {
        let stmt = parse_one("DROP TABLE a");
        let rendered = ddl_shim_postgres(stmt).to_string();
        assert_eq!(rendered, "DROP TABLE a");
    }
}
