//! SQL statement splitting for migration scripts.
//!
//! Migration files may contain several statements. They are split on the
//! statement-terminating `;`, honoring the contexts where a semicolon is
//! not a terminator:
//!
//! - single-quoted string literals (`'...'`, `''` escapes a quote)
//! - double-quoted identifiers (`"..."`, `""` escapes a quote)
//! - line comments (`-- ...` up to the end of line)
//! - block comments (`/* ... */`)
//!
//! Fragments that are empty or contain only whitespace and comments are
//! dropped, so trailing semicolons and comment-only files are harmless.

/// Split a migration script into individual SQL statements.
///
/// The terminating semicolon is not included in the returned statements.
/// A final statement without a trailing semicolon is kept.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum State {
        Normal,
        SingleQuote,
        DoubleQuote,
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                ';' => {
                    push_statement(&mut statements, &mut current);
                    continue;
                }
                '\'' => {
                    state = State::SingleQuote;
                }
                '"' => {
                    state = State::DoubleQuote;
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                }
                _ => {}
            },
            State::SingleQuote => {
                if c == '\'' {
                    // '' inside a string is an escaped quote, not a close.
                    if chars.peek() == Some(&'\'') {
                        current.push(c);
                        current.push(chars.next().unwrap_or('\''));
                        continue;
                    }
                    state = State::Normal;
                }
            }
            State::DoubleQuote => {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        current.push(c);
                        current.push(chars.next().unwrap_or('"'));
                        continue;
                    }
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    current.push(c);
                    current.push(chars.next().unwrap_or('/'));
                    state = State::Normal;
                    continue;
                }
            }
        }
        current.push(c);
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let fragment = std::mem::take(current);
    if has_sql_content(&fragment) {
        statements.push(fragment.trim().to_string());
    }
}

/// Whether a fragment contains anything beyond whitespace and comments.
fn has_sql_content(fragment: &str) -> bool {
    let mut chars = fragment.chars().peekable();
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        match c {
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                in_line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block_comment = true;
            }
            c if c.is_whitespace() => {}
            _ => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        let stmts = split_statements("CREATE TABLE a(x INT); CREATE TABLE b(y INT);");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE a(x INT)");
        assert_eq!(stmts[1], "CREATE TABLE b(y INT)");
    }

    #[test]
    fn keeps_final_statement_without_semicolon() {
        let stmts = split_statements("SELECT 1; SELECT 2");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn semicolon_inside_single_quotes_is_not_a_terminator() {
        let stmts = split_statements("INSERT INTO t VALUES ('a;b'); DELETE FROM t;");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("'a;b'"));
    }

    #[test]
    fn escaped_quote_does_not_close_the_string() {
        let stmts = split_statements("INSERT INTO t VALUES ('it''s; fine');");
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("it''s; fine"));
    }

    #[test]
    fn semicolon_inside_double_quoted_identifier() {
        let stmts = split_statements(r#"CREATE TABLE "odd;name" (x INT);"#);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn semicolon_inside_line_comment() {
        let stmts = split_statements("CREATE TABLE a(x INT); -- trailing; comment\nDROP TABLE a;");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[1].starts_with("-- trailing"));
        assert!(stmts[1].contains("DROP TABLE a"));
    }

    #[test]
    fn semicolon_inside_block_comment() {
        let stmts = split_statements("/* setup; phase */ CREATE TABLE a(x INT);");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn comment_only_fragments_are_dropped() {
        assert!(split_statements("-- nothing here\n").is_empty());
        assert!(split_statements("/* nothing */ ;").is_empty());
        assert!(split_statements("  \n\t ").is_empty());
    }

    #[test]
    fn deterministic_for_same_input() {
        let script = "CREATE TABLE t(a); INSERT INTO t VALUES (';'); -- done\n";
        assert_eq!(split_statements(script), split_statements(script));
    }
}
