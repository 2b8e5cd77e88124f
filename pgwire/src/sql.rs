//! Sql string operation.
use std::str::CharIndices;

/// Type that represent sql string.
pub trait Sql {
    /// Returns sql string.
    fn sql(&self) -> &str;

    /// Return `true` if current statement should be cached.
    fn persistent(&self) -> bool;
}

impl Sql for &str {
    fn sql(&self) -> &str {
        self
    }

    fn persistent(&self) -> bool {
        true
    }
}

/// Non persistent query string.
#[derive(Debug)]
pub struct SqlOnce<'sql>(&'sql str);

impl Sql for SqlOnce<'_> {
    fn sql(&self) -> &str {
        self.0
    }

    fn persistent(&self) -> bool {
        false
    }
}

/// Extension trait for easier query persistence config.
pub trait SqlExt<'a> {
    /// Disable statement caching.
    fn once(self) -> SqlOnce<'a>;
}

impl<'a> SqlExt<'a> for &'a str {
    fn once(self) -> SqlOnce<'a> {
        SqlOnce(self)
    }
}

impl<'a> SqlExt<'a> for SqlOnce<'a> {
    fn once(self) -> SqlOnce<'a> {
        self
    }
}

/// Owned sql string produced by [`rewrite_named_args`].
#[derive(Debug)]
pub struct NamedSql(String);

impl Sql for NamedSql {
    fn sql(&self) -> &str {
        &self.0
    }

    fn persistent(&self) -> bool {
        true
    }
}

/// Rewrite `@name` placeholders into positional `$1`, `$2`, … parameters.
///
/// A placeholder is `@` followed by an identifier (`[A-Za-z_][A-Za-z0-9_]*`).
/// Occurrences inside single-quoted string literals, double-quoted
/// identifiers, `--` line comments, and `/* … */` block comments (which may
/// nest) are left untouched. Returns the rewritten sql alongside the
/// distinct parameter names in the order each first claimed a positional
/// index, so `names[0]` is bound to `$1`, `names[1]` to `$2`, and so on.
pub fn rewrite_named_args(sql: &str) -> (NamedSql, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '\'' => {
                out.push(c);
                copy_quoted(&mut chars, &mut out, '\'');
            },
            '"' => {
                out.push(c);
                copy_quoted(&mut chars, &mut out, '"');
            },
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(c);
                for (_, next) in chars.by_ref() {
                    out.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            },
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push(c);
                out.push('*');
                chars.next();
                let mut depth = 1usize;
                while depth > 0 {
                    match chars.next() {
                        Some((_, '/')) if matches!(chars.peek(), Some((_, '*'))) => {
                            out.push('/');
                            out.push('*');
                            chars.next();
                            depth += 1;
                        },
                        Some((_, '*')) if matches!(chars.peek(), Some((_, '/'))) => {
                            out.push('*');
                            out.push('/');
                            chars.next();
                            depth -= 1;
                        },
                        Some((_, ch)) => out.push(ch),
                        None => break,
                    }
                }
            },
            '@' if chars.peek().is_some_and(|&(_, n)| n.is_alphabetic() || n == '_') => {
                let mut name = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let index = match names.iter().position(|existing| existing == &name) {
                    Some(i) => i,
                    None => {
                        names.push(name);
                        names.len() - 1
                    },
                };
                out.push('$');
                out.push_str(itoa::Buffer::new().format(index + 1));
            },
            _ => out.push(c),
        }
    }

    (NamedSql(out), names)
}

fn copy_quoted(chars: &mut std::iter::Peekable<CharIndices<'_>>, out: &mut String, quote: char) {
    for (_, c) in chars.by_ref() {
        out.push(c);
        if c == quote {
            if matches!(chars.peek(), Some((_, n)) if *n == quote) {
                let (_, n) = chars.next().unwrap();
                out.push(n);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_distinct_named_args_in_order() {
        let (sql, names) = rewrite_named_args(
            "select * from widgets where foo = @foo and bar = @bar",
        );
        assert_eq!(sql.sql(), "select * from widgets where foo = $1 and bar = $2");
        assert_eq!(names, vec!["foo", "bar"]);
    }

    #[test]
    fn repeated_name_reuses_the_same_index() {
        let (sql, names) = rewrite_named_args("select @x + @x");
        assert_eq!(sql.sql(), "select $1 + $1");
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn skips_single_quoted_strings() {
        let (sql, names) = rewrite_named_args("select '@not_a_param', @real");
        assert_eq!(sql.sql(), "select '@not_a_param', $1");
        assert_eq!(names, vec!["real"]);
    }

    #[test]
    fn skips_double_quoted_identifiers() {
        let (sql, names) = rewrite_named_args(r#"select "@weird_col", @real"#);
        assert_eq!(sql.sql(), r#"select "@weird_col", $1"#);
        assert_eq!(names, vec!["real"]);
    }

    #[test]
    fn skips_line_comments() {
        let (sql, names) = rewrite_named_args("select @a -- @ignored\n, @b");
        assert_eq!(sql.sql(), "select $1 -- @ignored\n, $2");
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn skips_nested_block_comments() {
        let (sql, names) = rewrite_named_args("select /* @outer /* @inner */ still comment */ @real");
        assert_eq!(sql.sql(), "select /* @outer /* @inner */ still comment */ $1");
        assert_eq!(names, vec!["real"]);
    }

    #[test]
    fn handles_escaped_quotes_inside_strings() {
        let (sql, names) = rewrite_named_args("select 'it''s @fine', @real");
        assert_eq!(sql.sql(), "select 'it''s @fine', $1");
        assert_eq!(names, vec!["real"]);
    }
}

