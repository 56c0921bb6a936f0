//! Read-only statement guard
//!
//! The database file is already opened read-only; this check rejects write
//! statements before they reach SQLite so the agent gets a clear
//! observation instead of a driver error.

/// Leading keywords accepted as read-only
const READ_ONLY_LEADERS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "PRAGMA", "VALUES"];

/// Keywords that make a statement a write, wherever they appear
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT", "DROP", "ALTER", "CREATE", "ATTACH",
    "DETACH", "VACUUM", "REINDEX", "TRUNCATE",
];

/// Pragmas that take an argument and only report on the schema
const INTROSPECTION_PRAGMAS: &[&str] = &[
    "TABLE_INFO",
    "TABLE_XINFO",
    "TABLE_LIST",
    "INDEX_LIST",
    "INDEX_INFO",
    "INDEX_XINFO",
    "FOREIGN_KEY_LIST",
    "FOREIGN_KEY_CHECK",
    "INTEGRITY_CHECK",
    "QUICK_CHECK",
];

/// Pragmas that change the database even without an argument
const SIDE_EFFECT_PRAGMAS: &[&str] = &[
    "OPTIMIZE",
    "SHRINK_MEMORY",
    "WAL_CHECKPOINT",
    "INCREMENTAL_VACUUM",
];

/// Why a statement was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    MultipleStatements,
    NotReadOnly(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty query"),
            Rejection::MultipleStatements => {
                write!(f, "only a single statement may be executed at a time")
            }
            Rejection::NotReadOnly(keyword) => write!(
                f,
                "{} statements are not allowed; only read-only queries may be executed",
                keyword
            ),
        }
    }
}

/// Check that `sql` is a single read-only statement
pub fn check_read_only(sql: &str) -> Result<(), Rejection> {
    let stripped = strip_literals_and_comments(sql);
    let body = stripped.trim().trim_end_matches(';').trim();

    if body.is_empty() {
        return Err(Rejection::Empty);
    }
    if body.contains(';') {
        return Err(Rejection::MultipleStatements);
    }

    let words = words_with_followers(body);

    let leader = words.first().map(|(w, _)| w.clone()).unwrap_or_default();
    if !READ_ONLY_LEADERS.contains(&leader.as_str()) {
        return Err(Rejection::NotReadOnly(leader));
    }

    // a keyword directly followed by `(` is a function call, e.g. replace(x, 'a', 'b')
    if let Some((write, _)) = words
        .iter()
        .find(|(w, next)| WRITE_KEYWORDS.contains(&w.as_str()) && *next != Some('('))
    {
        return Err(Rejection::NotReadOnly(write.clone()));
    }

    if leader == "PRAGMA" {
        check_pragma(body)?;
    }

    Ok(())
}

/// Upper-cased words, each paired with the next non-blank character after it
fn words_with_followers(body: &str) -> Vec<(String, Option<char>)> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c.to_ascii_uppercase());
            let ends_word = chars
                .peek()
                .map_or(true, |n| !(n.is_ascii_alphanumeric() || *n == '_'));
            if ends_word {
                let next = chars.clone().find(|n| !n.is_whitespace());
                words.push((std::mem::take(&mut current), next));
            }
        }
    }

    words
}

/// Allow pragma reads; reject assignments in either `= value` or `(value)` form
fn check_pragma(body: &str) -> Result<(), Rejection> {
    let rejected = || Rejection::NotReadOnly("PRAGMA".to_string());

    let rest = body
        .get(..6)
        .filter(|head| head.eq_ignore_ascii_case("PRAGMA"))
        .map(|_| body[6..].trim_start())
        .ok_or_else(rejected)?;

    // optional `schema.` prefix
    let name_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(rest.len());
    let name = rest[..name_end]
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    let tail = rest[name_end..].trim();

    if name.is_empty() {
        return Err(rejected());
    }
    if tail.is_empty() {
        return if SIDE_EFFECT_PRAGMAS.contains(&name.as_str()) {
            Err(rejected())
        } else {
            Ok(())
        };
    }
    if tail.starts_with('(') && INTROSPECTION_PRAGMAS.contains(&name.as_str()) {
        return Ok(());
    }
    Err(rejected())
}

/// Blank out string literals, quoted identifiers and comments
fn strip_literals_and_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                out.push(' ');
                while let Some(inner) = chars.next() {
                    if inner == quote {
                        // doubled quote is an escape
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '[' => {
                out.push(' ');
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}
