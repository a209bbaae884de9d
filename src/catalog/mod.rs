pub mod types;

use std::collections::BTreeSet;

/// Registry key for a table name. SQLite resolves table names without regard
/// to ASCII case.
pub fn normalize_table_name(name: &str) -> String {
    strip_identifier_quotes(name.trim()).to_ascii_lowercase()
}

fn strip_identifier_quotes(ident: &str) -> &str {
    let bytes = ident.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if matches!((first, last), (b'"', b'"') | (b'`', b'`') | (b'[', b']')) {
            return &ident[1..ident.len() - 1];
        }
    }
    ident
}

/// Best-effort list of the tables a statement reads.
///
/// Every `FROM` / `JOIN` source list is walked across commas, with aliases
/// dropped. Subqueries are descended into, table-valued functions such as
/// `json_each(..)` are skipped and names declared by a `WITH` clause are not
/// tables. String literals and comments are ignored.
pub fn referenced_tables(sql: &str) -> BTreeSet<String> {
    let tokens = tokenize(sql);
    let mut out = BTreeSet::new();
    for (i, token) in tokens.iter().enumerate() {
        let keyword = token.to_ascii_uppercase();
        let is_source_list = match keyword.as_str() {
            "JOIN" => true,
            // `a IS DISTINCT FROM b` compares values
            "FROM" => !i
                .checked_sub(1)
                .is_some_and(|p| tokens[p].eq_ignore_ascii_case("DISTINCT")),
            _ => false,
        };
        if is_source_list {
            collect_sources(&tokens, i + 1, &mut out);
        }
    }
    for name in cte_names(&tokens) {
        out.remove(&name);
    }
    out
}

const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER", "ON",
    "USING", "GROUP", "ORDER", "LIMIT", "HAVING", "UNION", "EXCEPT", "INTERSECT", "WINDOW",
    "INDEXED", "NOT", "RETURNING", "SET", "VALUES", "DEFAULT", "SELECT",
];

fn is_punct(token: &str) -> bool {
    matches!(token, "(" | ")" | "," | ";")
}

fn is_clause_keyword(token: &str) -> bool {
    CLAUSE_KEYWORDS
        .iter()
        .any(|k| token.eq_ignore_ascii_case(k))
}

/// Index just past the parenthesis group opening at `open`.
fn skip_group(tokens: &[String], open: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        match token.as_str() {
            "(" => depth += 1,
            ")" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return open + offset + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// Walks `source [AS alias] [, source [AS alias]]...` starting at `start`.
/// Parenthesized sources are left to the outer scan, which visits their
/// inner `FROM` on its own.
fn collect_sources(tokens: &[String], start: usize, out: &mut BTreeSet<String>) {
    let mut i = start;
    while let Some(token) = tokens.get(i) {
        if token == "(" {
            i = skip_group(tokens, i);
        } else if is_punct(token) || is_clause_keyword(token) {
            return;
        } else if tokens.get(i + 1).is_some_and(|t| t == "(") {
            // table-valued function
            i = skip_group(tokens, i + 1);
        } else {
            let table = token.rsplit('.').next().unwrap_or(token);
            let table = normalize_table_name(table);
            if !table.is_empty() {
                out.insert(table);
            }
            i += 1;
        }

        // alias
        if tokens.get(i).is_some_and(|t| t.eq_ignore_ascii_case("AS")) {
            i += 2;
        } else if tokens
            .get(i)
            .is_some_and(|t| !is_punct(t) && !is_clause_keyword(t))
        {
            i += 1;
        }

        match tokens.get(i) {
            Some(t) if t == "," => i += 1,
            _ => return,
        }
    }
}

/// Names declared as common table expressions: `name [(cols)] AS
/// [[NOT] MATERIALIZED] (`.
fn cte_names(tokens: &[String]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if !tokens.iter().any(|t| t.eq_ignore_ascii_case("WITH")) {
        return names;
    }
    for (i, token) in tokens.iter().enumerate() {
        if !token.eq_ignore_ascii_case("AS") {
            continue;
        }
        let mut next = i + 1;
        while tokens
            .get(next)
            .is_some_and(|t| t.eq_ignore_ascii_case("NOT") || t.eq_ignore_ascii_case("MATERIALIZED"))
        {
            next += 1;
        }
        if tokens.get(next).is_none_or(|t| t != "(") {
            continue;
        }
        let Some(mut name_at) = i.checked_sub(1) else {
            continue;
        };
        if tokens[name_at] == ")" {
            // column list: walk back to its opening parenthesis
            let mut depth = 0usize;
            loop {
                match tokens[name_at].as_str() {
                    ")" => depth += 1,
                    "(" => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                match name_at.checked_sub(1) {
                    Some(prev) => name_at = prev,
                    None => break,
                }
            }
            let Some(prev) = name_at.checked_sub(1) else {
                continue;
            };
            name_at = prev;
        }
        let name = &tokens[name_at];
        if !is_punct(name) {
            names.insert(normalize_table_name(name));
        }
    }
    names
}

fn tokenize(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                flush(&mut tokens, &mut current);
                // string literal, '' escapes a quote
                while let Some(inner) = chars.next() {
                    if inner == '\'' {
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut tokens, &mut current);
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut tokens, &mut current);
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            '"' | '`' | '[' => {
                let close = match c {
                    '[' => ']',
                    other => other,
                };
                current.push(c);
                for inner in chars.by_ref() {
                    current.push(inner);
                    if inner == close {
                        break;
                    }
                }
            }
            '(' | ')' | ',' | ';' => {
                flush(&mut tokens, &mut current);
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => flush(&mut tokens, &mut current),
            c => current.push(c),
        }
    }
    flush(&mut tokens, &mut current);
    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}
