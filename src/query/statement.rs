use crate::catalog::types::Value;
use crate::config::EmptyInPolicy;
use crate::query::error::QueryError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one placeholder and one argument.
    Fixed,
    /// One placeholder per element of a bound list, for `IN (...)` predicates.
    Variadic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub arity: Arity,
    pub nullable: bool,
}

impl ParamSpec {
    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: Arity::Fixed,
            nullable: false,
        }
    }

    pub fn variadic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: Arity::Variadic,
            nullable: false,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Param(String),
}

/// Query text with named `:param` placeholders, split once at declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl QueryTemplate {
    pub fn parse(source: impl Into<String>) -> Result<Self, QueryError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(QueryError::InvalidTemplate {
                reason: "empty query text".into(),
            });
        }

        let mut segments = Vec::new();
        let mut text = String::new();
        let mut quote: Option<char> = None;
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            if let Some(q) = quote {
                text.push(c);
                if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    text.push(c);
                }
                '[' => {
                    quote = Some(']');
                    text.push(c);
                }
                '-' if chars.peek().is_some_and(|(_, next)| *next == '-') => {
                    text.push(c);
                    for (_, inner) in chars.by_ref() {
                        text.push(inner);
                        if inner == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek().is_some_and(|(_, next)| *next == '*') => {
                    text.push(c);
                    if let Some((_, star)) = chars.next() {
                        text.push(star);
                    }
                    let mut prev = '\0';
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        text.push(inner);
                        if prev == '*' && inner == '/' {
                            closed = true;
                            break;
                        }
                        prev = inner;
                    }
                    if !closed {
                        return Err(QueryError::InvalidTemplate {
                            reason: "unterminated block comment".into(),
                        });
                    }
                }
                '?' => {
                    return Err(QueryError::InvalidTemplate {
                        reason: format!("positional placeholder at byte {pos}; use :name"),
                    });
                }
                ':' if chars
                    .peek()
                    .is_some_and(|(_, next)| next.is_ascii_alphabetic() || *next == '_') =>
                {
                    let mut name = String::new();
                    while let Some((_, next)) = chars.peek() {
                        if next.is_ascii_alphanumeric() || *next == '_' {
                            name.push(*next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Param(name));
                }
                other => text.push(other),
            }
        }

        if quote.is_some() {
            return Err(QueryError::InvalidTemplate {
                reason: "unterminated quoted literal".into(),
            });
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Self { source, segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in template order. A name used twice appears twice.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Scalar(Value),
    List(Vec<Value>),
}

impl Binding {
    fn shape(&self) -> &'static str {
        match self {
            Binding::Scalar(_) => "scalar",
            Binding::List(_) => "list",
        }
    }
}

/// Arguments for one call, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    bindings: BTreeMap<String, Binding>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings
            .insert(name.into(), Binding::Scalar(value.into()));
        self
    }

    pub fn bind_list<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.bindings.insert(name.into(), Binding::List(values));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Final query text and the arguments for its positional placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub args: Vec<Value>,
    /// Set when an empty list was bound under [`EmptyInPolicy::ShortCircuit`];
    /// the statement cannot match any row and the store is not consulted.
    pub matches_nothing: bool,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
            matches_nothing: false,
        }
    }

    /// Number of `?` placeholders outside quoted literals, quoted identifiers
    /// and comments.
    pub fn placeholder_count(&self) -> usize {
        let mut quote: Option<char> = None;
        let mut count = 0;
        let mut chars = self.sql.chars().peekable();
        while let Some(c) = chars.next() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '\'' || c == '"' || c == '`' => quote = Some(c),
                None if c == '[' => quote = Some(']'),
                None if c == '-' && chars.peek() == Some(&'-') => {
                    chars.by_ref().find(|inner| *inner == '\n');
                }
                None if c == '/' && chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut prev = '\0';
                    for inner in chars.by_ref() {
                        if prev == '*' && inner == '/' {
                            break;
                        }
                        prev = inner;
                    }
                }
                None if c == '?' => count += 1,
                None => {}
            }
        }
        count
    }
}

/// Appends `count` comma-separated placeholders; zero appends nothing.
pub fn append_placeholders(out: &mut String, count: usize) {
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
}

pub struct StatementBuilder<'a> {
    query_name: &'a str,
    template: &'a QueryTemplate,
    params: &'a [ParamSpec],
    empty_in_policy: EmptyInPolicy,
    max_bound_args: usize,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(query_name: &'a str, template: &'a QueryTemplate, params: &'a [ParamSpec]) -> Self {
        Self {
            query_name,
            template,
            params,
            empty_in_policy: EmptyInPolicy::default(),
            max_bound_args: usize::MAX,
        }
    }

    pub fn empty_in_policy(mut self, policy: EmptyInPolicy) -> Self {
        self.empty_in_policy = policy;
        self
    }

    pub fn max_bound_args(mut self, max_bound_args: usize) -> Self {
        self.max_bound_args = max_bound_args;
        self
    }

    pub fn build(&self, args: &Args) -> Result<BoundStatement, QueryError> {
        for name in args.names() {
            if !self.params.iter().any(|p| p.name == name) {
                return Err(QueryError::UnexpectedArgument {
                    query: self.query_name.to_string(),
                    param: name.to_string(),
                });
            }
        }

        let mut sql = String::with_capacity(self.template.source.len() + 16);
        let mut values = Vec::new();
        let mut matches_nothing = false;

        for segment in &self.template.segments {
            let name = match segment {
                Segment::Text(text) => {
                    sql.push_str(text);
                    continue;
                }
                Segment::Param(name) => name,
            };
            let spec = self
                .params
                .iter()
                .find(|p| &p.name == name)
                .ok_or_else(|| QueryError::InvalidTemplate {
                    reason: format!("placeholder :{name} has no declared parameter"),
                })?;
            let binding = args.get(name).ok_or_else(|| QueryError::MissingArgument {
                query: self.query_name.to_string(),
                param: name.clone(),
            })?;

            match (spec.arity, binding) {
                (Arity::Fixed, Binding::Scalar(value)) => {
                    check_null(spec, value)?;
                    sql.push('?');
                    values.push(value.clone());
                }
                (Arity::Variadic, Binding::List(items)) => {
                    if items.is_empty() {
                        match self.empty_in_policy {
                            EmptyInPolicy::Reject => {
                                return Err(QueryError::EmptyList {
                                    param: name.clone(),
                                });
                            }
                            EmptyInPolicy::ShortCircuit => matches_nothing = true,
                            EmptyInPolicy::MatchNothing => {}
                        }
                    }
                    for item in items {
                        check_null(spec, item)?;
                    }
                    append_placeholders(&mut sql, items.len());
                    values.extend(items.iter().cloned());
                }
                (arity, other) => {
                    return Err(QueryError::ArityMismatch {
                        param: name.clone(),
                        expected: match arity {
                            Arity::Fixed => "scalar",
                            Arity::Variadic => "list",
                        },
                        got: other.shape(),
                    });
                }
            }
        }

        if values.len() > self.max_bound_args {
            return Err(QueryError::TooManyArguments {
                count: values.len(),
                max_bound_args: self.max_bound_args,
            });
        }

        Ok(BoundStatement {
            sql,
            args: values,
            matches_nothing,
        })
    }
}

fn check_null(spec: &ParamSpec, value: &Value) -> Result<(), QueryError> {
    if value.is_null() && !spec.nullable {
        return Err(QueryError::NullArgument {
            param: spec.name.clone(),
        });
    }
    Ok(())
}
