use crate::Database;
use crate::catalog::{normalize_table_name, referenced_tables};
use crate::query::error::QueryError;
use crate::query::live::LiveQuery;
use crate::query::mapper::RowMapper;
use crate::query::statement::{Args, BoundStatement, ParamSpec, QueryTemplate, StatementBuilder};
use crate::repository::DaoError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Declaration of one data-access method: its template, parameters and the
/// tables whose changes invalidate its live results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub name: String,
    pub template: QueryTemplate,
    pub params: Vec<ParamSpec>,
    pub observed_tables: BTreeSet<String>,
}

impl QuerySpec {
    /// Parses the template and declares every placeholder it names as a fixed,
    /// non-null parameter. Observed tables default to the tables the text
    /// reads from.
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self, QueryError> {
        let template = QueryTemplate::parse(template)?;
        let mut params: Vec<ParamSpec> = Vec::new();
        for param in template.param_names() {
            if !params.iter().any(|p| p.name == param) {
                params.push(ParamSpec::fixed(param));
            }
        }
        let observed_tables = referenced_tables(template.source());
        Ok(Self {
            name: name.into(),
            template,
            params,
            observed_tables,
        })
    }

    /// Replaces the declaration of an existing parameter, or adds one. Adding a
    /// parameter the template never uses makes [`QuerySpec::validate`] fail.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        match self.params.iter_mut().find(|p| p.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.params.push(spec),
        }
        self
    }

    pub fn variadic(self, name: &str) -> Self {
        let nullable = self.is_nullable(name);
        self.param(ParamSpec::variadic(name).nullable(nullable))
    }

    pub fn nullable(mut self, name: &str) -> Self {
        if let Some(existing) = self.params.iter_mut().find(|p| p.name == name) {
            existing.nullable = true;
        } else {
            self.params.push(ParamSpec::fixed(name).nullable(true));
        }
        self
    }

    /// Overrides the tables derived from the query text.
    pub fn observes<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.observed_tables = tables
            .into_iter()
            .map(|t| normalize_table_name(t.as_ref()))
            .collect();
        self
    }

    fn is_nullable(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name && p.nullable)
    }

    /// Template placeholders and declared parameters must match one to one.
    pub fn validate(&self) -> Result<(), QueryError> {
        let mut seen = BTreeMap::new();
        for param in &self.params {
            if seen.insert(param.name.as_str(), ()).is_some() {
                return Err(QueryError::DuplicateParameter {
                    param: param.name.clone(),
                });
            }
        }
        let used: BTreeSet<&str> = self.template.param_names().collect();
        for param in &self.params {
            if !used.contains(param.name.as_str()) {
                return Err(QueryError::UnknownParameter {
                    query: self.name.clone(),
                    param: param.name.clone(),
                });
            }
        }
        for name in used {
            if !seen.contains_key(name) {
                return Err(QueryError::InvalidTemplate {
                    reason: format!(
                        "query '{}' uses :{name} without declaring it",
                        self.name
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn bind(&self, db: &Database, args: &Args) -> Result<BoundStatement, QueryError> {
        let config = db.config();
        StatementBuilder::new(&self.name, &self.template, &self.params)
            .empty_in_policy(config.empty_in_policy)
            .max_bound_args(config.max_bound_args)
            .build(args)
    }
}

/// A declared read query paired with the shape of its result.
pub struct QueryMethod<M: RowMapper> {
    spec: Arc<QuerySpec>,
    mapper: Arc<M>,
}

impl<M: RowMapper> Clone for QueryMethod<M> {
    fn clone(&self) -> Self {
        Self {
            spec: Arc::clone(&self.spec),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<M: RowMapper + 'static> QueryMethod<M> {
    pub fn new(spec: QuerySpec, mapper: M) -> Result<Self, QueryError> {
        spec.validate()?;
        Ok(Self {
            spec: Arc::new(spec),
            mapper: Arc::new(mapper),
        })
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn call(&self, db: &Database, args: Args) -> Result<M::Output, DaoError> {
        let statement = self.spec.bind(db, &args)?;
        db.query(&statement, self.mapper.as_ref())
    }

    /// Binds the arguments now; the query itself runs on the first read of the
    /// returned live query.
    pub fn live(&self, db: &Database, args: Args) -> Result<LiveQuery<M>, DaoError> {
        let statement = self.spec.bind(db, &args)?;
        Ok(LiveQuery::new(
            db.clone(),
            statement,
            self.spec.observed_tables.clone(),
            Arc::clone(&self.mapper),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Row id of the inserted row.
    Inserted(i64),
    /// Rows changed by an update or delete.
    Affected(usize),
}

/// A declared INSERT, UPDATE or DELETE statement.
#[derive(Debug, Clone)]
pub struct WriteMethod {
    spec: QuerySpec,
    kind: WriteKind,
}

impl WriteMethod {
    pub fn new(spec: QuerySpec, kind: WriteKind) -> Result<Self, QueryError> {
        spec.validate()?;
        let leading = spec
            .template
            .source()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let matches_kind = match kind {
            WriteKind::Insert => leading == "INSERT" || leading == "REPLACE",
            WriteKind::Update => leading == "UPDATE",
            WriteKind::Delete => leading == "DELETE",
        };
        // CTE-prefixed writes are accepted as declared
        if !matches_kind && leading != "WITH" {
            return Err(QueryError::InvalidTemplate {
                reason: format!(
                    "query '{}' is declared {kind:?} but starts with {leading}",
                    spec.name
                ),
            });
        }
        Ok(Self { spec, kind })
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    /// Tables the write declares it changes, reported to the tracker in
    /// addition to whatever the store observed. Falls back to the observed
    /// tables when the target cannot be read off the statement.
    pub fn written_tables(&self) -> BTreeSet<String> {
        match written_table(self.spec.template.source()) {
            Some(table) => BTreeSet::from([table]),
            None => self.spec.observed_tables.clone(),
        }
    }

    pub fn execute(&self, db: &Database, args: Args) -> Result<WriteOutcome, DaoError> {
        let statement = self.spec.bind(db, &args)?;
        let result = db.execute_declared(&[statement], self.written_tables())?;
        Ok(match self.kind {
            WriteKind::Insert => WriteOutcome::Inserted(result.last_insert_rowid),
            WriteKind::Update | WriteKind::Delete => WriteOutcome::Affected(result.rows_affected),
        })
    }
}

/// Target table of an INSERT / REPLACE / UPDATE / DELETE statement.
fn written_table(sql: &str) -> Option<String> {
    let tokens: Vec<&str> = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .filter(|t| !t.is_empty())
        .collect();
    let keyword_then_table = |keyword: &str| {
        tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case(keyword))
            .and_then(|i| tokens.get(i + 1))
    };
    let first = tokens.first()?.to_ascii_uppercase();
    let table = match first.as_str() {
        "INSERT" | "REPLACE" => keyword_then_table("INTO"),
        "UPDATE" => {
            // UPDATE OR REPLACE t SET ...
            let set = tokens.iter().position(|t| t.eq_ignore_ascii_case("SET"))?;
            set.checked_sub(1).and_then(|i| tokens.get(i))
        }
        "DELETE" => keyword_then_table("FROM"),
        _ => None,
    }?;
    let table = table.rsplit('.').next().unwrap_or(table);
    Some(normalize_table_name(table))
}

#[cfg(test)]
mod tests {
    use super::{QuerySpec, WriteKind, WriteMethod, written_table};
    use crate::query::error::QueryError;
    use crate::query::statement::Arity;

    #[test]
    fn spec_derives_params_and_observed_tables() {
        let spec = QuerySpec::new("loadAllByIds", "SELECT * FROM User WHERE uid IN (:ids)")
            .expect("spec")
            .variadic("ids");
        assert_eq!(spec.params.len(), 1);
        assert_eq!(spec.params[0].arity, Arity::Variadic);
        assert!(spec.observed_tables.contains("user"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn unused_declared_parameter_fails_validation() {
        let spec = QuerySpec::new("getById", "SELECT * FROM user WHERE uid = :id")
            .expect("spec")
            .variadic("ids");
        assert_eq!(
            spec.validate(),
            Err(QueryError::UnknownParameter {
                query: "getById".into(),
                param: "ids".into(),
            })
        );
    }

    #[test]
    fn nullable_survives_variadic_redeclaration() {
        let spec = QuerySpec::new("ages", "SELECT age FROM user WHERE id IN (:ids)")
            .expect("spec")
            .nullable("ids")
            .variadic("ids");
        assert!(spec.params[0].nullable);
        assert_eq!(spec.params[0].arity, Arity::Variadic);
    }

    #[test]
    fn observes_overrides_derived_tables() {
        let spec = QuerySpec::new("count", "SELECT count(*) FROM user_view")
            .expect("spec")
            .observes(["User", "Pet"]);
        assert_eq!(
            spec.observed_tables.into_iter().collect::<Vec<_>>(),
            vec!["pet".to_string(), "user".to_string()]
        );
    }

    #[test]
    fn write_kind_must_match_statement() {
        let spec = QuerySpec::new("del", "DELETE FROM user WHERE uid = :id").expect("spec");
        assert!(WriteMethod::new(spec.clone(), WriteKind::Delete).is_ok());
        assert!(matches!(
            WriteMethod::new(spec, WriteKind::Insert),
            Err(QueryError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn written_table_handles_each_kind() {
        assert_eq!(
            written_table("INSERT OR REPLACE INTO main.User(uid) VALUES (?)"),
            Some("user".into())
        );
        assert_eq!(
            written_table("UPDATE OR IGNORE pet SET name = ?"),
            Some("pet".into())
        );
        assert_eq!(
            written_table("delete from \"Toy\" where id = ?"),
            Some("toy".into())
        );
        assert_eq!(written_table("SELECT 1"), None);
    }
}
