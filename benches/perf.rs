use criterion::{Criterion, black_box, criterion_group, criterion_main};
use querybind::catalog::types::Value;
use querybind::config::DatabaseConfig;
use querybind::query::mapper::{AllRows, FirstRow, ScalarOrDefault};
use querybind::query::statement::{BoundStatement, ParamSpec, QueryTemplate, StatementBuilder};
use querybind::{Args, Database, QueryMethod, QuerySpec};
use tempfile::tempdir;

const SEEDED_ROWS: i64 = 10_000;
const IN_LIST_LEN: i64 = 1_000;

#[derive(Debug)]
struct User {
    _uid: i64,
    _name: String,
}

impl querybind::repository::TryFromRow for User {
    fn try_from_row(
        row: querybind::query::cursor::RowView<'_>,
    ) -> Result<Self, querybind::repository::RowDecodeError> {
        Ok(Self {
            _uid: querybind::repository::i64_at(&row, 0, "uid")?,
            _name: querybind::repository::text_at(&row, 1, "name")?.to_string(),
        })
    }
}

fn setup_db(dir: &std::path::Path) -> Database {
    let db = Database::open(DatabaseConfig::production(), &dir.join("bench.db")).expect("open");
    db.execute_script("CREATE TABLE user (uid INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)")
        .expect("schema");
    let rows: Vec<BoundStatement> = (0..SEEDED_ROWS)
        .map(|uid| {
            BoundStatement::new(
                "INSERT INTO user (uid, name, age) VALUES (?, ?, ?)",
                vec![
                    Value::Integer(uid),
                    Value::from(format!("user-{uid}")),
                    Value::Integer(uid % 90),
                ],
            )
        })
        .collect();
    db.execute_in_transaction(&rows).expect("seed");
    db
}

fn bench_statement_building(c: &mut Criterion) {
    let template =
        QueryTemplate::parse("SELECT uid, name FROM user WHERE uid IN (:ids) AND age > :age")
            .expect("template");
    let params = vec![ParamSpec::variadic("ids"), ParamSpec::fixed("age")];
    let args = Args::new()
        .bind_list("ids", 0..IN_LIST_LEN)
        .bind("age", 18);

    c.bench_function("build_statement_in_list_1000", |b| {
        b.iter(|| {
            let statement = StatementBuilder::new("bench", &template, &params)
                .build(black_box(&args))
                .expect("build");
            black_box(statement.args.len());
        })
    });
}

fn bench_query_paths(c: &mut Criterion) {
    let dir = tempdir().expect("temp");
    let db = setup_db(dir.path());

    let by_id = QueryMethod::new(
        QuerySpec::new("getById", "SELECT uid, name FROM user WHERE uid = :id").expect("spec"),
        FirstRow::<User>::new(),
    )
    .expect("method");
    let mut next = 0i64;
    c.bench_function("point_query_by_primary_key", |b| {
        b.iter(|| {
            next = (next + 7) % SEEDED_ROWS;
            black_box(by_id.call(&db, Args::new().bind("id", next)).expect("query"));
        })
    });

    let by_ids = QueryMethod::new(
        QuerySpec::new("loadAllByIds", "SELECT uid, name FROM user WHERE uid IN (:ids)")
            .expect("spec")
            .variadic("ids"),
        AllRows::<User>::new(),
    )
    .expect("method");
    c.bench_function("in_list_query_100", |b| {
        b.iter(|| {
            let users = by_ids
                .call(&db, Args::new().bind_list("ids", (0..100).map(|i| i * 37)))
                .expect("query");
            black_box(users.len());
        })
    });

    let count = QueryMethod::new(
        QuerySpec::new("count", "SELECT count(*) FROM user").expect("spec"),
        ScalarOrDefault::<i64>::first_column(),
    )
    .expect("method");
    let live = count.live(&db, Args::new()).expect("live");
    live.get().expect("prime");
    c.bench_function("live_query_clean_read", |b| {
        b.iter(|| {
            black_box(*live.get().expect("cached"));
        })
    });
}

criterion_group!(benches, bench_statement_building, bench_query_paths);
criterion_main!(benches);
