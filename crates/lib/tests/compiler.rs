use pretty_assertions::assert_eq;
use squill_lib::cardinality::Cardinality;
use squill_lib::check::OutputChunk;
use squill_lib::compiler::{QueryCompiler, SchemaCompiler, Statement};
use squill_lib::types::Type;
use squill_lib_core::errors::{Level, Suggestion};

fn compile_queries(migrations: &str, queries: &str) -> QueryCompiler {
    let mut schema_compiler = SchemaCompiler::new();
    schema_compiler.compile(migrations);
    assert!(
        !schema_compiler.has_errors(),
        "migration errors: {:?}",
        schema_compiler.all_diagnostics()
    );
    let mut query_compiler = QueryCompiler::new(schema_compiler.into_schema());
    query_compiler.compile(queries);
    query_compiler
}

fn single_statement(compiler: &QueryCompiler) -> &Statement {
    assert_eq!(compiler.statements().len(), 1);
    &compiler.statements()[0]
}

fn output_columns(statement: &Statement) -> Vec<(String, Type)> {
    squill_lib::check::flatten(&statement.signature.output)
        .into_iter()
        .map(|column| (column.name.to_string(), column.ty.clone()))
        .collect()
}

const FOO_BAR: &str = "
    CREATE TABLE foo (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE bar (id INTEGER PRIMARY KEY, foo_id INTEGER);
";

#[test]
fn test_select_by_primary_key() {
    let compiler = compile_queries(FOO_BAR, "SELECT name FROM foo WHERE id = ?;");
    assert_eq!(compiler.all_diagnostics(), &[]);

    let statement = single_statement(&compiler);
    assert!(statement.is_read_only);
    assert_eq!(statement.signature.cardinality, Cardinality::Single);

    let parameters = &statement.signature.parameters;
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].index, 1);
    assert_eq!(parameters[0].name.as_deref(), Some("id"));
    assert_eq!(parameters[0].ty, Type::integer());
    assert_eq!(parameters[0].occurrences.len(), 1);

    assert_eq!(
        output_columns(statement),
        vec![("name".to_string(), Type::text())]
    );
}

#[test]
fn test_star_expansion_with_left_join() {
    let compiler = compile_queries(
        FOO_BAR,
        "SELECT * FROM foo LEFT JOIN bar ON foo.id = bar.foo_id;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);

    let statement = single_statement(&compiler);
    assert_eq!(statement.signature.cardinality, Cardinality::Many);

    let chunks = &statement.signature.output;
    assert_eq!(chunks.len(), 2);

    let OutputChunk::Table { name, columns } = &chunks[0] else {
        panic!("expected a whole-table chunk");
    };
    assert_eq!(name.as_str(), "foo");
    assert_eq!(columns[0].ty, Type::integer());
    assert_eq!(columns[1].ty, Type::text());

    // The left-joined side is nullable throughout.
    let OutputChunk::Table { name, columns } = &chunks[1] else {
        panic!("expected a whole-table chunk");
    };
    assert_eq!(name.as_str(), "bar");
    assert_eq!(columns[0].ty, Type::optional(Type::integer()));
    assert_eq!(columns[1].ty, Type::optional(Type::integer()));
}

#[test]
fn test_insert_returning() {
    let compiler = compile_queries(
        FOO_BAR,
        "INSERT INTO foo (id, name) VALUES (?, ?) RETURNING name AS n;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);

    let statement = single_statement(&compiler);
    assert!(!statement.is_read_only);
    assert_eq!(statement.signature.cardinality, Cardinality::Single);

    let parameters = &statement.signature.parameters;
    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[0].name.as_deref(), Some("id"));
    assert_eq!(parameters[0].ty, Type::integer());
    assert_eq!(parameters[1].name.as_deref(), Some("name"));
    assert_eq!(parameters[1].ty, Type::text());

    assert_eq!(
        output_columns(statement),
        vec![("n".to_string(), Type::text())]
    );
}

#[test]
fn test_define_query() {
    let compiler = compile_queries(
        FOO_BAR,
        "DEFINE QUERY findUser(output: User) AS SELECT id, name FROM foo WHERE id = :id;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);

    let statement = single_statement(&compiler);
    assert_eq!(statement.name.as_deref(), Some("findUser"));
    assert_eq!(statement.overrides.output.as_deref(), Some("User"));
    assert_eq!(statement.overrides.input, None);
    assert_eq!(statement.signature.cardinality, Cardinality::Single);

    let parameters = &statement.signature.parameters;
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].name.as_deref(), Some("id"));
    assert_eq!(parameters[0].ty, Type::integer());

    assert_eq!(
        output_columns(statement),
        vec![
            ("id".to_string(), Type::integer()),
            ("name".to_string(), Type::text()),
        ]
    );
    assert_eq!(
        statement.sanitized_source,
        "SELECT id, name FROM foo WHERE id = :id"
    );
}

#[test]
fn test_union_takes_names_from_first_arm() {
    let compiler = compile_queries(
        "CREATE TABLE foo (a INTEGER NOT NULL);
         CREATE TABLE bar (id INTEGER PRIMARY KEY);",
        "SELECT a FROM foo UNION SELECT id FROM bar;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);

    let statement = single_statement(&compiler);
    assert_eq!(statement.signature.cardinality, Cardinality::Many);
    assert_eq!(
        output_columns(statement),
        vec![("a".to_string(), Type::integer())]
    );
}

#[test]
fn test_strict_tables_pragma() {
    let mut compiler = SchemaCompiler::new();
    compiler.compile("PRAGMA require_strict_tables = on; CREATE TABLE x(a INTEGER);");

    let diagnostics = compiler.all_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].level, Level::Error);
    assert_eq!(diagnostics[0].message, "Missing STRICT table option");
    assert_eq!(
        diagnostics[0].suggestion,
        Some(Suggestion::Append(" STRICT".to_string()))
    );

    // A strict table passes.
    let mut compiler = SchemaCompiler::new();
    compiler.compile("PRAGMA require_strict_tables = on; CREATE TABLE x(a INTEGER) STRICT;");
    assert_eq!(compiler.all_diagnostics(), &[]);
}

#[test]
fn test_select_is_illegal_in_migrations() {
    let mut compiler = SchemaCompiler::new();
    compiler.compile("SELECT 1;");
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message.contains("illegal in migrations")));
}

#[test]
fn test_ddl_is_illegal_in_queries() {
    let compiler = compile_queries(FOO_BAR, "CREATE TABLE nope (a INTEGER);");
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message == "CREATE TABLE is illegal in queries"));
    assert_eq!(compiler.statements().len(), 0);
}

#[test]
fn test_anonymous_columns_are_numbered() {
    let compiler = compile_queries(FOO_BAR, "SELECT 1 + 2, name, 3 FROM foo;");
    let statement = single_statement(&compiler);
    let columns = output_columns(statement);
    assert_eq!(columns[0].0, "column1");
    assert_eq!(columns[1].0, "name");
    assert_eq!(columns[2].0, "column3");
}

#[test]
fn test_unifying_text_with_integer_reports() {
    let compiler = compile_queries(FOO_BAR, "SELECT name + 1 FROM foo;");
    assert!(compiler.has_errors());
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message.contains("unable to unify")));
}

#[test]
fn test_where_requires_integer_expression() {
    let compiler = compile_queries(FOO_BAR, "SELECT id FROM foo WHERE name;");
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message.contains("WHERE expects an integer-valued expression")));
}

#[test]
fn test_unknown_column_and_table_diagnostics() {
    let compiler = compile_queries(
        FOO_BAR,
        "SELECT missing FROM foo; SELECT id FROM nonexistent;",
    );
    let messages: Vec<&str> = compiler
        .all_diagnostics()
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert!(messages.contains(&"no such column: missing"));
    assert!(messages.contains(&"no such table: nonexistent"));
}

#[test]
fn test_ambiguous_column() {
    let compiler = compile_queries(FOO_BAR, "SELECT id FROM foo, bar;");
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message == "ambiguous column name: id"));
}

#[test]
fn test_type_alias_is_surfaced() {
    let compiler = compile_queries(
        "CREATE TABLE t (flag INTEGER AS Bool USING bool_adapter NOT NULL);",
        "SELECT flag FROM t WHERE flag = ?;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);

    let statement = single_statement(&compiler);
    let expected = Type::Alias {
        inner: Box::new(Type::integer()),
        label: "Bool".into(),
        adapter: Some("bool_adapter".into()),
    };
    assert_eq!(output_columns(statement)[0].1, expected);
    assert_eq!(statement.signature.parameters[0].ty, expected);
}

#[test]
fn test_sanitized_migration_strips_alias_suffix() {
    let mut compiler = SchemaCompiler::new();
    let sanitized =
        compiler.compile("CREATE TABLE t (flag INTEGER AS Bool NOT NULL, n TEXT);");
    assert_eq!(compiler.all_diagnostics(), &[]);
    assert_eq!(
        sanitized,
        "CREATE TABLE t (flag INTEGER NOT NULL, n TEXT);"
    );
}

#[test]
fn test_schema_evolves_across_compile_calls() {
    let mut schema_compiler = SchemaCompiler::new();
    schema_compiler.compile("CREATE TABLE t (a INTEGER NOT NULL);");
    schema_compiler.compile("ALTER TABLE t ADD COLUMN b TEXT;");
    schema_compiler.compile("ALTER TABLE t RENAME COLUMN a TO c;");
    assert!(!schema_compiler.has_errors());

    let mut query_compiler = QueryCompiler::new(schema_compiler.into_schema());
    query_compiler.compile("SELECT c, b FROM t;");
    assert_eq!(query_compiler.all_diagnostics(), &[]);
    let columns = output_columns(single_statement(&query_compiler));
    assert_eq!(columns[0], ("c".to_string(), Type::integer()));
    assert_eq!(columns[1], ("b".to_string(), Type::optional(Type::text())));
}

#[test]
fn test_chunked_compilation_is_equivalent() {
    let queries = [
        "SELECT name FROM foo WHERE id = ?;",
        "INSERT INTO foo (id, name) VALUES (?, ?);",
        "SELECT * FROM bar;",
    ];

    let whole = {
        let mut compiler = compile_queries(FOO_BAR, &queries.join("\n"));
        compiler.compile("");
        compiler
    };
    let chunked = {
        let mut schema_compiler = SchemaCompiler::new();
        schema_compiler.compile(FOO_BAR);
        let mut compiler = QueryCompiler::new(schema_compiler.into_schema());
        for query in queries {
            compiler.compile(query);
        }
        compiler
    };

    assert_eq!(whole.statements().len(), chunked.statements().len());
    for (a, b) in whole.statements().iter().zip(chunked.statements()) {
        assert_eq!(a.signature.parameters.len(), b.signature.parameters.len());
        for (pa, pb) in a
            .signature
            .parameters
            .iter()
            .zip(&b.signature.parameters)
        {
            assert_eq!(pa.index, pb.index);
            assert_eq!(pa.ty, pb.ty);
            assert_eq!(pa.name, pb.name);
        }
        assert_eq!(output_columns(a), output_columns(b));
        assert_eq!(a.signature.cardinality, b.signature.cardinality);
        assert_eq!(a.sanitized_source, b.sanitized_source);
    }
    assert_eq!(whole.all_diagnostics().len(), chunked.all_diagnostics().len());
}

#[test]
fn test_missing_required_columns() {
    let compiler = compile_queries(FOO_BAR, "INSERT INTO foo (id) VALUES (?);");
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message == "missing required columns: name"));
}

#[test]
fn test_insert_into_generated_column() {
    let compiler = compile_queries(
        "CREATE TABLE t (
            a INTEGER NOT NULL,
            b INTEGER NOT NULL GENERATED ALWAYS AS (a * 2)
         );",
        "INSERT INTO t (a, b) VALUES (?, ?);",
    );
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message == "cannot INSERT into generated column: b"));
}

#[test]
fn test_upsert_excluded_is_qualified_only() {
    let compiler = compile_queries(
        FOO_BAR,
        "INSERT INTO foo (id, name) VALUES (?, ?)
         ON CONFLICT (id) DO UPDATE SET name = excluded.name;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);
}

#[test]
fn test_cte_and_recursive_cte() {
    let compiler = compile_queries(
        FOO_BAR,
        "WITH named AS (SELECT id, name FROM foo)
         SELECT name FROM named WHERE id = ?;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);
    let statement = single_statement(&compiler);
    assert_eq!(
        output_columns(statement),
        vec![("name".to_string(), Type::text())]
    );
    assert_eq!(statement.signature.parameters[0].ty, Type::integer());

    let compiler = compile_queries(
        FOO_BAR,
        "WITH RECURSIVE cnt(x) AS (
            SELECT 1 UNION ALL SELECT x + 1 FROM cnt WHERE x < 10
         )
         SELECT x FROM cnt;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);
    let columns = output_columns(single_statement(&compiler));
    assert_eq!(columns[0], ("x".to_string(), Type::integer()));
}

#[test]
fn test_strftime_advisory() {
    let compiler = compile_queries(FOO_BAR, "SELECT strftime('%s', 'now');");
    let diagnostics = compiler.all_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].level, Level::Warning);
    assert!(diagnostics[0].message.contains("unixepoch"));
    assert!(matches!(
        diagnostics[0].suggestion,
        Some(Suggestion::Replace(..))
    ));
}

#[test]
fn test_views_and_fts5() {
    let mut schema_compiler = SchemaCompiler::new();
    schema_compiler.compile(
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
         CREATE VIEW titled AS SELECT id, title FROM posts;
         CREATE VIRTUAL TABLE posts_fts USING fts5(title, body);",
    );
    assert!(
        !schema_compiler.has_errors(),
        "{:?}",
        schema_compiler.all_diagnostics()
    );

    let mut query_compiler = QueryCompiler::new(schema_compiler.into_schema());
    query_compiler.compile("SELECT title FROM titled; SELECT body FROM posts_fts;");
    assert_eq!(query_compiler.all_diagnostics(), &[]);
    assert_eq!(
        output_columns(&query_compiler.statements()[1])[0].1,
        Type::optional(Type::text())
    );

    // Views cannot be altered.
    let mut schema_compiler = SchemaCompiler::new();
    schema_compiler.compile(
        "CREATE TABLE t (a INTEGER);
         CREATE VIEW v AS SELECT a FROM t;
         ALTER TABLE v RENAME TO w;",
    );
    assert!(schema_compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message.contains("cannot alter view")));
}

#[test]
fn test_window_and_table_functions_are_reported() {
    let compiler = compile_queries(FOO_BAR, "SELECT id FROM json_each('[1,2]');");
    assert!(compiler
        .all_diagnostics()
        .iter()
        .any(|d| d.message == "table-valued functions are not supported"));
}

#[test]
fn test_bind_parameter_occurrences_are_shared() {
    let compiler = compile_queries(
        FOO_BAR,
        "SELECT name FROM foo WHERE id = :id OR id > :id;",
    );
    assert_eq!(compiler.all_diagnostics(), &[]);
    let parameters = &single_statement(&compiler).signature.parameters;
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].occurrences.len(), 2);
}

#[test]
fn test_in_parameter_is_pluralized() {
    let compiler = compile_queries(FOO_BAR, "SELECT name FROM foo WHERE id IN (?);");
    assert_eq!(compiler.all_diagnostics(), &[]);
    let parameters = &single_statement(&compiler).signature.parameters;
    assert_eq!(parameters[0].name.as_deref(), Some("ids"));
    assert_eq!(parameters[0].ty, Type::integer());
}
