use smol_str::SmolStr;
use squill_lib_core::ast::stmt::Stmt;
use squill_lib_core::errors::{self, Diagnostic};
use squill_lib_core::sanitize::sanitized_source;
use squill_lib_core::tokens::Location;

use crate::cardinality::{infer_cardinality, Cardinality};
use crate::check::{Checker, OutputChunk, OutputColumn, PragmaState};
use crate::names::infer_parameter_names;
use crate::schema::Schema;
use crate::types::Type;

/// One bind parameter of a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// 1-based index in use order.
    pub index: u32,
    pub ty: Type,
    /// Explicit (`:name`) or inferred (`WHERE id = ?` gives `id`) name.
    pub name: Option<SmolStr>,
    pub occurrences: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub parameters: Vec<Parameter>,
    pub output: Vec<OutputChunk>,
    pub cardinality: Cardinality,
}

/// Host record type overrides from `DEFINE QUERY` options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeOverrides {
    pub input: Option<SmolStr>,
    pub output: Option<SmolStr>,
}

/// A compiled statement: what downstream code generation consumes.
#[derive(Debug, Clone)]
pub struct Statement {
    /// From `DEFINE QUERY name(…) AS …`, if present.
    pub name: Option<SmolStr>,
    pub signature: Signature,
    pub ast: Stmt,
    pub is_read_only: bool,
    /// The statement as plain SQLite, custom extensions removed.
    pub sanitized_source: String,
    pub overrides: TypeOverrides,
}

fn process_statement(
    schema: &mut Schema,
    pragmas: &mut PragmaState,
    source: &str,
    stmt: Stmt,
) -> (Statement, Vec<Diagnostic>) {
    let mut checker = Checker::new(schema, pragmas);
    let chunks = checker.check_statement(&stmt);
    let state = checker.state;

    let names = infer_parameter_names(&stmt);
    let parameters = state
        .parameter_solutions(true)
        .into_iter()
        .map(|(index, ty, occurrences)| Parameter {
            index,
            ty,
            name: names.get(&index).cloned(),
            occurrences,
        })
        .collect();

    // Freeze output types: no variable survives the statement.
    let output = chunks
        .into_iter()
        .map(|chunk| match chunk {
            OutputChunk::Columns(columns) => {
                OutputChunk::Columns(freeze_columns(&state, columns))
            }
            OutputChunk::Table { name, columns } => OutputChunk::Table {
                name,
                columns: freeze_columns(&state, columns),
            },
        })
        .collect();

    let cardinality = infer_cardinality(schema, &stmt);

    let (name, overrides) = match &stmt {
        Stmt::QueryDefinition(query) => {
            let mut overrides = TypeOverrides::default();
            for option in &query.options {
                let value = Some(option.value.value.clone());
                if option.key.value.eq_ignore_ascii_case("input") {
                    overrides.input = value;
                } else if option.key.value.eq_ignore_ascii_case("output") {
                    overrides.output = value;
                }
            }
            (Some(query.name.value.clone()), overrides)
        }
        _ => (None, TypeOverrides::default()),
    };

    let statement = Statement {
        name,
        is_read_only: stmt.is_read_only(),
        sanitized_source: sanitized_source(source, &stmt),
        signature: Signature {
            parameters,
            output,
            cardinality,
        },
        ast: stmt,
        overrides,
    };
    (statement, state.diagnostics)
}

fn freeze_columns(
    state: &crate::infer::InferenceState,
    columns: Vec<OutputColumn>,
) -> Vec<OutputColumn> {
    columns
        .into_iter()
        .map(|column| OutputColumn {
            ty: state.solution_or_default(&column.ty),
            ..column
        })
        .collect()
}

/// Compiles migration sources, evolving the embedded schema.
///
/// Queries are rejected here: migrations may contain DDL, DML and pragmas,
/// but no `SELECT` or `DEFINE QUERY`.
#[derive(Default)]
pub struct SchemaCompiler {
    schema: Schema,
    pragmas: PragmaState,
    statements: Vec<Statement>,
    diagnostics: Vec<Diagnostic>,
}

impl SchemaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile one source chunk, applying its DDL to the schema. Returns the
    /// sanitized source, ready to hand to SQLite.
    pub fn compile(&mut self, source: &str) -> String {
        let parsed = squill_lib_core::parser::parse(source);
        self.diagnostics.extend(parsed.diagnostics);

        let mut sanitized = Vec::new();
        for stmt in parsed.statements {
            match &stmt {
                Stmt::Select(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        "SELECT statements are illegal in migrations",
                        stmt.location(),
                    ));
                    continue;
                }
                Stmt::QueryDefinition(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        "DEFINE QUERY is illegal in migrations",
                        stmt.location(),
                    ));
                    continue;
                }
                Stmt::Empty(_) => continue,
                _ => {}
            }

            log::debug!("compiling migration statement at {:?}", stmt.location());
            let (statement, diagnostics) =
                process_statement(&mut self.schema, &mut self.pragmas, source, stmt);
            self.diagnostics.extend(diagnostics);
            sanitized.push(statement.sanitized_source.clone());
            self.statements.push(statement);
        }

        errors::sort_by_location(&mut self.diagnostics);
        let mut out = sanitized.join(";\n\n");
        if !out.is_empty() {
            out.push(';');
        }
        out
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn all_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Whether any error-level diagnostic was produced. Warning-only
    /// compiles are safe to execute.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Compiles query sources against a fixed schema, producing one
/// [`Statement`] per parsed statement.
///
/// DDL is rejected here: schema changes belong in migrations.
#[derive(Default)]
pub struct QueryCompiler {
    schema: Schema,
    pragmas: PragmaState,
    statements: Vec<Statement>,
    diagnostics: Vec<Diagnostic>,
}

impl QueryCompiler {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            pragmas: PragmaState::default(),
            statements: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Compile one source chunk, appending its statements.
    pub fn compile(&mut self, source: &str) {
        let parsed = squill_lib_core::parser::parse(source);
        self.diagnostics.extend(parsed.diagnostics);

        for stmt in parsed.statements {
            if let Some(kind) = ddl_kind(&stmt) {
                self.diagnostics.push(Diagnostic::error(
                    format!("{kind} is illegal in queries"),
                    stmt.location(),
                ));
                continue;
            }
            if matches!(stmt, Stmt::Empty(_)) {
                continue;
            }

            log::debug!("compiling query statement at {:?}", stmt.location());
            let (statement, diagnostics) =
                process_statement(&mut self.schema, &mut self.pragmas, source, stmt);
            self.diagnostics.extend(diagnostics);
            self.statements.push(statement);
        }

        errors::sort_by_location(&mut self.diagnostics);
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn all_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

fn ddl_kind(stmt: &Stmt) -> Option<&'static str> {
    let kind = match stmt {
        Stmt::CreateTable(_) => "CREATE TABLE",
        Stmt::CreateIndex(_) => "CREATE INDEX",
        Stmt::CreateView(_) => "CREATE VIEW",
        Stmt::CreateTrigger(_) => "CREATE TRIGGER",
        Stmt::CreateVirtualTable(_) => "CREATE VIRTUAL TABLE",
        Stmt::AlterTable(_) => "ALTER TABLE",
        Stmt::DropTable(_) => "DROP TABLE",
        Stmt::DropIndex(_) => "DROP INDEX",
        Stmt::DropView(_) => "DROP VIEW",
        Stmt::DropTrigger(_) => "DROP TRIGGER",
        Stmt::QueryDefinition(query) => return ddl_kind(&query.stmt),
        _ => return None,
    };
    Some(kind)
}
