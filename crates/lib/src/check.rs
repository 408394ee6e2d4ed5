pub mod expressions;
pub mod statements;

use smol_str::SmolStr;
use squill_lib_core::ast::stmt::Stmt;
use squill_lib_core::errors::Diagnostic;
use squill_lib_core::tokens::Location;

use crate::catalog::Catalog;
use crate::environment::Environment;
use crate::infer::InferenceState;
use crate::schema::Schema;
use crate::types::Type;

/// One named output column with its inferred type and the table it came
/// from, when it is a plain column reference.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: SmolStr,
    pub ty: Type,
    pub table: Option<SmolStr>,
}

/// A contiguous group of result columns originating from the same expansion.
/// Whole-table chunks remember that the user wrote `t.*` so downstream code
/// generation can emit structured record types.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputChunk {
    Columns(Vec<OutputColumn>),
    Table {
        name: SmolStr,
        columns: Vec<OutputColumn>,
    },
}

impl OutputChunk {
    pub fn columns(&self) -> &[OutputColumn] {
        match self {
            OutputChunk::Columns(columns) | OutputChunk::Table { columns, .. } => columns,
        }
    }
}

/// Flatten chunks into one ordered column list.
pub fn flatten(chunks: &[OutputChunk]) -> Vec<&OutputColumn> {
    chunks.iter().flat_map(|chunk| chunk.columns()).collect()
}

/// Host-recognized pragma switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PragmaState {
    /// Every `CREATE TABLE` must carry the `STRICT` table option.
    pub require_strict_tables: bool,
}

pub(crate) type Env = Environment<'static>;

/// Type-checks statements against the evolving schema.
///
/// One checker instance checks one statement: it owns the statement's
/// [`InferenceState`] and mutates the shared schema when the statement is
/// DDL. It never aborts; every error path produces an `Error` type and a
/// diagnostic.
pub struct Checker<'a> {
    pub(crate) schema: &'a mut Schema,
    pub(crate) pragmas: &'a mut PragmaState,
    pub(crate) catalog: &'static Catalog,
    pub state: InferenceState,
}

impl<'a> Checker<'a> {
    pub fn new(schema: &'a mut Schema, pragmas: &'a mut PragmaState) -> Self {
        Self {
            schema,
            pragmas,
            catalog: Catalog::global(),
            state: InferenceState::new(),
        }
    }

    /// Check one top-level statement, returning its result-column layout.
    pub fn check_statement(&mut self, stmt: &Stmt) -> Vec<OutputChunk> {
        let mut env = Environment::new(self.catalog);
        self.check_statement_in(&mut env, stmt)
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, location: Location) {
        self.state
            .diagnostics
            .push(Diagnostic::error(message, location));
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>, location: Location) {
        self.state
            .diagnostics
            .push(Diagnostic::warning(message, location));
    }

    /// Unify with INTEGER, reporting a clause-specific diagnostic instead of
    /// the generic unification failure.
    pub(crate) fn expect_integer(&mut self, clause: &str, ty: &Type, location: Location) {
        if !self.state.unify_quiet(ty, &Type::integer(), location) {
            let found = self.state.solution(ty);
            self.error(
                format!("{clause} expects an integer-valued expression, found {found}"),
                location,
            );
        }
    }
}
