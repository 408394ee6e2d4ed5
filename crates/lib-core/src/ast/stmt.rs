use smol_str::SmolStr;

use super::{Ident, NodeId, NullsOrder, QualifiedName, SortOrder, TypeName};
use crate::ast::expr::Expr;
use crate::tokens::Location;

/// Statement nodes. Every variant carries its [`NodeId`] and [`Location`];
/// the location of a statement ends at or before the `;` that closed it.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    CreateTable(CreateTableStmt),
    AlterTable(AlterTableStmt),
    DropTable(DropStmt),
    CreateIndex(CreateIndexStmt),
    DropIndex(DropStmt),
    Reindex(ReindexStmt),
    CreateView(CreateViewStmt),
    DropView(DropStmt),
    CreateTrigger(CreateTriggerStmt),
    DropTrigger(DropStmt),
    CreateVirtualTable(CreateVirtualTableStmt),
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Pragma(PragmaStmt),
    QueryDefinition(QueryDefinitionStmt),
    Empty(EmptyStmt),
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::CreateTable(s) => s.id,
            Stmt::AlterTable(s) => s.id,
            Stmt::DropTable(s) | Stmt::DropIndex(s) | Stmt::DropView(s) | Stmt::DropTrigger(s) => {
                s.id
            }
            Stmt::CreateIndex(s) => s.id,
            Stmt::Reindex(s) => s.id,
            Stmt::CreateView(s) => s.id,
            Stmt::CreateTrigger(s) => s.id,
            Stmt::CreateVirtualTable(s) => s.id,
            Stmt::Select(s) => s.id,
            Stmt::Insert(s) => s.id,
            Stmt::Update(s) => s.id,
            Stmt::Delete(s) => s.id,
            Stmt::Pragma(s) => s.id,
            Stmt::QueryDefinition(s) => s.id,
            Stmt::Empty(s) => s.id,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Stmt::CreateTable(s) => s.location,
            Stmt::AlterTable(s) => s.location,
            Stmt::DropTable(s) | Stmt::DropIndex(s) | Stmt::DropView(s) | Stmt::DropTrigger(s) => {
                s.location
            }
            Stmt::CreateIndex(s) => s.location,
            Stmt::Reindex(s) => s.location,
            Stmt::CreateView(s) => s.location,
            Stmt::CreateTrigger(s) => s.location,
            Stmt::CreateVirtualTable(s) => s.location,
            Stmt::Select(s) => s.location,
            Stmt::Insert(s) => s.location,
            Stmt::Update(s) => s.location,
            Stmt::Delete(s) => s.location,
            Stmt::Pragma(s) => s.location,
            Stmt::QueryDefinition(s) => s.location,
            Stmt::Empty(s) => s.location,
        }
    }

    /// Whether executing this statement cannot modify the database.
    pub fn is_read_only(&self) -> bool {
        match self {
            Stmt::Select(_) | Stmt::Pragma(_) | Stmt::Empty(_) => true,
            Stmt::QueryDefinition(query) => query.stmt.is_read_only(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub id: NodeId,
    pub location: Location,
    pub with: Option<WithClause>,
    pub body: SelectBody,
    pub order_by: Vec<OrderingTerm>,
    pub limit: Option<LimitClause>,
}

/// Compound select tree; `lhs` associates to the left.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectBody {
    Core(SelectCore),
    Compound {
        op: CompoundOp,
        lhs: Box<SelectBody>,
        rhs: SelectCore,
    },
}

impl SelectBody {
    pub fn is_compound(&self) -> bool {
        matches!(self, SelectBody::Compound { .. })
    }

    /// The leftmost core, which decides output naming.
    pub fn first_core(&self) -> &SelectCore {
        match self {
            SelectBody::Core(core) => core,
            SelectBody::Compound { lhs, .. } => lhs.first_core(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Union,
    UnionAll,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectCore {
    pub location: Location,
    pub distinct: bool,
    pub columns: Vec<ResultColumn>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultColumn {
    Expr {
        expr: Expr,
        alias: Option<Ident>,
    },
    /// `*`
    Star(Location),
    /// `table.*`
    TableStar(Ident, Location),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub source: TableOrSubquery,
    pub joins: Vec<Join>,
}

impl FromClause {
    /// The sole source table name, when the clause is a plain single-table
    /// scan with no joins.
    pub fn single_table(&self) -> Option<&QualifiedName> {
        if !self.joins.is_empty() {
            return None;
        }
        match &self.source {
            TableOrSubquery::Table { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableOrSubquery {
    Table {
        name: QualifiedName,
        alias: Option<Ident>,
        location: Location,
    },
    /// A table-valued function call; recognized but unsupported downstream.
    TableFunction {
        name: Ident,
        args: Vec<Expr>,
        alias: Option<Ident>,
        location: Location,
    },
    Subquery {
        select: Box<SelectStmt>,
        alias: Option<Ident>,
        location: Location,
    },
}

impl TableOrSubquery {
    pub fn location(&self) -> Location {
        match self {
            TableOrSubquery::Table { location, .. }
            | TableOrSubquery::TableFunction { location, .. }
            | TableOrSubquery::Subquery { location, .. } => *location,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub op: JoinOperator,
    pub table: TableOrSubquery,
    pub constraint: Option<JoinConstraint>,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOperator {
    /// `,`
    Comma,
    Inner { natural: bool },
    Left { natural: bool },
    Right { natural: bool },
    Full { natural: bool },
    Cross,
}

impl JoinOperator {
    /// Whether the joined table's columns become nullable on this side.
    pub fn is_optional(&self) -> bool {
        matches!(self, JoinOperator::Left { .. } | JoinOperator::Full { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<Ident>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub recursive: bool,
    pub ctes: Vec<CommonTableExpr>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub select: Box<SelectStmt>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    pub expr: Expr,
    pub order: Option<SortOrder>,
    pub nulls: Option<NullsOrder>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitClause {
    pub limit: Expr,
    pub offset: Option<Expr>,
    pub location: Location,
}

// ---------------------------------------------------------------------------
// INSERT / UPDATE / DELETE
// ---------------------------------------------------------------------------

/// `OR …` conflict resolution on INSERT/UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveType {
    Abort,
    Fail,
    Ignore,
    Replace,
    Rollback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub id: NodeId,
    pub location: Location,
    pub with: Option<WithClause>,
    pub or_conflict: Option<ResolveType>,
    pub table: QualifiedName,
    pub alias: Option<Ident>,
    pub columns: Vec<Ident>,
    pub source: InsertSource,
    pub upsert: Option<UpsertClause>,
    pub returning: Option<ReturningClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<ValuesRow>),
    Select(Box<SelectStmt>),
    DefaultValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuesRow {
    pub exprs: Vec<Expr>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertClause {
    pub targets: Vec<IndexedColumn>,
    pub target_where: Option<Expr>,
    pub action: UpsertAction,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertAction {
    Nothing,
    Update {
        sets: Vec<SetAssignment>,
        where_clause: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturningClause {
    pub columns: Vec<ResultColumn>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub id: NodeId,
    pub location: Location,
    pub with: Option<WithClause>,
    pub or_conflict: Option<ResolveType>,
    pub table: QualifiedName,
    pub alias: Option<Ident>,
    pub sets: Vec<SetAssignment>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub returning: Option<ReturningClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAssignment {
    pub target: SetTarget,
    pub value: Expr,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetTarget {
    Single(Ident),
    /// `SET (a, b) = (…, …)`
    Tuple(Vec<Ident>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub id: NodeId,
    pub location: Location,
    pub with: Option<WithClause>,
    pub table: QualifiedName,
    pub alias: Option<Ident>,
    pub where_clause: Option<Expr>,
    pub returning: Option<ReturningClause>,
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub id: NodeId,
    pub location: Location,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub name: QualifiedName,
    pub body: CreateTableBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateTableBody {
    ColumnsAndConstraints {
        columns: Vec<ColumnDef>,
        constraints: Vec<TableConstraint>,
        options: TableOptions,
    },
    AsSelect(Box<SelectStmt>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableOptions {
    pub strict: bool,
    pub without_rowid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: Ident,
    pub type_name: Option<TypeName>,
    pub constraints: Vec<ColumnConstraint>,
    pub location: Location,
}

impl ColumnDef {
    pub fn is_primary_key(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.kind, ColumnConstraintKind::PrimaryKey { .. }))
    }

    pub fn is_not_null(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.kind, ColumnConstraintKind::NotNull))
    }

    pub fn is_generated(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c.kind, ColumnConstraintKind::Generated { .. }))
    }

    pub fn default_expr(&self) -> Option<&Expr> {
        self.constraints.iter().find_map(|c| match &c.kind {
            ColumnConstraintKind::Default(expr) => Some(expr),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConstraint {
    pub name: Option<Ident>,
    pub kind: ColumnConstraintKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraintKind {
    PrimaryKey {
        order: Option<SortOrder>,
        autoincrement: bool,
    },
    NotNull,
    Unique,
    Check(Expr),
    Default(Expr),
    Collate(Ident),
    ForeignKey(ForeignKeyClause),
    Generated {
        expr: Expr,
        stored: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableConstraint {
    pub name: Option<Ident>,
    pub kind: TableConstraintKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraintKind {
    PrimaryKey(Vec<IndexedColumn>),
    Unique(Vec<IndexedColumn>),
    Check(Expr),
    ForeignKey {
        columns: Vec<Ident>,
        clause: ForeignKeyClause,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyClause {
    pub table: Ident,
    pub columns: Vec<Ident>,
    pub on_delete: Option<ForeignKeyAction>,
    pub on_update: Option<ForeignKeyAction>,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    SetNull,
    SetDefault,
    Cascade,
    Restrict,
    NoAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedColumn {
    pub column: Ident,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTableStmt {
    pub id: NodeId,
    pub location: Location,
    pub table: QualifiedName,
    pub action: AlterAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    RenameTo(Ident),
    RenameColumn { from: Ident, to: Ident },
    AddColumn(ColumnDef),
    DropColumn(Ident),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub id: NodeId,
    pub location: Location,
    pub unique: bool,
    pub if_not_exists: bool,
    pub name: QualifiedName,
    pub table: Ident,
    pub columns: Vec<IndexedColumn>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    Table,
    Index,
    View,
    Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropStmt {
    pub id: NodeId,
    pub location: Location,
    pub kind: DropKind,
    pub if_exists: bool,
    pub name: QualifiedName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReindexStmt {
    pub id: NodeId,
    pub location: Location,
    pub target: Option<QualifiedName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateViewStmt {
    pub id: NodeId,
    pub location: Location,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub name: QualifiedName,
    pub columns: Vec<Ident>,
    pub select: Box<SelectStmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    Delete,
    Insert,
    Update(Vec<Ident>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTriggerStmt {
    pub id: NodeId,
    pub location: Location,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub name: QualifiedName,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    pub table: QualifiedName,
    pub for_each_row: bool,
    pub when: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateVirtualTableStmt {
    pub id: NodeId,
    pub location: Location,
    pub if_not_exists: bool,
    pub name: QualifiedName,
    pub module: Ident,
    pub args: Vec<ModuleArgument>,
}

/// One comma-separated argument of a `CREATE VIRTUAL TABLE … USING mod(…)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleArgument {
    /// A bare name, treated as a column for column-form modules like fts5.
    Column { name: Ident, unindexed: bool },
    /// `key = value`
    Option {
        key: Ident,
        value: SmolStr,
        location: Location,
    },
}

// ---------------------------------------------------------------------------
// PRAGMA and the DEFINE QUERY wrapper
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PragmaStmt {
    pub id: NodeId,
    pub location: Location,
    pub name: QualifiedName,
    pub value: Option<PragmaValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PragmaValue {
    /// `= name` or `(name)` where the value is a keyword-ish word.
    Name(Ident),
    /// `= literal` or `(literal)`
    Literal(Expr),
}

/// `DEFINE QUERY name (option: value, …) AS <statement>`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinitionStmt {
    pub id: NodeId,
    pub location: Location,
    pub name: Ident,
    pub options: Vec<QueryOption>,
    pub stmt: Box<Stmt>,
    /// Span of the `DEFINE QUERY … AS` header, removed by sanitization.
    pub header: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOption {
    pub key: Ident,
    pub value: Ident,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmptyStmt {
    pub id: NodeId,
    pub location: Location,
}
