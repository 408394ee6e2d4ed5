use smol_str::SmolStr;

use super::{Ident, NodeId, TypeName};
use crate::ast::stmt::SelectStmt;
use crate::tokens::Location;

/// Expression nodes. Every variant carries its [`NodeId`] and [`Location`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LiteralExpr),
    BindParameter(BindParameterExpr),
    Column(ColumnExpr),
    Prefix(PrefixExpr),
    Infix(InfixExpr),
    Postfix(PostfixExpr),
    Between(BetweenExpr),
    Function(FunctionExpr),
    Cast(CastExpr),
    Case(CaseExpr),
    Grouped(GroupedExpr),
    Subquery(SubqueryExpr),
    Exists(ExistsExpr),
    /// Produced by error recovery; checks to the error type.
    Invalid(InvalidExpr),
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Literal(e) => e.id,
            Expr::BindParameter(e) => e.id,
            Expr::Column(e) => e.id,
            Expr::Prefix(e) => e.id,
            Expr::Infix(e) => e.id,
            Expr::Postfix(e) => e.id,
            Expr::Between(e) => e.id,
            Expr::Function(e) => e.id,
            Expr::Cast(e) => e.id,
            Expr::Case(e) => e.id,
            Expr::Grouped(e) => e.id,
            Expr::Subquery(e) => e.id,
            Expr::Exists(e) => e.id,
            Expr::Invalid(e) => e.id,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Expr::Literal(e) => e.location,
            Expr::BindParameter(e) => e.location,
            Expr::Column(e) => e.location,
            Expr::Prefix(e) => e.location,
            Expr::Infix(e) => e.location,
            Expr::Postfix(e) => e.location,
            Expr::Between(e) => e.location,
            Expr::Function(e) => e.location,
            Expr::Cast(e) => e.location,
            Expr::Case(e) => e.location,
            Expr::Grouped(e) => e.location,
            Expr::Subquery(e) => e.location,
            Expr::Exists(e) => e.location,
            Expr::Invalid(e) => e.location,
        }
    }

    /// The bare column name, if this is an unstarred column reference.
    pub fn column_name(&self) -> Option<&Ident> {
        match self {
            Expr::Column(column) => match &column.target {
                ColumnTarget::Named(name) => Some(name),
                ColumnTarget::Star => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub id: NodeId,
    pub location: Location,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    String(SmolStr),
    Blob(SmolStr),
    Null,
    True,
    False,
    CurrentTime,
    CurrentDate,
    CurrentTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindParameterExpr {
    pub id: NodeId,
    pub location: Location,
    /// 1-based index in use order within the enclosing top-level statement.
    /// Repeated named (or numbered) parameters share an index.
    pub index: u32,
    /// Textual name for `:x`, `@x` and `$x` forms.
    pub name: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    pub id: NodeId,
    pub location: Location,
    pub schema: Option<Ident>,
    pub table: Option<Ident>,
    pub target: ColumnTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnTarget {
    Named(Ident),
    /// `*` or `table.*`
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::AsRefStr)]
pub enum PrefixOp {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "~")]
    BitNot,
    #[strum(serialize = "NOT")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::AsRefStr)]
pub enum InfixOp {
    #[strum(serialize = "||")]
    Concat,
    #[strum(serialize = "->")]
    Extract,
    #[strum(serialize = "->>")]
    ExtractText,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessEquals,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterEquals,
    #[strum(serialize = "=")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "IS")]
    Is,
    #[strum(serialize = "IS NOT")]
    IsNot,
    #[strum(serialize = "IN")]
    In,
    #[strum(serialize = "NOT IN")]
    NotIn,
    #[strum(serialize = "LIKE")]
    Like,
    #[strum(serialize = "NOT LIKE")]
    NotLike,
    #[strum(serialize = "GLOB")]
    Glob,
    #[strum(serialize = "NOT GLOB")]
    NotGlob,
    #[strum(serialize = "REGEXP")]
    Regexp,
    #[strum(serialize = "NOT REGEXP")]
    NotRegexp,
    #[strum(serialize = "MATCH")]
    Match,
    #[strum(serialize = "NOT MATCH")]
    NotMatch,
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostfixOp {
    IsNull,
    NotNull,
    Collate(Ident),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefixExpr {
    pub id: NodeId,
    pub location: Location,
    pub op: PrefixOp,
    pub operand: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfixExpr {
    pub id: NodeId,
    pub location: Location,
    pub op: InfixOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostfixExpr {
    pub id: NodeId,
    pub location: Location,
    pub op: PostfixOp,
    pub operand: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetweenExpr {
    pub id: NodeId,
    pub location: Location,
    pub not: bool,
    pub operand: Box<Expr>,
    pub lower: Box<Expr>,
    pub upper: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpr {
    pub id: NodeId,
    pub location: Location,
    pub name: Ident,
    pub args: FunctionArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgs {
    /// `count(*)`
    Star,
    List { distinct: bool, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastExpr {
    pub id: NodeId,
    pub location: Location,
    pub operand: Box<Expr>,
    pub type_name: TypeName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub id: NodeId,
    pub location: Location,
    pub operand: Option<Box<Expr>>,
    pub branches: Vec<WhenThen>,
    pub else_branch: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenThen {
    pub when: Expr,
    pub then: Expr,
}

/// A parenthesized expression list; a one-element list is plain grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedExpr {
    pub id: NodeId,
    pub location: Location,
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    pub id: NodeId,
    pub location: Location,
    pub select: Box<SelectStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsExpr {
    pub id: NodeId,
    pub location: Location,
    pub not: bool,
    pub select: Box<SelectStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidExpr {
    pub id: NodeId,
    pub location: Location,
}
