pub mod expressions;
pub mod statements;

use ahash::AHashMap;
use smol_str::SmolStr;

use crate::ast::stmt::Stmt;
use crate::ast::{Ident, NodeId};
use crate::errors::{self, Diagnostic};
use crate::lexer::Lexer;
use crate::tokens::{Keyword, Location, Placeholder, Token, TokenKind};

/// Everything the parser produced for one source string.
#[derive(Debug)]
pub struct ParseResult {
    pub statements: Vec<Stmt>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a whole source string. Convenience over driving [`Parser`] by hand.
pub fn parse(source: &str) -> ParseResult {
    let mut parser = Parser::new(source);
    let mut statements = Vec::new();
    while let Some(stmt) = parser.parse_statement() {
        statements.push(stmt);
    }
    ParseResult {
        statements,
        diagnostics: parser.finish(),
    }
}

/// Recursive-descent parser with three buffered tokens of lookahead.
///
/// The parser never aborts: expected-token mismatches produce diagnostics and
/// synthesized placeholders, unparseable expressions become `Invalid` nodes,
/// and statements that cannot be salvaged are skipped up to the next `;`.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    peek: Token,
    peek2: Token,
    /// Location of the most recently consumed token; spans statements.
    last_location: Location,
    next_node_id: u32,
    bind: BindParameters,
    diagnostics: Vec<Diagnostic>,
}

/// Bind-parameter indexing state for the current top-level statement.
///
/// Anonymous `?` always takes a fresh index; named and numbered forms reuse
/// the index of their first occurrence.
#[derive(Debug, Default)]
struct BindParameters {
    next_index: u32,
    named: AHashMap<SmolStr, u32>,
    numbered: AHashMap<i64, u32>,
}

impl BindParameters {
    fn reset(&mut self) {
        self.next_index = 0;
        self.named.clear();
        self.numbered.clear();
    }

    fn index_for(&mut self, placeholder: &Placeholder) -> u32 {
        match placeholder {
            Placeholder::Anonymous => self.fresh(),
            Placeholder::Numbered(n) => {
                if let Some(index) = self.numbered.get(n) {
                    return *index;
                }
                let index = self.fresh();
                self.numbered.insert(*n, index);
                index
            }
            Placeholder::Colon(name) | Placeholder::At(name) | Placeholder::Tcl(name) => {
                if let Some(index) = self.named.get(name) {
                    return *index;
                }
                let index = self.fresh();
                self.named.insert(name.clone(), index);
                index
            }
        }
    }

    fn fresh(&mut self) -> u32 {
        self.next_index += 1;
        self.next_index
    }
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        let peek = lexer.next_token();
        let peek2 = lexer.next_token();
        Self {
            lexer,
            current,
            peek,
            peek2,
            last_location: Location::default(),
            next_node_id: 0,
            bind: BindParameters::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn source(&self) -> &'src str {
        self.lexer.source()
    }

    /// All diagnostics from the lexer and the parser, in source order.
    pub fn finish(mut self) -> Vec<Diagnostic> {
        self.diagnostics.append(&mut self.lexer.take_diagnostics());
        errors::sort_by_location(&mut self.diagnostics);
        self.diagnostics
    }

    // -- token plumbing ----------------------------------------------------

    pub(crate) fn current(&self) -> &Token {
        &self.current
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.peek
    }

    pub(crate) fn peek2(&self) -> &Token {
        &self.peek2
    }

    /// Consume and return the current token.
    pub(crate) fn take(&mut self) -> Token {
        let next2 = self.lexer.next_token();
        let consumed = std::mem::replace(
            &mut self.current,
            std::mem::replace(&mut self.peek, std::mem::replace(&mut self.peek2, next2)),
        );
        self.last_location = consumed.location;
        consumed
    }

    /// Consume the current token if it matches `kind`.
    pub(crate) fn take_if(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.current.kind.matches(kind) {
            Some(self.take())
        } else {
            None
        }
    }

    pub(crate) fn take_if_keyword(&mut self, keyword: Keyword) -> Option<Token> {
        if self.current.is_keyword(keyword) {
            Some(self.take())
        } else {
            None
        }
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        self.current.kind.matches(kind)
    }

    pub(crate) fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current.is_keyword(keyword)
    }

    pub(crate) fn peek_keyword(&self, keyword: Keyword) -> bool {
        self.peek.is_keyword(keyword)
    }

    /// Expect `kind` at the current position. On mismatch, emit a diagnostic
    /// and eat nothing.
    pub(crate) fn consume(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.current.kind.matches(kind) {
            Some(self.take())
        } else {
            self.expected(kind);
            None
        }
    }

    pub(crate) fn consume_keyword(&mut self, keyword: Keyword) -> Option<Token> {
        self.consume(&TokenKind::Keyword(keyword))
    }

    /// Expect `kind` at the current position. On mismatch, emit a diagnostic
    /// and synthesize a zero-width placeholder so parsing can continue.
    pub(crate) fn expect_take(&mut self, kind: &TokenKind) -> Token {
        if self.current.kind.matches(kind) {
            self.take()
        } else {
            self.expected(kind);
            Token::new(
                kind.clone(),
                Location::point(
                    self.current.location.start,
                    self.current.location.line,
                    self.current.location.column,
                ),
            )
        }
    }

    fn expected(&mut self, kind: &TokenKind) {
        self.diagnostics.push(Diagnostic::error(
            format!("expected {}, found {}", kind, self.current.kind),
            self.current.location,
        ));
    }

    /// Expect an identifier. Synthesizes an empty name on mismatch.
    pub(crate) fn take_identifier(&mut self) -> Ident {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let token = self.take();
                Ident::new(name, token.location)
            }
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    format!("expected an identifier, found {}", self.current.kind),
                    self.current.location,
                ));
                Ident::new("", self.current.location)
            }
        }
    }

    pub(crate) fn error_at(&mut self, message: impl Into<String>, location: Location) {
        self.diagnostics.push(Diagnostic::error(message, location));
    }

    // -- node plumbing -----------------------------------------------------

    pub(crate) fn node_id(&mut self) -> NodeId {
        self.next_node_id += 1;
        NodeId(self.next_node_id)
    }

    /// Location spanning from `start` through the last consumed token.
    pub(crate) fn span_from(&self, start: Location) -> Location {
        start.spanning(self.last_location)
    }

    pub(crate) fn bind_index(&mut self, placeholder: &Placeholder) -> u32 {
        self.bind.index_for(placeholder)
    }

    /// Reset bind-parameter indexing; runs between top-level statements.
    pub(crate) fn reset_parameter_index(&mut self) {
        self.bind.reset();
    }

    // -- statement loop ----------------------------------------------------

    /// Parse the next top-level statement, or `None` at end of input.
    pub fn parse_statement(&mut self) -> Option<Stmt> {
        if self.current.is_eof() {
            return None;
        }

        self.reset_parameter_index();

        if let Some(token) = self.take_if(&TokenKind::Semicolon) {
            let id = self.node_id();
            return Some(Stmt::Empty(crate::ast::stmt::EmptyStmt {
                id,
                location: token.location,
            }));
        }

        let stmt = self.parse_statement_dispatch();

        if self.take_if(&TokenKind::Semicolon).is_none() && !self.current.is_eof() {
            self.expected(&TokenKind::Semicolon);
            self.recover_to_statement_boundary();
        }

        log::trace!("parsed statement ending at byte {}", self.last_location.end);
        Some(stmt)
    }

    /// Skip tokens through the next `;` (inclusive) or to end of input.
    pub(crate) fn recover_to_statement_boundary(&mut self) {
        loop {
            if self.current.is_eof() {
                return;
            }
            if self.take().kind == TokenKind::Semicolon {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::expr::{Expr, InfixOp};
    use crate::ast::stmt::{SelectBody, Stmt};

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let result = parse(source);
        assert_eq!(result.diagnostics, vec![], "unexpected diagnostics");
        result.statements
    }

    #[test]
    fn test_statements_split_on_semicolons() {
        let stmts = parse_ok("SELECT 1; SELECT 2; ;");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::Select(_)));
        assert!(matches!(stmts[1], Stmt::Select(_)));
        assert!(matches!(stmts[2], Stmt::Empty(_)));
    }

    #[test]
    fn test_node_ids_are_unique_and_nonzero() {
        let result = parse("SELECT a + b FROM t WHERE c = 1;");
        let mut seen = std::collections::HashSet::new();
        fn walk(expr: &Expr, seen: &mut std::collections::HashSet<u32>) {
            assert!(expr.id().0 != 0);
            assert!(seen.insert(expr.id().0), "duplicate node id");
            if let Expr::Infix(infix) = expr {
                walk(&infix.lhs, seen);
                walk(&infix.rhs, seen);
            }
        }
        let Stmt::Select(select) = &result.statements[0] else {
            panic!("expected select");
        };
        let SelectBody::Core(core) = &select.body else {
            panic!("expected plain core");
        };
        for column in &core.columns {
            if let crate::ast::stmt::ResultColumn::Expr { expr, .. } = column {
                walk(expr, &mut seen);
            }
        }
        if let Some(where_clause) = &core.where_clause {
            walk(where_clause, &mut seen);
        }
    }

    #[test]
    fn test_statement_location_excludes_semicolon() {
        let source = "SELECT 1 ;";
        let result = parse(source);
        let location = result.statements[0].location();
        assert_eq!(&source[location.range()], "SELECT 1");
    }

    #[test]
    fn test_bind_indices_reset_between_statements() {
        let result = parse("SELECT ?, :a, ?, :a; SELECT :b, ?;");
        let mut indices = Vec::new();
        for stmt in &result.statements {
            let Stmt::Select(select) = stmt else {
                panic!()
            };
            let SelectBody::Core(core) = &select.body else {
                panic!()
            };
            let mut per_stmt = Vec::new();
            for column in &core.columns {
                let crate::ast::stmt::ResultColumn::Expr { expr, .. } = column else {
                    panic!()
                };
                let Expr::BindParameter(bind) = expr else {
                    panic!()
                };
                per_stmt.push(bind.index);
            }
            indices.push(per_stmt);
        }
        assert_eq!(indices, vec![vec![1, 2, 3, 2], vec![1, 2]]);
    }

    #[test]
    fn test_numbered_parameters_share_indices() {
        let result = parse("SELECT ?2, ?1, ?2;");
        let Stmt::Select(select) = &result.statements[0] else {
            panic!()
        };
        let SelectBody::Core(core) = &select.body else {
            panic!()
        };
        let indices: Vec<u32> = core
            .columns
            .iter()
            .map(|c| match c {
                crate::ast::stmt::ResultColumn::Expr {
                    expr: Expr::BindParameter(bind),
                    ..
                } => bind.index,
                _ => panic!(),
            })
            .collect();
        assert_eq!(indices, vec![1, 2, 1]);
    }

    #[test]
    fn test_recovery_consumes_to_next_semicolon() {
        let result = parse("SELECT FROM WHERE garbage; SELECT 1;");
        assert!(!result.diagnostics.is_empty());
        assert_eq!(result.statements.len(), 2);
        assert!(matches!(result.statements[1], Stmt::Select(_)));
    }

    #[test]
    fn test_operator_precedence() {
        let result = parse("SELECT 1 + 2 * 3;");
        let Stmt::Select(select) = &result.statements[0] else {
            panic!()
        };
        let SelectBody::Core(core) = &select.body else {
            panic!()
        };
        let crate::ast::stmt::ResultColumn::Expr { expr, .. } = &core.columns[0] else {
            panic!()
        };
        let Expr::Infix(add) = expr else {
            panic!("expected infix, got {expr:?}")
        };
        assert_eq!(add.op, InfixOp::Add);
        assert!(matches!(&*add.rhs, Expr::Infix(mul) if mul.op == InfixOp::Multiply));
    }
}
