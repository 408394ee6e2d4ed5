use smol_str::SmolStr;

use crate::ast::stmt::{
    AlterAction, AlterTableStmt, ColumnConstraint, ColumnConstraintKind, ColumnDef,
    CommonTableExpr, CompoundOp, CreateIndexStmt, CreateTableBody, CreateTableStmt,
    CreateTriggerStmt, CreateViewStmt, CreateVirtualTableStmt, DeleteStmt, DropKind, DropStmt,
    EmptyStmt, ForeignKeyAction, ForeignKeyClause, FromClause, IndexedColumn, InsertSource,
    InsertStmt, Join, JoinConstraint, JoinOperator, LimitClause, ModuleArgument, OrderingTerm,
    PragmaStmt, PragmaValue, QueryDefinitionStmt, QueryOption, ReindexStmt, ResolveType,
    ResultColumn, ReturningClause, SelectBody, SelectCore, SelectStmt, SetAssignment, SetTarget,
    Stmt, TableConstraint, TableConstraintKind, TableOptions, TableOrSubquery, TriggerEvent,
    TriggerTiming, UpdateStmt, UpsertAction, UpsertClause, ValuesRow, WithClause,
};
use crate::ast::{Ident, NullsOrder, QualifiedName, SortOrder, TypeAlias, TypeName};
use crate::parser::Parser;
use crate::tokens::{Keyword, Location, TokenKind};

impl Parser<'_> {
    /// Dispatch on up to three tokens of lookahead. Statements that cannot be
    /// recognized at all are skipped up to the next `;`.
    pub(crate) fn parse_statement_dispatch(&mut self) -> Stmt {
        match &self.current().kind {
            TokenKind::Keyword(Keyword::Select) => Stmt::Select(self.parse_select_stmt(None)),
            TokenKind::Keyword(Keyword::With) => {
                let with = self.parse_with_clause();
                match &self.current().kind {
                    TokenKind::Keyword(Keyword::Select) => {
                        Stmt::Select(self.parse_select_stmt(Some(with)))
                    }
                    TokenKind::Keyword(Keyword::Insert | Keyword::Replace) => {
                        self.parse_insert(Some(with))
                    }
                    TokenKind::Keyword(Keyword::Update) => self.parse_update(Some(with)),
                    TokenKind::Keyword(Keyword::Delete) => self.parse_delete(Some(with)),
                    _ => {
                        self.error_at(
                            format!(
                                "expected one of {{SELECT, INSERT, UPDATE, DELETE}} after WITH, \
                                 found {}",
                                self.current().kind
                            ),
                            self.current().location,
                        );
                        self.recover_before_semicolon();
                        let id = self.node_id();
                        Stmt::Empty(EmptyStmt {
                            id,
                            location: with.location,
                        })
                    }
                }
            }
            TokenKind::Keyword(Keyword::Insert | Keyword::Replace) => self.parse_insert(None),
            TokenKind::Keyword(Keyword::Update) => self.parse_update(None),
            TokenKind::Keyword(Keyword::Delete) => self.parse_delete(None),
            TokenKind::Keyword(Keyword::Create) => self.parse_create(),
            TokenKind::Keyword(Keyword::Drop) => self.parse_drop(),
            TokenKind::Keyword(Keyword::Alter) => self.parse_alter_table(),
            TokenKind::Keyword(Keyword::Pragma) => self.parse_pragma(),
            TokenKind::Keyword(Keyword::Reindex) => self.parse_reindex(),
            TokenKind::Keyword(Keyword::Define) => self.parse_define_query(),
            _ => {
                let location = self.current().location;
                self.error_at(
                    format!("expected a statement, found {}", self.current().kind),
                    location,
                );
                self.recover_before_semicolon();
                let id = self.node_id();
                Stmt::Empty(EmptyStmt { id, location })
            }
        }
    }

    /// Skip tokens up to (but not including) the next `;`, or to end of input.
    fn recover_before_semicolon(&mut self) {
        while !self.current().is_eof() && !self.at(&TokenKind::Semicolon) {
            self.take();
        }
    }

    // -- names and shared fragments ----------------------------------------

    pub(crate) fn parse_qualified_name(&mut self) -> QualifiedName {
        let first = self.take_identifier();
        if self.at(&TokenKind::Dot) {
            self.take();
            let name = self.take_identifier();
            QualifiedName {
                schema: Some(first),
                name,
            }
        } else {
            QualifiedName::unqualified(first)
        }
    }

    /// A declared type: one or more words, optional `(…)` size arguments,
    /// optional `AS Label [USING adapter]` host alias suffix.
    pub(crate) fn parse_type_name(&mut self) -> TypeName {
        let first = self.take_identifier();
        let mut spelled = first.value.to_string();
        let mut location = first.location;

        while let TokenKind::Identifier(word) = &self.current().kind {
            spelled.push(' ');
            spelled.push_str(word);
            location = location.spanning(self.take().location);
        }

        if self.at(&TokenKind::LeftParen) {
            self.skip_parenthesized();
            location = self.span_from(location);
        }

        let alias = if self.at_keyword(Keyword::As)
            && matches!(self.peek().kind, TokenKind::Identifier(_))
        {
            let as_location = self.take().location;
            let label = self.take_identifier();
            let adapter = if self.take_if_keyword(Keyword::Using).is_some() {
                Some(self.take_identifier())
            } else {
                None
            };
            Some(TypeAlias {
                label,
                adapter,
                location: self.span_from(as_location),
            })
        } else {
            None
        };

        TypeName {
            name: Ident::new(SmolStr::new(spelled), location),
            alias,
        }
    }

    fn parse_ident_list(&mut self) -> Vec<Ident> {
        let mut idents = Vec::new();
        self.expect_take(&TokenKind::LeftParen);
        if !self.at(&TokenKind::RightParen) {
            loop {
                idents.push(self.take_identifier());
                if self.take_if(&TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_take(&TokenKind::RightParen);
        idents
    }

    fn parse_indexed_columns(&mut self) -> Vec<IndexedColumn> {
        let mut columns = Vec::new();
        self.expect_take(&TokenKind::LeftParen);
        if !self.at(&TokenKind::RightParen) {
            loop {
                let column = self.take_identifier();
                if self.take_if_keyword(Keyword::Collate).is_some() {
                    self.take_identifier();
                }
                let order = self.parse_sort_order();
                columns.push(IndexedColumn { column, order });
                if self.take_if(&TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_take(&TokenKind::RightParen);
        columns
    }

    fn parse_sort_order(&mut self) -> Option<SortOrder> {
        if self.take_if_keyword(Keyword::Asc).is_some() {
            Some(SortOrder::Asc)
        } else if self.take_if_keyword(Keyword::Desc).is_some() {
            Some(SortOrder::Desc)
        } else {
            None
        }
    }

    /// `ON CONFLICT ROLLBACK|ABORT|FAIL|IGNORE|REPLACE`, parsed and dropped;
    /// conflict resolution has no effect on signatures.
    fn parse_conflict_clause(&mut self) {
        if self.at_keyword(Keyword::On) && self.peek_keyword(Keyword::Conflict) {
            self.take();
            self.take();
            if !matches!(
                self.current().kind,
                TokenKind::Keyword(
                    Keyword::Rollback
                        | Keyword::Abort
                        | Keyword::Fail
                        | Keyword::Ignore
                        | Keyword::Replace
                )
            ) {
                self.error_at(
                    "expected one of {ROLLBACK, ABORT, FAIL, IGNORE, REPLACE}",
                    self.current().location,
                );
            } else {
                self.take();
            }
        }
    }

    // -- SELECT -------------------------------------------------------------

    /// A select statement whose `WITH` clause, if any, has not been consumed.
    pub(crate) fn parse_select_stmt_for_subquery(&mut self) -> SelectStmt {
        let with = if self.at_keyword(Keyword::With) {
            Some(self.parse_with_clause())
        } else {
            None
        };
        self.parse_select_stmt(with)
    }

    pub(crate) fn parse_select_stmt(&mut self, with: Option<WithClause>) -> SelectStmt {
        let start = with
            .as_ref()
            .map(|w| w.location)
            .unwrap_or(self.current().location);

        let first = self.parse_select_core();
        let mut body = SelectBody::Core(first);
        loop {
            let op = if self.take_if_keyword(Keyword::Union).is_some() {
                if self.take_if_keyword(Keyword::All).is_some() {
                    CompoundOp::UnionAll
                } else {
                    CompoundOp::Union
                }
            } else if self.take_if_keyword(Keyword::Intersect).is_some() {
                CompoundOp::Intersect
            } else if self.take_if_keyword(Keyword::Except).is_some() {
                CompoundOp::Except
            } else {
                break;
            };
            let rhs = self.parse_select_core();
            body = SelectBody::Compound {
                op,
                lhs: Box::new(body),
                rhs,
            };
        }

        let order_by = if self.take_if_keyword(Keyword::Order).is_some() {
            self.consume_keyword(Keyword::By);
            self.parse_ordering_terms()
        } else {
            Vec::new()
        };

        let limit = self.parse_limit_clause();

        let id = self.node_id();
        SelectStmt {
            id,
            location: self.span_from(start),
            with,
            body,
            order_by,
            limit,
        }
    }

    fn parse_select_core(&mut self) -> SelectCore {
        let start = self.current().location;
        self.consume_keyword(Keyword::Select);

        let distinct = self.take_if_keyword(Keyword::Distinct).is_some();
        if !distinct {
            self.take_if_keyword(Keyword::All);
        }

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_result_column());
            if self.take_if(&TokenKind::Comma).is_none() {
                break;
            }
        }

        let from = if self.take_if_keyword(Keyword::From).is_some() {
            Some(self.parse_from_clause())
        } else {
            None
        };

        let where_clause = if self.take_if_keyword(Keyword::Where).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };

        let group_by = if self.take_if_keyword(Keyword::Group).is_some() {
            self.consume_keyword(Keyword::By);
            let mut exprs = vec![self.parse_expr()];
            while self.take_if(&TokenKind::Comma).is_some() {
                exprs.push(self.parse_expr());
            }
            exprs
        } else {
            Vec::new()
        };

        let having = if self.take_if_keyword(Keyword::Having).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };

        if self.at_keyword(Keyword::Window) {
            // Declared by the grammar but unimplemented; skip the clause.
            self.error_at("WINDOW clauses are not supported", self.current().location);
            self.take();
            loop {
                self.take_identifier();
                self.consume_keyword(Keyword::As);
                self.skip_parenthesized();
                if self.take_if(&TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        SelectCore {
            location: self.span_from(start),
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
        }
    }

    pub(crate) fn parse_result_column(&mut self) -> ResultColumn {
        if self.at(&TokenKind::Star) {
            let token = self.take();
            return ResultColumn::Star(token.location);
        }
        if matches!(self.current().kind, TokenKind::Identifier(_))
            && self.peek().kind == TokenKind::Dot
            && self.peek2().kind == TokenKind::Star
        {
            let table = self.take_identifier();
            self.take();
            let star = self.take();
            return ResultColumn::TableStar(table.clone(), table.location.spanning(star.location));
        }

        let expr = self.parse_expr();
        let alias = if self.take_if_keyword(Keyword::As).is_some() {
            Some(self.take_identifier())
        } else if matches!(self.current().kind, TokenKind::Identifier(_)) {
            Some(self.take_identifier())
        } else {
            None
        };
        ResultColumn::Expr { expr, alias }
    }

    fn parse_ordering_terms(&mut self) -> Vec<OrderingTerm> {
        let mut terms = Vec::new();
        loop {
            let start = self.current().location;
            let expr = self.parse_expr();
            let order = self.parse_sort_order();
            let nulls = if self.take_if_keyword(Keyword::Nulls).is_some() {
                if self.take_if_keyword(Keyword::First).is_some() {
                    Some(NullsOrder::First)
                } else if self.take_if_keyword(Keyword::Last).is_some() {
                    Some(NullsOrder::Last)
                } else {
                    self.error_at("expected FIRST or LAST", self.current().location);
                    None
                }
            } else {
                None
            };
            terms.push(OrderingTerm {
                expr,
                order,
                nulls,
                location: self.span_from(start),
            });
            if self.take_if(&TokenKind::Comma).is_none() {
                break;
            }
        }
        terms
    }

    fn parse_limit_clause(&mut self) -> Option<LimitClause> {
        let start = self.take_if_keyword(Keyword::Limit)?.location;
        let first = self.parse_expr();
        let (limit, offset) = if self.take_if_keyword(Keyword::Offset).is_some() {
            let offset = self.parse_expr();
            (first, Some(offset))
        } else if self.take_if(&TokenKind::Comma).is_some() {
            // `LIMIT o, l` puts the offset first.
            let second = self.parse_expr();
            (second, Some(first))
        } else {
            (first, None)
        };
        Some(LimitClause {
            limit,
            offset,
            location: self.span_from(start),
        })
    }

    fn parse_with_clause(&mut self) -> WithClause {
        let start = self.take().location;
        let recursive = self.take_if_keyword(Keyword::Recursive).is_some();

        let mut ctes = Vec::new();
        loop {
            let name = self.take_identifier();
            let columns = if self.at(&TokenKind::LeftParen) {
                self.parse_ident_list()
            } else {
                Vec::new()
            };
            self.consume_keyword(Keyword::As);
            if self.take_if_keyword(Keyword::Not).is_some() {
                self.consume_keyword(Keyword::Materialized);
            } else {
                self.take_if_keyword(Keyword::Materialized);
            }
            self.expect_take(&TokenKind::LeftParen);
            let select = self.parse_select_stmt_for_subquery();
            self.expect_take(&TokenKind::RightParen);
            ctes.push(CommonTableExpr {
                location: name.location.spanning(self.span_from(name.location)),
                name,
                columns,
                select: Box::new(select),
            });
            if self.take_if(&TokenKind::Comma).is_none() {
                break;
            }
        }

        WithClause {
            recursive,
            ctes,
            location: self.span_from(start),
        }
    }

    fn parse_from_clause(&mut self) -> FromClause {
        let source = self.parse_table_or_subquery();
        let mut joins = Vec::new();

        loop {
            let start = self.current().location;
            let op = if self.take_if(&TokenKind::Comma).is_some() {
                JoinOperator::Comma
            } else if self.take_if_keyword(Keyword::Cross).is_some() {
                self.consume_keyword(Keyword::Join);
                JoinOperator::Cross
            } else {
                let natural = self.take_if_keyword(Keyword::Natural).is_some();
                if self.take_if_keyword(Keyword::Left).is_some() {
                    self.take_if_keyword(Keyword::Outer);
                    self.consume_keyword(Keyword::Join);
                    JoinOperator::Left { natural }
                } else if self.take_if_keyword(Keyword::Right).is_some() {
                    self.take_if_keyword(Keyword::Outer);
                    self.consume_keyword(Keyword::Join);
                    JoinOperator::Right { natural }
                } else if self.take_if_keyword(Keyword::Full).is_some() {
                    self.take_if_keyword(Keyword::Outer);
                    self.consume_keyword(Keyword::Join);
                    JoinOperator::Full { natural }
                } else if self.take_if_keyword(Keyword::Inner).is_some() {
                    self.consume_keyword(Keyword::Join);
                    JoinOperator::Inner { natural }
                } else if self.take_if_keyword(Keyword::Join).is_some() {
                    JoinOperator::Inner { natural }
                } else {
                    if natural {
                        self.error_at("expected JOIN after NATURAL", self.current().location);
                    }
                    break;
                }
            };

            let table = self.parse_table_or_subquery();
            let constraint = if self.take_if_keyword(Keyword::On).is_some() {
                Some(JoinConstraint::On(self.parse_expr()))
            } else if self.take_if_keyword(Keyword::Using).is_some() {
                Some(JoinConstraint::Using(self.parse_ident_list()))
            } else {
                None
            };

            joins.push(Join {
                op,
                table,
                constraint,
                location: self.span_from(start),
            });
        }

        FromClause { source, joins }
    }

    fn parse_table_or_subquery(&mut self) -> TableOrSubquery {
        let start = self.current().location;
        match &self.current().kind {
            TokenKind::LeftParen => {
                if self.peek().is_keyword(Keyword::Select) || self.peek().is_keyword(Keyword::With)
                {
                    self.take();
                    let select = self.parse_select_stmt_for_subquery();
                    self.expect_take(&TokenKind::RightParen);
                    let alias = self.parse_table_alias();
                    TableOrSubquery::Subquery {
                        select: Box::new(select),
                        alias,
                        location: self.span_from(start),
                    }
                } else {
                    self.error_at("expected a subquery", start);
                    self.skip_parenthesized();
                    TableOrSubquery::Table {
                        name: QualifiedName::unqualified(Ident::new("", start)),
                        alias: None,
                        location: self.span_from(start),
                    }
                }
            }
            TokenKind::Identifier(_) => {
                let name = self.parse_qualified_name();
                if self.at(&TokenKind::LeftParen) {
                    let mut args = Vec::new();
                    self.take();
                    if !self.at(&TokenKind::RightParen) {
                        loop {
                            args.push(self.parse_expr());
                            if self.take_if(&TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect_take(&TokenKind::RightParen);
                    let alias = self.parse_table_alias();
                    return TableOrSubquery::TableFunction {
                        name: name.name,
                        args,
                        alias,
                        location: self.span_from(start),
                    };
                }
                let alias = self.parse_table_alias();
                if self.at_keyword(Keyword::Indexed) {
                    self.take();
                    self.consume_keyword(Keyword::By);
                    self.take_identifier();
                } else if self.at_keyword(Keyword::Not) && self.peek_keyword(Keyword::Indexed) {
                    self.take();
                    self.take();
                }
                TableOrSubquery::Table {
                    name,
                    alias,
                    location: self.span_from(start),
                }
            }
            _ => {
                self.error_at(
                    format!("expected a table or subquery, found {}", self.current().kind),
                    start,
                );
                TableOrSubquery::Table {
                    name: QualifiedName::unqualified(Ident::new("", start)),
                    alias: None,
                    location: start,
                }
            }
        }
    }

    fn parse_table_alias(&mut self) -> Option<Ident> {
        if self.take_if_keyword(Keyword::As).is_some() {
            Some(self.take_identifier())
        } else if matches!(self.current().kind, TokenKind::Identifier(_)) {
            Some(self.take_identifier())
        } else {
            None
        }
    }

    // -- INSERT / UPDATE / DELETE -------------------------------------------

    fn parse_insert(&mut self, with: Option<WithClause>) -> Stmt {
        let start = with
            .as_ref()
            .map(|w| w.location)
            .unwrap_or(self.current().location);

        let or_conflict = if self.take_if_keyword(Keyword::Replace).is_some() {
            Some(ResolveType::Replace)
        } else {
            self.consume_keyword(Keyword::Insert);
            if self.take_if_keyword(Keyword::Or).is_some() {
                self.parse_resolve_type()
            } else {
                None
            }
        };

        self.consume_keyword(Keyword::Into);
        let table = self.parse_qualified_name();
        let alias = if self.take_if_keyword(Keyword::As).is_some() {
            Some(self.take_identifier())
        } else {
            None
        };

        let columns = if self.at(&TokenKind::LeftParen) {
            self.parse_ident_list()
        } else {
            Vec::new()
        };

        let source = if self.at_keyword(Keyword::Default) {
            self.take();
            self.consume_keyword(Keyword::Values);
            InsertSource::DefaultValues
        } else if self.take_if_keyword(Keyword::Values).is_some() {
            let mut rows = Vec::new();
            loop {
                let row_start = self.current().location;
                self.expect_take(&TokenKind::LeftParen);
                let mut exprs = Vec::new();
                if !self.at(&TokenKind::RightParen) {
                    loop {
                        exprs.push(self.parse_expr());
                        if self.take_if(&TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect_take(&TokenKind::RightParen);
                rows.push(ValuesRow {
                    exprs,
                    location: self.span_from(row_start),
                });
                if self.take_if(&TokenKind::Comma).is_none() {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else if self.at_keyword(Keyword::Select) || self.at_keyword(Keyword::With) {
            InsertSource::Select(Box::new(self.parse_select_stmt_for_subquery()))
        } else {
            self.error_at(
                format!(
                    "expected one of {{VALUES, SELECT, DEFAULT VALUES}}, found {}",
                    self.current().kind
                ),
                self.current().location,
            );
            InsertSource::DefaultValues
        };

        let upsert = self.parse_upsert_clause();
        let returning = self.parse_returning_clause();

        let id = self.node_id();
        Stmt::Insert(InsertStmt {
            id,
            location: self.span_from(start),
            with,
            or_conflict,
            table,
            alias,
            columns,
            source,
            upsert,
            returning,
        })
    }

    fn parse_resolve_type(&mut self) -> Option<ResolveType> {
        let resolve = match &self.current().kind {
            TokenKind::Keyword(Keyword::Abort) => ResolveType::Abort,
            TokenKind::Keyword(Keyword::Fail) => ResolveType::Fail,
            TokenKind::Keyword(Keyword::Ignore) => ResolveType::Ignore,
            TokenKind::Keyword(Keyword::Replace) => ResolveType::Replace,
            TokenKind::Keyword(Keyword::Rollback) => ResolveType::Rollback,
            _ => {
                self.error_at(
                    "expected one of {ABORT, FAIL, IGNORE, REPLACE, ROLLBACK}",
                    self.current().location,
                );
                return None;
            }
        };
        self.take();
        Some(resolve)
    }

    fn parse_upsert_clause(&mut self) -> Option<UpsertClause> {
        if !(self.at_keyword(Keyword::On) && self.peek_keyword(Keyword::Conflict)) {
            return None;
        }
        let start = self.take().location;
        self.take();

        let targets = if self.at(&TokenKind::LeftParen) {
            self.parse_indexed_columns()
        } else {
            Vec::new()
        };
        let target_where = if self.take_if_keyword(Keyword::Where).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };

        self.consume_keyword(Keyword::Do);
        let action = if self.take_if_keyword(Keyword::Nothing).is_some() {
            UpsertAction::Nothing
        } else {
            self.consume_keyword(Keyword::Update);
            self.consume_keyword(Keyword::Set);
            let sets = self.parse_set_assignments();
            let where_clause = if self.take_if_keyword(Keyword::Where).is_some() {
                Some(self.parse_expr())
            } else {
                None
            };
            UpsertAction::Update { sets, where_clause }
        };

        Some(UpsertClause {
            targets,
            target_where,
            action,
            location: self.span_from(start),
        })
    }

    fn parse_returning_clause(&mut self) -> Option<ReturningClause> {
        let start = self.take_if_keyword(Keyword::Returning)?.location;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_result_column());
            if self.take_if(&TokenKind::Comma).is_none() {
                break;
            }
        }
        Some(ReturningClause {
            columns,
            location: self.span_from(start),
        })
    }

    fn parse_set_assignments(&mut self) -> Vec<SetAssignment> {
        let mut sets = Vec::new();
        loop {
            let start = self.current().location;
            let target = if self.at(&TokenKind::LeftParen) {
                SetTarget::Tuple(self.parse_ident_list())
            } else {
                SetTarget::Single(self.take_identifier())
            };
            self.expect_take(&TokenKind::Equals);
            let value = self.parse_expr();
            sets.push(SetAssignment {
                target,
                value,
                location: self.span_from(start),
            });
            if self.take_if(&TokenKind::Comma).is_none() {
                break;
            }
        }
        sets
    }

    fn parse_update(&mut self, with: Option<WithClause>) -> Stmt {
        let start = with
            .as_ref()
            .map(|w| w.location)
            .unwrap_or(self.current().location);
        self.take();

        let or_conflict = if self.take_if_keyword(Keyword::Or).is_some() {
            self.parse_resolve_type()
        } else {
            None
        };

        let table = self.parse_qualified_name();
        let alias = self.parse_table_alias();
        self.consume_keyword(Keyword::Set);
        let sets = self.parse_set_assignments();

        let from = if self.take_if_keyword(Keyword::From).is_some() {
            Some(self.parse_from_clause())
        } else {
            None
        };
        let where_clause = if self.take_if_keyword(Keyword::Where).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };
        let returning = self.parse_returning_clause();

        let id = self.node_id();
        Stmt::Update(UpdateStmt {
            id,
            location: self.span_from(start),
            with,
            or_conflict,
            table,
            alias,
            sets,
            from,
            where_clause,
            returning,
        })
    }

    fn parse_delete(&mut self, with: Option<WithClause>) -> Stmt {
        let start = with
            .as_ref()
            .map(|w| w.location)
            .unwrap_or(self.current().location);
        self.take();
        self.consume_keyword(Keyword::From);

        let table = self.parse_qualified_name();
        let alias = self.parse_table_alias();
        let where_clause = if self.take_if_keyword(Keyword::Where).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };
        let returning = self.parse_returning_clause();

        let id = self.node_id();
        Stmt::Delete(DeleteStmt {
            id,
            location: self.span_from(start),
            with,
            table,
            alias,
            where_clause,
            returning,
        })
    }

    // -- CREATE ... ----------------------------------------------------------

    fn parse_create(&mut self) -> Stmt {
        let start = self.take().location;
        let temporary = self
            .take_if_keyword(Keyword::Temp)
            .or_else(|| self.take_if_keyword(Keyword::Temporary))
            .is_some();

        match &self.current().kind {
            TokenKind::Keyword(Keyword::Table) => self.parse_create_table(start, temporary),
            TokenKind::Keyword(Keyword::View) => self.parse_create_view(start, temporary),
            TokenKind::Keyword(Keyword::Trigger) => self.parse_create_trigger(start, temporary),
            TokenKind::Keyword(Keyword::Unique | Keyword::Index) => {
                let unique = self.take_if_keyword(Keyword::Unique).is_some();
                self.parse_create_index(start, unique)
            }
            TokenKind::Keyword(Keyword::Virtual) => self.parse_create_virtual_table(start),
            _ => {
                self.error_at(
                    format!(
                        "expected one of {{TABLE, VIEW, TRIGGER, INDEX, VIRTUAL TABLE}}, found {}",
                        self.current().kind
                    ),
                    self.current().location,
                );
                self.recover_before_semicolon();
                let id = self.node_id();
                Stmt::Empty(EmptyStmt {
                    id,
                    location: self.span_from(start),
                })
            }
        }
    }

    fn parse_if_not_exists(&mut self) -> bool {
        if self.at_keyword(Keyword::If) && self.peek_keyword(Keyword::Not) {
            self.take();
            self.take();
            self.consume_keyword(Keyword::Exists);
            true
        } else {
            false
        }
    }

    fn parse_create_table(&mut self, start: Location, temporary: bool) -> Stmt {
        self.take();
        let if_not_exists = self.parse_if_not_exists();
        let name = self.parse_qualified_name();

        let body = if self.take_if_keyword(Keyword::As).is_some() {
            CreateTableBody::AsSelect(Box::new(self.parse_select_stmt_for_subquery()))
        } else {
            self.expect_take(&TokenKind::LeftParen);
            let mut columns = Vec::new();
            let mut constraints = Vec::new();
            if !self.at(&TokenKind::RightParen) {
                loop {
                    if self.at_table_constraint() {
                        constraints.push(self.parse_table_constraint());
                    } else {
                        columns.push(self.parse_column_def());
                    }
                    if self.take_if(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_take(&TokenKind::RightParen);
            let options = self.parse_table_options();
            CreateTableBody::ColumnsAndConstraints {
                columns,
                constraints,
                options,
            }
        };

        let id = self.node_id();
        Stmt::CreateTable(CreateTableStmt {
            id,
            location: self.span_from(start),
            temporary,
            if_not_exists,
            name,
            body,
        })
    }

    fn at_table_constraint(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Keyword(
                Keyword::Constraint
                    | Keyword::Primary
                    | Keyword::Unique
                    | Keyword::Check
                    | Keyword::Foreign
            )
        )
    }

    fn parse_table_options(&mut self) -> TableOptions {
        let mut options = TableOptions::default();
        loop {
            if self.take_if_keyword(Keyword::Strict).is_some() {
                options.strict = true;
            } else if self.take_if_keyword(Keyword::Without).is_some() {
                let word = self.take_identifier();
                if !word.value.eq_ignore_ascii_case("rowid") {
                    self.error_at("expected ROWID after WITHOUT", word.location);
                }
                options.without_rowid = true;
            } else {
                break;
            }
            if self.take_if(&TokenKind::Comma).is_none() {
                break;
            }
        }
        options
    }

    pub(crate) fn parse_column_def(&mut self) -> ColumnDef {
        let name = self.take_identifier();
        let type_name = if matches!(self.current().kind, TokenKind::Identifier(_)) {
            Some(self.parse_type_name())
        } else {
            None
        };
        let constraints = self.parse_column_constraints();
        ColumnDef {
            location: self.span_from(name.location),
            name,
            type_name,
            constraints,
        }
    }

    fn parse_column_constraints(&mut self) -> Vec<ColumnConstraint> {
        let mut constraints = Vec::new();
        loop {
            let start = self.current().location;
            let constraint_name = if self.take_if_keyword(Keyword::Constraint).is_some() {
                Some(self.take_identifier())
            } else {
                None
            };

            let kind = match &self.current().kind {
                TokenKind::Keyword(Keyword::Primary) => {
                    self.take();
                    self.consume_keyword(Keyword::Key);
                    let order = self.parse_sort_order();
                    self.parse_conflict_clause();
                    let autoincrement = self.take_if_keyword(Keyword::Autoincrement).is_some();
                    ColumnConstraintKind::PrimaryKey {
                        order,
                        autoincrement,
                    }
                }
                TokenKind::Keyword(Keyword::Not) if self.peek_keyword(Keyword::Null) => {
                    self.take();
                    self.take();
                    self.parse_conflict_clause();
                    ColumnConstraintKind::NotNull
                }
                TokenKind::Keyword(Keyword::Unique) => {
                    self.take();
                    self.parse_conflict_clause();
                    ColumnConstraintKind::Unique
                }
                TokenKind::Keyword(Keyword::Check) => {
                    self.take();
                    self.expect_take(&TokenKind::LeftParen);
                    let expr = self.parse_expr();
                    self.expect_take(&TokenKind::RightParen);
                    ColumnConstraintKind::Check(expr)
                }
                TokenKind::Keyword(Keyword::Default) => {
                    self.take();
                    let expr = if self.at(&TokenKind::LeftParen) {
                        self.take();
                        let expr = self.parse_expr();
                        self.expect_take(&TokenKind::RightParen);
                        expr
                    } else {
                        // A literal or signed number; stop short of a
                        // following NOT NULL constraint.
                        self.parse_expr_bp(crate::parser::expressions::prec::EQUALITY)
                    };
                    ColumnConstraintKind::Default(expr)
                }
                TokenKind::Keyword(Keyword::Collate) => {
                    self.take();
                    ColumnConstraintKind::Collate(self.take_identifier())
                }
                TokenKind::Keyword(Keyword::References) => {
                    ColumnConstraintKind::ForeignKey(self.parse_foreign_key_clause())
                }
                TokenKind::Keyword(Keyword::Generated) => {
                    self.take();
                    self.consume_keyword(Keyword::Always);
                    self.consume_keyword(Keyword::As);
                    self.expect_take(&TokenKind::LeftParen);
                    let expr = self.parse_expr();
                    self.expect_take(&TokenKind::RightParen);
                    let stored = self.parse_generated_storage();
                    ColumnConstraintKind::Generated { expr, stored }
                }
                TokenKind::Keyword(Keyword::As) if self.peek().kind == TokenKind::LeftParen => {
                    self.take();
                    self.take();
                    let expr = self.parse_expr();
                    self.expect_take(&TokenKind::RightParen);
                    let stored = self.parse_generated_storage();
                    ColumnConstraintKind::Generated { expr, stored }
                }
                _ => {
                    if constraint_name.is_some() {
                        self.error_at(
                            format!("expected a constraint, found {}", self.current().kind),
                            self.current().location,
                        );
                    }
                    break;
                }
            };

            constraints.push(ColumnConstraint {
                name: constraint_name,
                kind,
                location: self.span_from(start),
            });
        }
        constraints
    }

    fn parse_generated_storage(&mut self) -> bool {
        if self.take_if_keyword(Keyword::Stored).is_some() {
            return true;
        }
        self.take_if_keyword(Keyword::Virtual);
        false
    }

    fn parse_table_constraint(&mut self) -> TableConstraint {
        let start = self.current().location;
        let name = if self.take_if_keyword(Keyword::Constraint).is_some() {
            Some(self.take_identifier())
        } else {
            None
        };

        let kind = match &self.current().kind {
            TokenKind::Keyword(Keyword::Primary) => {
                self.take();
                self.consume_keyword(Keyword::Key);
                let columns = self.parse_indexed_columns();
                self.parse_conflict_clause();
                TableConstraintKind::PrimaryKey(columns)
            }
            TokenKind::Keyword(Keyword::Unique) => {
                self.take();
                let columns = self.parse_indexed_columns();
                self.parse_conflict_clause();
                TableConstraintKind::Unique(columns)
            }
            TokenKind::Keyword(Keyword::Check) => {
                self.take();
                self.expect_take(&TokenKind::LeftParen);
                let expr = self.parse_expr();
                self.expect_take(&TokenKind::RightParen);
                TableConstraintKind::Check(expr)
            }
            _ => {
                self.consume_keyword(Keyword::Foreign);
                self.consume_keyword(Keyword::Key);
                let columns = self.parse_ident_list();
                let clause = self.parse_foreign_key_clause();
                TableConstraintKind::ForeignKey { columns, clause }
            }
        };

        TableConstraint {
            name,
            kind,
            location: self.span_from(start),
        }
    }

    fn parse_foreign_key_clause(&mut self) -> ForeignKeyClause {
        let start = self.current().location;
        self.consume_keyword(Keyword::References);
        let table = self.take_identifier();
        let columns = if self.at(&TokenKind::LeftParen) {
            self.parse_ident_list()
        } else {
            Vec::new()
        };

        let mut on_delete = None;
        let mut on_update = None;
        loop {
            if self.at_keyword(Keyword::On) {
                self.take();
                let is_delete = if self.take_if_keyword(Keyword::Delete).is_some() {
                    true
                } else {
                    self.consume_keyword(Keyword::Update);
                    false
                };
                let action = self.parse_foreign_key_action();
                if is_delete {
                    on_delete = action;
                } else {
                    on_update = action;
                }
            } else if self.take_if_keyword(Keyword::Match).is_some() {
                self.take_identifier();
            } else if self.at_keyword(Keyword::Deferrable)
                || (self.at_keyword(Keyword::Not) && self.peek_keyword(Keyword::Deferrable))
            {
                if self.at_keyword(Keyword::Not) {
                    self.take();
                }
                self.take();
                if self.take_if_keyword(Keyword::Initially).is_some()
                    && self.take_if_keyword(Keyword::Deferred).is_none()
                {
                    self.consume_keyword(Keyword::Immediate);
                }
            } else {
                break;
            }
        }

        ForeignKeyClause {
            table,
            columns,
            on_delete,
            on_update,
            location: self.span_from(start),
        }
    }

    fn parse_foreign_key_action(&mut self) -> Option<ForeignKeyAction> {
        if self.take_if_keyword(Keyword::Set).is_some() {
            if self.take_if_keyword(Keyword::Null).is_some() {
                Some(ForeignKeyAction::SetNull)
            } else {
                self.consume_keyword(Keyword::Default);
                Some(ForeignKeyAction::SetDefault)
            }
        } else if self.take_if_keyword(Keyword::Cascade).is_some() {
            Some(ForeignKeyAction::Cascade)
        } else if self.take_if_keyword(Keyword::Restrict).is_some() {
            Some(ForeignKeyAction::Restrict)
        } else if self.take_if_keyword(Keyword::No).is_some() {
            self.consume_keyword(Keyword::Action);
            Some(ForeignKeyAction::NoAction)
        } else {
            self.error_at(
                "expected one of {SET NULL, SET DEFAULT, CASCADE, RESTRICT, NO ACTION}",
                self.current().location,
            );
            None
        }
    }

    fn parse_create_view(&mut self, start: Location, temporary: bool) -> Stmt {
        self.take();
        let if_not_exists = self.parse_if_not_exists();
        let name = self.parse_qualified_name();
        let columns = if self.at(&TokenKind::LeftParen) {
            self.parse_ident_list()
        } else {
            Vec::new()
        };
        self.consume_keyword(Keyword::As);
        let select = self.parse_select_stmt_for_subquery();

        let id = self.node_id();
        Stmt::CreateView(CreateViewStmt {
            id,
            location: self.span_from(start),
            temporary,
            if_not_exists,
            name,
            columns,
            select: Box::new(select),
        })
    }

    fn parse_create_index(&mut self, start: Location, unique: bool) -> Stmt {
        self.consume_keyword(Keyword::Index);
        let if_not_exists = self.parse_if_not_exists();
        let name = self.parse_qualified_name();
        self.consume_keyword(Keyword::On);
        let table = self.take_identifier();
        let columns = self.parse_indexed_columns();
        let where_clause = if self.take_if_keyword(Keyword::Where).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };

        let id = self.node_id();
        Stmt::CreateIndex(CreateIndexStmt {
            id,
            location: self.span_from(start),
            unique,
            if_not_exists,
            name,
            table,
            columns,
            where_clause,
        })
    }

    fn parse_create_trigger(&mut self, start: Location, temporary: bool) -> Stmt {
        self.take();
        let if_not_exists = self.parse_if_not_exists();
        let name = self.parse_qualified_name();

        let timing = if self.take_if_keyword(Keyword::Before).is_some() {
            TriggerTiming::Before
        } else if self.take_if_keyword(Keyword::After).is_some() {
            TriggerTiming::After
        } else if self.take_if_keyword(Keyword::Instead).is_some() {
            self.consume_keyword(Keyword::Of);
            TriggerTiming::InsteadOf
        } else {
            TriggerTiming::Before
        };

        let event = if self.take_if_keyword(Keyword::Delete).is_some() {
            TriggerEvent::Delete
        } else if self.take_if_keyword(Keyword::Insert).is_some() {
            TriggerEvent::Insert
        } else {
            self.consume_keyword(Keyword::Update);
            let columns = if self.take_if_keyword(Keyword::Of).is_some() {
                let mut columns = vec![self.take_identifier()];
                while self.take_if(&TokenKind::Comma).is_some() {
                    columns.push(self.take_identifier());
                }
                columns
            } else {
                Vec::new()
            };
            TriggerEvent::Update(columns)
        };

        self.consume_keyword(Keyword::On);
        let table = self.parse_qualified_name();

        let for_each_row = if self.at_keyword(Keyword::For) {
            self.take();
            self.consume_keyword(Keyword::Each);
            self.consume_keyword(Keyword::Row);
            true
        } else {
            false
        };

        let when = if self.take_if_keyword(Keyword::When).is_some() {
            Some(self.parse_expr())
        } else {
            None
        };

        self.consume_keyword(Keyword::Begin);
        let mut body = Vec::new();
        while !self.at_keyword(Keyword::End) && !self.current().is_eof() {
            body.push(self.parse_statement_dispatch());
            if self.take_if(&TokenKind::Semicolon).is_none() {
                self.expected_semicolon_in_trigger();
                break;
            }
        }
        self.consume_keyword(Keyword::End);

        let id = self.node_id();
        Stmt::CreateTrigger(CreateTriggerStmt {
            id,
            location: self.span_from(start),
            temporary,
            if_not_exists,
            name,
            timing,
            event,
            table,
            for_each_row,
            when,
            body,
        })
    }

    fn expected_semicolon_in_trigger(&mut self) {
        self.error_at(
            format!("expected ';', found {}", self.current().kind),
            self.current().location,
        );
    }

    fn parse_create_virtual_table(&mut self, start: Location) -> Stmt {
        self.take();
        self.consume_keyword(Keyword::Table);
        let if_not_exists = self.parse_if_not_exists();
        let name = self.parse_qualified_name();
        self.consume_keyword(Keyword::Using);
        let module = self.take_identifier();

        let mut args = Vec::new();
        if self.at(&TokenKind::LeftParen) {
            self.take();
            if !self.at(&TokenKind::RightParen) {
                loop {
                    args.push(self.parse_module_argument());
                    if self.take_if(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_take(&TokenKind::RightParen);
        }

        let id = self.node_id();
        Stmt::CreateVirtualTable(CreateVirtualTableStmt {
            id,
            location: self.span_from(start),
            if_not_exists,
            name,
            module,
            args,
        })
    }

    fn parse_module_argument(&mut self) -> ModuleArgument {
        let key = self.take_identifier();

        if self.at(&TokenKind::Equals) {
            self.take();
            let value_start = self.current().location;
            let mut depth = 0usize;
            while !self.current().is_eof() {
                match &self.current().kind {
                    TokenKind::LeftParen => depth += 1,
                    TokenKind::RightParen if depth == 0 => break,
                    TokenKind::RightParen => depth -= 1,
                    TokenKind::Comma if depth == 0 => break,
                    _ => {}
                }
                self.take();
            }
            let location = value_start.spanning(self.span_from(value_start));
            let value = SmolStr::new(self.source()[value_start.start..location.end].trim());
            return ModuleArgument::Option {
                key,
                value,
                location,
            };
        }

        let mut unindexed = false;
        if let TokenKind::Identifier(word) = &self.current().kind {
            if word.eq_ignore_ascii_case("unindexed") {
                self.take();
                unindexed = true;
            }
        }
        ModuleArgument::Column {
            name: key,
            unindexed,
        }
    }

    // -- ALTER / DROP / REINDEX ---------------------------------------------

    fn parse_alter_table(&mut self) -> Stmt {
        let start = self.take().location;
        self.consume_keyword(Keyword::Table);
        let table = self.parse_qualified_name();

        let action = if self.take_if_keyword(Keyword::Rename).is_some() {
            if self.take_if_keyword(Keyword::To).is_some() {
                AlterAction::RenameTo(self.take_identifier())
            } else {
                self.take_if_keyword(Keyword::Column);
                let from = self.take_identifier();
                self.consume_keyword(Keyword::To);
                let to = self.take_identifier();
                AlterAction::RenameColumn { from, to }
            }
        } else if self.take_if_keyword(Keyword::Add).is_some() {
            self.take_if_keyword(Keyword::Column);
            AlterAction::AddColumn(self.parse_column_def())
        } else if self.take_if_keyword(Keyword::Drop).is_some() {
            self.take_if_keyword(Keyword::Column);
            AlterAction::DropColumn(self.take_identifier())
        } else {
            self.error_at(
                format!(
                    "expected one of {{RENAME, ADD, DROP}}, found {}",
                    self.current().kind
                ),
                self.current().location,
            );
            self.recover_before_semicolon();
            AlterAction::RenameTo(Ident::new("", self.current().location))
        };

        let id = self.node_id();
        Stmt::AlterTable(AlterTableStmt {
            id,
            location: self.span_from(start),
            table,
            action,
        })
    }

    fn parse_drop(&mut self) -> Stmt {
        let start = self.take().location;
        let kind = match &self.current().kind {
            TokenKind::Keyword(Keyword::Table) => DropKind::Table,
            TokenKind::Keyword(Keyword::Index) => DropKind::Index,
            TokenKind::Keyword(Keyword::View) => DropKind::View,
            TokenKind::Keyword(Keyword::Trigger) => DropKind::Trigger,
            _ => {
                self.error_at(
                    format!(
                        "expected one of {{TABLE, INDEX, VIEW, TRIGGER}}, found {}",
                        self.current().kind
                    ),
                    self.current().location,
                );
                self.recover_before_semicolon();
                let id = self.node_id();
                return Stmt::Empty(EmptyStmt {
                    id,
                    location: self.span_from(start),
                });
            }
        };
        self.take();

        let if_exists = if self.at_keyword(Keyword::If) {
            self.take();
            self.consume_keyword(Keyword::Exists);
            true
        } else {
            false
        };
        let name = self.parse_qualified_name();

        let id = self.node_id();
        let stmt = DropStmt {
            id,
            location: self.span_from(start),
            kind,
            if_exists,
            name,
        };
        match kind {
            DropKind::Table => Stmt::DropTable(stmt),
            DropKind::Index => Stmt::DropIndex(stmt),
            DropKind::View => Stmt::DropView(stmt),
            DropKind::Trigger => Stmt::DropTrigger(stmt),
        }
    }

    fn parse_reindex(&mut self) -> Stmt {
        let start = self.take().location;
        let target = if matches!(self.current().kind, TokenKind::Identifier(_)) {
            Some(self.parse_qualified_name())
        } else {
            None
        };
        let id = self.node_id();
        Stmt::Reindex(ReindexStmt {
            id,
            location: self.span_from(start),
            target,
        })
    }

    // -- PRAGMA / DEFINE QUERY ----------------------------------------------

    fn parse_pragma(&mut self) -> Stmt {
        let start = self.take().location;
        let name = self.parse_qualified_name();

        let value = if self.take_if(&TokenKind::Equals).is_some() {
            Some(self.parse_pragma_value())
        } else if self.at(&TokenKind::LeftParen) {
            self.take();
            let value = self.parse_pragma_value();
            self.expect_take(&TokenKind::RightParen);
            Some(value)
        } else {
            None
        };

        let id = self.node_id();
        Stmt::Pragma(PragmaStmt {
            id,
            location: self.span_from(start),
            name,
            value,
        })
    }

    fn parse_pragma_value(&mut self) -> PragmaValue {
        match &self.current().kind {
            TokenKind::Identifier(_) => PragmaValue::Name(self.take_identifier()),
            TokenKind::Keyword(_) => {
                // Keyword-shaped values like `on` keep their source spelling.
                let token = self.take();
                let text = &self.source()[token.location.range()];
                PragmaValue::Name(Ident::new(text, token.location))
            }
            _ => PragmaValue::Literal(self.parse_expr()),
        }
    }

    fn parse_define_query(&mut self) -> Stmt {
        let start = self.take().location;
        self.consume_keyword(Keyword::Query);
        let name = self.take_identifier();

        let mut options = Vec::new();
        if self.at(&TokenKind::LeftParen) {
            self.take();
            if !self.at(&TokenKind::RightParen) {
                loop {
                    let key = self.take_identifier();
                    // `input: User` lexes the separator either as bare
                    // punctuation or glued to the value.
                    let value = if let TokenKind::Placeholder(
                        crate::tokens::Placeholder::Colon(glued),
                    ) = &self.current().kind
                    {
                        let glued = glued.clone();
                        let token = self.take();
                        Ident::new(glued, token.location)
                    } else {
                        self.expect_take(&TokenKind::Colon);
                        self.take_identifier()
                    };
                    options.push(QueryOption {
                        location: key.location.spanning(value.location),
                        key,
                        value,
                    });
                    if self.take_if(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_take(&TokenKind::RightParen);
        }

        self.consume_keyword(Keyword::As);
        let header = self.span_from(start);
        let stmt = self.parse_statement_dispatch();

        let id = self.node_id();
        Stmt::QueryDefinition(QueryDefinitionStmt {
            id,
            location: self.span_from(start),
            name,
            options,
            stmt: Box::new(stmt),
            header,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse;

    fn single(source: &str) -> Stmt {
        let result = parse(source);
        assert_eq!(result.diagnostics, vec![], "unexpected diagnostics");
        assert_eq!(result.statements.len(), 1);
        result.statements.into_iter().next().unwrap()
    }

    #[test]
    fn test_create_table_columns_and_constraints() {
        let Stmt::CreateTable(create) = single(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                age INTEGER DEFAULT 0,
                bio TEXT,
                UNIQUE (name)
            ) STRICT;",
        ) else {
            panic!("expected create table");
        };
        assert_eq!(create.name.name.as_str(), "users");
        let CreateTableBody::ColumnsAndConstraints {
            columns,
            constraints,
            options,
        } = &create.body
        else {
            panic!();
        };
        assert_eq!(columns.len(), 4);
        assert!(columns[0].is_primary_key());
        assert!(columns[1].is_not_null());
        assert!(columns[2].default_expr().is_some());
        assert_eq!(constraints.len(), 1);
        assert!(options.strict);
    }

    #[test]
    fn test_create_table_with_type_alias() {
        let Stmt::CreateTable(create) =
            single("CREATE TABLE t (flag INTEGER AS Bool USING bool_adapter NOT NULL);")
        else {
            panic!();
        };
        let CreateTableBody::ColumnsAndConstraints { columns, .. } = &create.body else {
            panic!();
        };
        let alias = columns[0].type_name.as_ref().unwrap().alias.as_ref().unwrap();
        assert_eq!(alias.label.as_str(), "Bool");
        assert_eq!(alias.adapter.as_ref().unwrap().as_str(), "bool_adapter");
    }

    #[test]
    fn test_select_with_joins() {
        let Stmt::Select(select) = single(
            "SELECT a.x, b.* FROM a LEFT OUTER JOIN b ON a.id = b.a_id, c WHERE a.x > 1;",
        ) else {
            panic!();
        };
        let SelectBody::Core(core) = &select.body else {
            panic!();
        };
        assert_eq!(core.columns.len(), 2);
        assert!(matches!(core.columns[1], ResultColumn::TableStar(..)));
        let from = core.from.as_ref().unwrap();
        assert_eq!(from.joins.len(), 2);
        assert!(matches!(
            from.joins[0].op,
            JoinOperator::Left { natural: false }
        ));
        assert!(matches!(from.joins[1].op, JoinOperator::Comma));
    }

    #[test]
    fn test_compound_select_with_order_and_limit() {
        let Stmt::Select(select) =
            single("SELECT a FROM t UNION ALL SELECT b FROM u ORDER BY 1 LIMIT 10 OFFSET 2;")
        else {
            panic!();
        };
        assert!(select.body.is_compound());
        assert_eq!(select.order_by.len(), 1);
        let limit = select.limit.as_ref().unwrap();
        assert!(limit.offset.is_some());
    }

    #[test]
    fn test_with_recursive_cte() {
        let Stmt::Select(select) = single(
            "WITH RECURSIVE cnt(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM cnt LIMIT 5)
             SELECT x FROM cnt;",
        ) else {
            panic!();
        };
        let with = select.with.as_ref().unwrap();
        assert!(with.recursive);
        assert_eq!(with.ctes.len(), 1);
        assert_eq!(with.ctes[0].name.as_str(), "cnt");
        assert_eq!(with.ctes[0].columns.len(), 1);
    }

    #[test]
    fn test_insert_with_upsert_and_returning() {
        let Stmt::Insert(insert) = single(
            "INSERT INTO users (id, name) VALUES (?, ?), (?, ?)
             ON CONFLICT (id) DO UPDATE SET name = excluded.name
             RETURNING id;",
        ) else {
            panic!();
        };
        assert_eq!(insert.columns.len(), 2);
        let InsertSource::Values(rows) = &insert.source else {
            panic!();
        };
        assert_eq!(rows.len(), 2);
        assert!(matches!(
            insert.upsert.as_ref().unwrap().action,
            UpsertAction::Update { .. }
        ));
        assert!(insert.returning.is_some());
    }

    #[test]
    fn test_update_tuple_set() {
        let Stmt::Update(update) = single("UPDATE t SET (a, b) = (1, 2) WHERE id = 3;") else {
            panic!();
        };
        assert_eq!(update.sets.len(), 1);
        assert!(matches!(update.sets[0].target, SetTarget::Tuple(_)));
    }

    #[test]
    fn test_create_trigger_body() {
        let Stmt::CreateTrigger(trigger) = single(
            "CREATE TRIGGER log_insert AFTER INSERT ON users BEGIN
                INSERT INTO audit (user_id) VALUES (new.id);
             END;",
        ) else {
            panic!();
        };
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert!(matches!(trigger.event, TriggerEvent::Insert));
        assert_eq!(trigger.body.len(), 1);
    }

    #[test]
    fn test_create_virtual_table_fts5() {
        let Stmt::CreateVirtualTable(virtual_table) =
            single("CREATE VIRTUAL TABLE posts_fts USING fts5(title, body, tokenize = 'porter');")
        else {
            panic!();
        };
        assert_eq!(virtual_table.module.as_str(), "fts5");
        assert_eq!(virtual_table.args.len(), 3);
        assert!(matches!(
            &virtual_table.args[2],
            ModuleArgument::Option { key, .. } if key.as_str() == "tokenize"
        ));
    }

    #[test]
    fn test_define_query() {
        let Stmt::QueryDefinition(query) = single(
            "DEFINE QUERY findUser(output: User) AS SELECT id, name FROM users WHERE id = :id;",
        ) else {
            panic!();
        };
        assert_eq!(query.name.as_str(), "findUser");
        assert_eq!(query.options.len(), 1);
        assert_eq!(query.options[0].key.as_str(), "output");
        assert_eq!(query.options[0].value.as_str(), "User");
        assert!(matches!(*query.stmt, Stmt::Select(_)));
    }

    #[test]
    fn test_pragma_value_forms() {
        let Stmt::Pragma(pragma) = single("PRAGMA require_strict_tables = on;") else {
            panic!();
        };
        assert_eq!(pragma.name.name.as_str(), "require_strict_tables");
        let Some(PragmaValue::Name(value)) = &pragma.value else {
            panic!();
        };
        assert_eq!(value.as_str(), "on");
    }

    #[test]
    fn test_alter_table_actions() {
        assert!(matches!(
            single("ALTER TABLE t RENAME TO u;"),
            Stmt::AlterTable(AlterTableStmt {
                action: AlterAction::RenameTo(_),
                ..
            })
        ));
        assert!(matches!(
            single("ALTER TABLE t RENAME COLUMN a TO b;"),
            Stmt::AlterTable(AlterTableStmt {
                action: AlterAction::RenameColumn { .. },
                ..
            })
        ));
        assert!(matches!(
            single("ALTER TABLE t ADD COLUMN c TEXT;"),
            Stmt::AlterTable(AlterTableStmt {
                action: AlterAction::AddColumn(_),
                ..
            })
        ));
        assert!(matches!(
            single("ALTER TABLE t DROP COLUMN c;"),
            Stmt::AlterTable(AlterTableStmt {
                action: AlterAction::DropColumn(_),
                ..
            })
        ));
    }

    #[test]
    fn test_window_clause_is_rejected() {
        let result = parse("SELECT x FROM t WINDOW w AS (PARTITION BY y);");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("WINDOW clauses are not supported")));
    }

    #[test]
    fn test_drop_statements() {
        assert!(matches!(single("DROP TABLE t;"), Stmt::DropTable(_)));
        assert!(matches!(
            single("DROP INDEX IF EXISTS idx;"),
            Stmt::DropIndex(DropStmt {
                if_exists: true,
                ..
            })
        ));
        assert!(matches!(single("DROP VIEW v;"), Stmt::DropView(_)));
        assert!(matches!(single("DROP TRIGGER tr;"), Stmt::DropTrigger(_)));
    }
}
