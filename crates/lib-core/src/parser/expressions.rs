use crate::ast::expr::{
    BetweenExpr, BindParameterExpr, CaseExpr, CastExpr, ColumnExpr, ColumnTarget, ExistsExpr,
    Expr, FunctionArgs, FunctionExpr, GroupedExpr, InfixExpr, InfixOp, InvalidExpr, Literal,
    LiteralExpr, PostfixExpr, PostfixOp, PrefixExpr, PrefixOp, SubqueryExpr, WhenThen,
};
use crate::ast::Ident;
use crate::parser::Parser;
use crate::tokens::{Keyword, TokenKind};

/// Infix binding powers, loosest to tightest, following SQLite.
pub(crate) mod prec {
    pub(crate) const NONE: u8 = 0;
    pub(crate) const OR: u8 = 1;
    pub(crate) const AND: u8 = 2;
    pub(crate) const NOT: u8 = 3;
    pub(crate) const EQUALITY: u8 = 4;
    pub(crate) const COMPARISON: u8 = 5;
    pub(crate) const BITWISE: u8 = 6;
    pub(crate) const ADDITIVE: u8 = 7;
    pub(crate) const MULTIPLICATIVE: u8 = 8;
    pub(crate) const CONCAT: u8 = 9;
    pub(crate) const UNARY: u8 = 10;
    pub(crate) const COLLATE: u8 = 11;
}

fn infix_binding(kind: &TokenKind) -> Option<(InfixOp, u8)> {
    let entry = match kind {
        TokenKind::PipePipe => (InfixOp::Concat, prec::CONCAT),
        TokenKind::Arrow => (InfixOp::Extract, prec::CONCAT),
        TokenKind::LongArrow => (InfixOp::ExtractText, prec::CONCAT),
        TokenKind::Star => (InfixOp::Multiply, prec::MULTIPLICATIVE),
        TokenKind::Slash => (InfixOp::Divide, prec::MULTIPLICATIVE),
        TokenKind::Percent => (InfixOp::Modulo, prec::MULTIPLICATIVE),
        TokenKind::Plus => (InfixOp::Add, prec::ADDITIVE),
        TokenKind::Minus => (InfixOp::Subtract, prec::ADDITIVE),
        TokenKind::Ampersand => (InfixOp::BitAnd, prec::BITWISE),
        TokenKind::Pipe => (InfixOp::BitOr, prec::BITWISE),
        TokenKind::LessLess => (InfixOp::ShiftLeft, prec::BITWISE),
        TokenKind::GreaterGreater => (InfixOp::ShiftRight, prec::BITWISE),
        TokenKind::LessThan => (InfixOp::LessThan, prec::COMPARISON),
        TokenKind::LessEquals => (InfixOp::LessEquals, prec::COMPARISON),
        TokenKind::GreaterThan => (InfixOp::GreaterThan, prec::COMPARISON),
        TokenKind::GreaterEquals => (InfixOp::GreaterEquals, prec::COMPARISON),
        TokenKind::Equals | TokenKind::EqualsEquals => (InfixOp::Equals, prec::EQUALITY),
        TokenKind::BangEquals | TokenKind::LessGreater => (InfixOp::NotEquals, prec::EQUALITY),
        TokenKind::Keyword(Keyword::Glob) => (InfixOp::Glob, prec::EQUALITY),
        TokenKind::Keyword(Keyword::Regexp) => (InfixOp::Regexp, prec::EQUALITY),
        TokenKind::Keyword(Keyword::Match) => (InfixOp::Match, prec::EQUALITY),
        TokenKind::Keyword(Keyword::And) => (InfixOp::And, prec::AND),
        TokenKind::Keyword(Keyword::Or) => (InfixOp::Or, prec::OR),
        _ => return None,
    };
    Some(entry)
}

impl Parser<'_> {
    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_expr_bp(prec::NONE)
    }

    /// Parse an expression, consuming operators binding tighter than `min`.
    pub(crate) fn parse_expr_bp(&mut self, min: u8) -> Expr {
        let mut lhs = self.parse_prefix();

        loop {
            let kind = self.current().kind.clone();
            match &kind {
                TokenKind::Keyword(Keyword::Collate) if prec::COLLATE > min => {
                    self.take();
                    let name = self.take_identifier();
                    lhs = self.postfix(lhs, PostfixOp::Collate(name));
                }
                TokenKind::Keyword(Keyword::Isnull) if prec::EQUALITY > min => {
                    self.take();
                    lhs = self.postfix(lhs, PostfixOp::IsNull);
                }
                TokenKind::Keyword(Keyword::Notnull) if prec::EQUALITY > min => {
                    self.take();
                    lhs = self.postfix(lhs, PostfixOp::NotNull);
                }
                TokenKind::Keyword(Keyword::Not)
                    if self.peek().is_keyword(Keyword::Null) && prec::EQUALITY > min =>
                {
                    self.take();
                    self.take();
                    lhs = self.postfix(lhs, PostfixOp::NotNull);
                }
                TokenKind::Keyword(Keyword::Between) if prec::EQUALITY > min => {
                    self.take();
                    lhs = self.parse_between(lhs, false);
                }
                TokenKind::Keyword(Keyword::In) if prec::EQUALITY > min => {
                    self.take();
                    lhs = self.parse_in(lhs, false);
                }
                TokenKind::Keyword(Keyword::Like) if prec::EQUALITY > min => {
                    self.take();
                    lhs = self.parse_like(lhs, false);
                }
                TokenKind::Keyword(Keyword::Is) if prec::EQUALITY > min => {
                    self.take();
                    let op = if self.take_if_keyword(Keyword::Not).is_some() {
                        InfixOp::IsNot
                    } else {
                        InfixOp::Is
                    };
                    let rhs = self.parse_expr_bp(prec::EQUALITY);
                    lhs = self.infix(lhs, op, rhs);
                }
                TokenKind::Keyword(Keyword::Not) if prec::EQUALITY > min => {
                    let negated = match &self.peek().kind {
                        TokenKind::Keyword(Keyword::Between) => Some(Negated::Between),
                        TokenKind::Keyword(Keyword::In) => Some(Negated::In),
                        TokenKind::Keyword(Keyword::Like) => Some(Negated::Like),
                        TokenKind::Keyword(Keyword::Glob) => Some(Negated::Op(InfixOp::NotGlob)),
                        TokenKind::Keyword(Keyword::Regexp) => {
                            Some(Negated::Op(InfixOp::NotRegexp))
                        }
                        TokenKind::Keyword(Keyword::Match) => Some(Negated::Op(InfixOp::NotMatch)),
                        _ => None,
                    };
                    let Some(negated) = negated else {
                        break;
                    };
                    self.take();
                    self.take();
                    lhs = match negated {
                        Negated::Between => self.parse_between(lhs, true),
                        Negated::In => self.parse_in(lhs, true),
                        Negated::Like => self.parse_like(lhs, true),
                        Negated::Op(op) => {
                            let rhs = self.parse_expr_bp(prec::EQUALITY);
                            self.infix(lhs, op, rhs)
                        }
                    };
                }
                _ => {
                    let Some((op, power)) = infix_binding(&kind) else {
                        break;
                    };
                    if power <= min {
                        break;
                    }
                    self.take();
                    let rhs = self.parse_expr_bp(power);
                    lhs = self.infix(lhs, op, rhs);
                }
            }
        }

        lhs
    }

    fn infix(&mut self, lhs: Expr, op: InfixOp, rhs: Expr) -> Expr {
        let id = self.node_id();
        let location = lhs.location().spanning(rhs.location());
        Expr::Infix(InfixExpr {
            id,
            location,
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn postfix(&mut self, operand: Expr, op: PostfixOp) -> Expr {
        let id = self.node_id();
        let location = self.span_from(operand.location());
        Expr::Postfix(PostfixExpr {
            id,
            location,
            op,
            operand: Box::new(operand),
        })
    }

    /// `a [NOT] BETWEEN lower AND upper`: both bounds bind just above `AND`
    /// so the separating `AND` is left in place for us to consume.
    fn parse_between(&mut self, operand: Expr, not: bool) -> Expr {
        let lower = self.parse_expr_bp(prec::AND);
        self.consume_keyword(Keyword::And);
        let upper = self.parse_expr_bp(prec::AND);
        let id = self.node_id();
        let location = operand.location().spanning(upper.location());
        Expr::Between(BetweenExpr {
            id,
            location,
            not,
            operand: Box::new(operand),
            lower: Box::new(lower),
            upper: Box::new(upper),
        })
    }

    fn parse_in(&mut self, lhs: Expr, not: bool) -> Expr {
        let op = if not { InfixOp::NotIn } else { InfixOp::In };
        let rhs = if self.at(&TokenKind::LeftParen) {
            if self.peek().is_keyword(Keyword::Select) || self.peek().is_keyword(Keyword::With) {
                self.parse_subquery_expr()
            } else {
                let open = self.take().location;
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
                let id = self.node_id();
                Expr::Grouped(GroupedExpr {
                    id,
                    location: self.span_from(open),
                    exprs,
                })
            }
        } else {
            self.parse_expr_bp(prec::EQUALITY)
        };
        self.infix(lhs, op, rhs)
    }

    /// `LIKE` keeps its infix shape; the `ESCAPE` variant lowers to the
    /// equivalent three-argument `like()` call.
    fn parse_like(&mut self, lhs: Expr, not: bool) -> Expr {
        let rhs = self.parse_expr_bp(prec::EQUALITY);
        if self.take_if_keyword(Keyword::Escape).is_some() {
            let escape = self.parse_expr_bp(prec::EQUALITY);
            let id = self.node_id();
            let location = lhs.location().spanning(escape.location());
            let call = Expr::Function(FunctionExpr {
                id,
                location,
                name: Ident::new("like", location),
                args: FunctionArgs::List {
                    distinct: false,
                    args: vec![rhs, lhs, escape],
                },
            });
            if not {
                let id = self.node_id();
                return Expr::Prefix(PrefixExpr {
                    id,
                    location,
                    op: PrefixOp::Not,
                    operand: Box::new(call),
                });
            }
            return call;
        }
        let op = if not { InfixOp::NotLike } else { InfixOp::Like };
        self.infix(lhs, op, rhs)
    }

    fn parse_prefix(&mut self) -> Expr {
        let op = match &self.current().kind {
            TokenKind::Plus => Some(PrefixOp::Plus),
            TokenKind::Minus => Some(PrefixOp::Negate),
            TokenKind::Tilde => Some(PrefixOp::BitNot),
            TokenKind::Keyword(Keyword::Not) if !self.peek().is_keyword(Keyword::Exists) => {
                Some(PrefixOp::Not)
            }
            _ => None,
        };

        let Some(op) = op else {
            return self.parse_primary();
        };

        let token = self.take();
        let operand = if op == PrefixOp::Not {
            self.parse_expr_bp(prec::NOT)
        } else {
            self.parse_expr_bp(prec::UNARY)
        };
        let id = self.node_id();
        let location = token.location.spanning(operand.location());
        Expr::Prefix(PrefixExpr {
            id,
            location,
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Expr {
        let location = self.current().location;
        match self.current().kind.clone() {
            TokenKind::Int(value) => self.literal(Literal::Int(value)),
            TokenKind::HexInt(value) => self.literal(Literal::Int(value)),
            TokenKind::Double(value) => self.literal(Literal::Double(value)),
            TokenKind::String(value) => self.literal(Literal::String(value)),
            TokenKind::Blob(value) => self.literal(Literal::Blob(value)),
            TokenKind::Keyword(Keyword::Null) => self.literal(Literal::Null),
            TokenKind::Keyword(Keyword::True) => self.literal(Literal::True),
            TokenKind::Keyword(Keyword::False) => self.literal(Literal::False),
            TokenKind::Keyword(Keyword::CurrentTime) => self.literal(Literal::CurrentTime),
            TokenKind::Keyword(Keyword::CurrentDate) => self.literal(Literal::CurrentDate),
            TokenKind::Keyword(Keyword::CurrentTimestamp) => {
                self.literal(Literal::CurrentTimestamp)
            }
            TokenKind::Placeholder(placeholder) => {
                self.take();
                let index = self.bind_index(&placeholder);
                let id = self.node_id();
                Expr::BindParameter(BindParameterExpr {
                    id,
                    location,
                    index,
                    name: placeholder.name().cloned(),
                })
            }
            TokenKind::Keyword(Keyword::Case) => self.parse_case(),
            TokenKind::Keyword(Keyword::Cast) => self.parse_cast(),
            TokenKind::Keyword(Keyword::Exists) => self.parse_exists(false),
            TokenKind::Keyword(Keyword::Not) if self.peek().is_keyword(Keyword::Exists) => {
                self.take();
                self.parse_exists(true)
            }
            TokenKind::Keyword(Keyword::Raise) => self.parse_raise(),
            TokenKind::LeftParen => {
                if self.peek().is_keyword(Keyword::Select) || self.peek().is_keyword(Keyword::With)
                {
                    self.parse_subquery_expr()
                } else {
                    let open = self.take().location;
                    let mut exprs = vec![self.parse_expr()];
                    while self.take_if(&TokenKind::Comma).is_some() {
                        exprs.push(self.parse_expr());
                    }
                    self.expect_take(&TokenKind::RightParen);
                    let id = self.node_id();
                    Expr::Grouped(GroupedExpr {
                        id,
                        location: self.span_from(open),
                        exprs,
                    })
                }
            }
            TokenKind::Identifier(_) => self.parse_reference(),
            _ => {
                self.error_at(
                    format!("expected an expression, found {}", self.current().kind),
                    location,
                );
                let id = self.node_id();
                Expr::Invalid(InvalidExpr { id, location })
            }
        }
    }

    fn literal(&mut self, value: Literal) -> Expr {
        let token = self.take();
        let id = self.node_id();
        Expr::Literal(LiteralExpr {
            id,
            location: token.location,
            value,
        })
    }

    /// Column references (`c`, `t.c`, `s.t.c`, `t.*`) and function calls.
    fn parse_reference(&mut self) -> Expr {
        let first = self.take_identifier();

        if self.at(&TokenKind::LeftParen) {
            return self.parse_function_call(first);
        }

        let mut parts = vec![first];
        let mut star = false;
        while parts.len() < 3 && self.at(&TokenKind::Dot) {
            self.take();
            if self.at(&TokenKind::Star) {
                self.take();
                star = true;
                break;
            }
            parts.push(self.take_identifier());
        }

        let start = parts[0].location;
        let location = self.span_from(start);
        let id = self.node_id();
        let mut parts = parts.into_iter();
        let (schema, table, named) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), None, None) => (None, None, Some(a)),
            (Some(a), Some(b), None) => (None, Some(a), Some(b)),
            (Some(a), Some(b), Some(c)) => (Some(a), Some(b), Some(c)),
            _ => unreachable!(),
        };
        let (schema, table, target) = if star {
            // The parts collected so far qualify the `*`.
            match (schema, table, named) {
                (None, None, Some(t)) => (None, Some(t), ColumnTarget::Star),
                (None, Some(s), Some(t)) => (Some(s), Some(t), ColumnTarget::Star),
                _ => unreachable!(),
            }
        } else {
            (schema, table, ColumnTarget::Named(named.expect("column name")))
        };

        Expr::Column(ColumnExpr {
            id,
            location,
            schema,
            table,
            target,
        })
    }

    fn parse_function_call(&mut self, name: Ident) -> Expr {
        self.take();
        let args = if self.at(&TokenKind::Star) {
            self.take();
            self.expect_take(&TokenKind::RightParen);
            FunctionArgs::Star
        } else {
            let distinct = self.take_if_keyword(Keyword::Distinct).is_some();
            if !distinct {
                self.take_if_keyword(Keyword::All);
            }
            let mut args = Vec::new();
            if !self.at(&TokenKind::RightParen) {
                loop {
                    args.push(self.parse_expr());
                    if self.take_if(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect_take(&TokenKind::RightParen);
            FunctionArgs::List { distinct, args }
        };

        let location = self.span_from(name.location);

        if self.at_keyword(Keyword::Filter) {
            self.error_at("FILTER clauses are not supported", self.current().location);
            self.take();
            self.skip_parenthesized();
        }
        if self.at_keyword(Keyword::Over) {
            self.error_at("window functions are not supported", self.current().location);
            self.take();
            if self.at(&TokenKind::LeftParen) {
                self.skip_parenthesized();
            } else {
                self.take_identifier();
            }
        }

        let id = self.node_id();
        Expr::Function(FunctionExpr {
            id,
            location,
            name,
            args,
        })
    }

    /// Consume a balanced `( … )` group, if one is present.
    pub(crate) fn skip_parenthesized(&mut self) {
        if !self.at(&TokenKind::LeftParen) {
            return;
        }
        let mut depth = 0usize;
        loop {
            if self.current().is_eof() {
                return;
            }
            match self.take().kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn parse_case(&mut self) -> Expr {
        let start = self.take().location;
        let operand = if self.at_keyword(Keyword::When) {
            None
        } else {
            Some(Box::new(self.parse_expr()))
        };

        let mut branches = Vec::new();
        while self.take_if_keyword(Keyword::When).is_some() {
            let when = self.parse_expr();
            self.consume_keyword(Keyword::Then);
            let then = self.parse_expr();
            branches.push(WhenThen { when, then });
        }
        if branches.is_empty() {
            self.error_at("expected at least one WHEN branch", self.current().location);
        }

        let else_branch = if self.take_if_keyword(Keyword::Else).is_some() {
            Some(Box::new(self.parse_expr()))
        } else {
            None
        };
        self.consume_keyword(Keyword::End);

        let id = self.node_id();
        Expr::Case(CaseExpr {
            id,
            location: self.span_from(start),
            operand,
            branches,
            else_branch,
        })
    }

    fn parse_cast(&mut self) -> Expr {
        let start = self.take().location;
        self.expect_take(&TokenKind::LeftParen);
        let operand = self.parse_expr();
        self.consume_keyword(Keyword::As);
        let type_name = self.parse_type_name();
        self.expect_take(&TokenKind::RightParen);
        let id = self.node_id();
        Expr::Cast(CastExpr {
            id,
            location: self.span_from(start),
            operand: Box::new(operand),
            type_name,
        })
    }

    fn parse_exists(&mut self, not: bool) -> Expr {
        let start = self.take().location;
        self.expect_take(&TokenKind::LeftParen);
        let select = self.parse_select_stmt_for_subquery();
        self.expect_take(&TokenKind::RightParen);
        let id = self.node_id();
        Expr::Exists(ExistsExpr {
            id,
            location: self.span_from(start),
            not,
            select: Box::new(select),
        })
    }

    fn parse_subquery_expr(&mut self) -> Expr {
        let open = self.take().location;
        let select = self.parse_select_stmt_for_subquery();
        self.expect_take(&TokenKind::RightParen);
        let id = self.node_id();
        Expr::Subquery(SubqueryExpr {
            id,
            location: self.span_from(open),
            select: Box::new(select),
        })
    }

    /// `RAISE(IGNORE)` / `RAISE(ABORT, 'message')`, lowered to a `raise()`
    /// call so trigger bodies type-check.
    fn parse_raise(&mut self) -> Expr {
        let start = self.take().location;
        self.expect_take(&TokenKind::LeftParen);
        let mut args = Vec::new();
        if !matches!(
            self.current().kind,
            TokenKind::Keyword(
                Keyword::Ignore | Keyword::Abort | Keyword::Fail | Keyword::Rollback
            )
        ) {
            self.error_at(
                "expected one of {IGNORE, ABORT, FAIL, ROLLBACK}",
                self.current().location,
            );
        } else {
            self.take();
        }
        if self.take_if(&TokenKind::Comma).is_some() {
            args.push(self.parse_expr());
        }
        self.expect_take(&TokenKind::RightParen);
        let location = self.span_from(start);
        let id = self.node_id();
        Expr::Function(FunctionExpr {
            id,
            location,
            name: Ident::new("raise", location),
            args: FunctionArgs::List {
                distinct: false,
                args,
            },
        })
    }
}

enum Negated {
    Between,
    In,
    Like,
    Op(InfixOp),
}
