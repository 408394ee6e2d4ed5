use std::ops::Range;

use crate::ast::expr::{Expr, FunctionArgs};
use crate::ast::stmt::{
    AlterAction, ColumnConstraintKind, ColumnDef, CreateTableBody, FromClause, InsertSource,
    ResultColumn, ReturningClause, SelectBody, SelectStmt, Stmt, TableConstraintKind,
    TableOrSubquery, UpsertAction, WithClause,
};
use crate::ast::TypeName;

/// Rewrite one statement's source text as plain SQLite.
///
/// The custom dialect extensions (the `DEFINE QUERY … AS` header and
/// `AS Label [USING adapter]` type alias suffixes) are spliced out; everything
/// else is preserved byte for byte.
pub fn sanitized_source(source: &str, stmt: &Stmt) -> String {
    let stmt = innermost(stmt);
    let mut spans = Vec::new();
    collect_stmt(stmt, &mut spans);
    splice(source, stmt.location().range(), spans)
}

fn innermost(stmt: &Stmt) -> &Stmt {
    match stmt {
        Stmt::QueryDefinition(query) => innermost(&query.stmt),
        _ => stmt,
    }
}

fn splice(source: &str, statement: Range<usize>, mut remove: Vec<Range<usize>>) -> String {
    remove.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(statement.len());
    let mut cursor = statement.start;
    for span in remove {
        if span.start < cursor || span.end > statement.end {
            continue;
        }
        // Eat the whitespace run before the span so no double gap is left.
        let mut start = span.start;
        while start > cursor && source.as_bytes()[start - 1].is_ascii_whitespace() {
            start -= 1;
        }
        out.push_str(&source[cursor..start]);
        cursor = span.end;
    }
    out.push_str(&source[cursor..statement.end]);
    out
}

fn collect_type_name(type_name: &TypeName, spans: &mut Vec<Range<usize>>) {
    if let Some(alias) = &type_name.alias {
        spans.push(alias.location.range());
    }
}

fn collect_column_def(column: &ColumnDef, spans: &mut Vec<Range<usize>>) {
    if let Some(type_name) = &column.type_name {
        collect_type_name(type_name, spans);
    }
    for constraint in &column.constraints {
        match &constraint.kind {
            ColumnConstraintKind::Check(expr)
            | ColumnConstraintKind::Default(expr)
            | ColumnConstraintKind::Generated { expr, .. } => collect_expr(expr, spans),
            _ => {}
        }
    }
}

fn collect_stmt(stmt: &Stmt, spans: &mut Vec<Range<usize>>) {
    match stmt {
        Stmt::CreateTable(create) => match &create.body {
            CreateTableBody::ColumnsAndConstraints {
                columns,
                constraints,
                ..
            } => {
                for column in columns {
                    collect_column_def(column, spans);
                }
                for constraint in constraints {
                    if let TableConstraintKind::Check(expr) = &constraint.kind {
                        collect_expr(expr, spans);
                    }
                }
            }
            CreateTableBody::AsSelect(select) => collect_select(select, spans),
        },
        Stmt::AlterTable(alter) => {
            if let AlterAction::AddColumn(column) = &alter.action {
                collect_column_def(column, spans);
            }
        }
        Stmt::CreateIndex(index) => {
            if let Some(expr) = &index.where_clause {
                collect_expr(expr, spans);
            }
        }
        Stmt::CreateView(view) => collect_select(&view.select, spans),
        Stmt::CreateTrigger(trigger) => {
            if let Some(expr) = &trigger.when {
                collect_expr(expr, spans);
            }
            for inner in &trigger.body {
                collect_stmt(inner, spans);
            }
        }
        Stmt::Select(select) => collect_select(select, spans),
        Stmt::Insert(insert) => {
            collect_with(&insert.with, spans);
            match &insert.source {
                InsertSource::Values(rows) => {
                    for row in rows {
                        for expr in &row.exprs {
                            collect_expr(expr, spans);
                        }
                    }
                }
                InsertSource::Select(select) => collect_select(select, spans),
                InsertSource::DefaultValues => {}
            }
            if let Some(upsert) = &insert.upsert {
                if let Some(expr) = &upsert.target_where {
                    collect_expr(expr, spans);
                }
                if let UpsertAction::Update { sets, where_clause } = &upsert.action {
                    for set in sets {
                        collect_expr(&set.value, spans);
                    }
                    if let Some(expr) = where_clause {
                        collect_expr(expr, spans);
                    }
                }
            }
            collect_returning(&insert.returning, spans);
        }
        Stmt::Update(update) => {
            collect_with(&update.with, spans);
            for set in &update.sets {
                collect_expr(&set.value, spans);
            }
            if let Some(from) = &update.from {
                collect_from(from, spans);
            }
            if let Some(expr) = &update.where_clause {
                collect_expr(expr, spans);
            }
            collect_returning(&update.returning, spans);
        }
        Stmt::Delete(delete) => {
            collect_with(&delete.with, spans);
            if let Some(expr) = &delete.where_clause {
                collect_expr(expr, spans);
            }
            collect_returning(&delete.returning, spans);
        }
        Stmt::QueryDefinition(query) => collect_stmt(&query.stmt, spans),
        Stmt::DropTable(_)
        | Stmt::DropIndex(_)
        | Stmt::DropView(_)
        | Stmt::DropTrigger(_)
        | Stmt::Reindex(_)
        | Stmt::CreateVirtualTable(_)
        | Stmt::Pragma(_)
        | Stmt::Empty(_) => {}
    }
}

fn collect_with(with: &Option<WithClause>, spans: &mut Vec<Range<usize>>) {
    if let Some(with) = with {
        for cte in &with.ctes {
            collect_select(&cte.select, spans);
        }
    }
}

fn collect_returning(returning: &Option<ReturningClause>, spans: &mut Vec<Range<usize>>) {
    if let Some(returning) = returning {
        for column in &returning.columns {
            if let ResultColumn::Expr { expr, .. } = column {
                collect_expr(expr, spans);
            }
        }
    }
}

fn collect_select(select: &SelectStmt, spans: &mut Vec<Range<usize>>) {
    collect_with(&select.with, spans);
    collect_select_body(&select.body, spans);
    for term in &select.order_by {
        collect_expr(&term.expr, spans);
    }
    if let Some(limit) = &select.limit {
        collect_expr(&limit.limit, spans);
        if let Some(offset) = &limit.offset {
            collect_expr(offset, spans);
        }
    }
}

fn collect_select_body(body: &SelectBody, spans: &mut Vec<Range<usize>>) {
    match body {
        SelectBody::Core(core) => collect_core(core, spans),
        SelectBody::Compound { lhs, rhs, .. } => {
            collect_select_body(lhs, spans);
            collect_core(rhs, spans);
        }
    }
}

fn collect_core(core: &crate::ast::stmt::SelectCore, spans: &mut Vec<Range<usize>>) {
    for column in &core.columns {
        if let ResultColumn::Expr { expr, .. } = column {
            collect_expr(expr, spans);
        }
    }
    if let Some(from) = &core.from {
        collect_from(from, spans);
    }
    if let Some(expr) = &core.where_clause {
        collect_expr(expr, spans);
    }
    for expr in &core.group_by {
        collect_expr(expr, spans);
    }
    if let Some(expr) = &core.having {
        collect_expr(expr, spans);
    }
}

fn collect_from(from: &FromClause, spans: &mut Vec<Range<usize>>) {
    collect_table(&from.source, spans);
    for join in &from.joins {
        collect_table(&join.table, spans);
        if let Some(crate::ast::stmt::JoinConstraint::On(expr)) = &join.constraint {
            collect_expr(expr, spans);
        }
    }
}

fn collect_table(table: &TableOrSubquery, spans: &mut Vec<Range<usize>>) {
    match table {
        TableOrSubquery::Table { .. } => {}
        TableOrSubquery::TableFunction { args, .. } => {
            for expr in args {
                collect_expr(expr, spans);
            }
        }
        TableOrSubquery::Subquery { select, .. } => collect_select(select, spans),
    }
}

fn collect_expr(expr: &Expr, spans: &mut Vec<Range<usize>>) {
    match expr {
        Expr::Cast(cast) => {
            collect_expr(&cast.operand, spans);
            collect_type_name(&cast.type_name, spans);
        }
        Expr::Prefix(prefix) => collect_expr(&prefix.operand, spans),
        Expr::Infix(infix) => {
            collect_expr(&infix.lhs, spans);
            collect_expr(&infix.rhs, spans);
        }
        Expr::Postfix(postfix) => collect_expr(&postfix.operand, spans),
        Expr::Between(between) => {
            collect_expr(&between.operand, spans);
            collect_expr(&between.lower, spans);
            collect_expr(&between.upper, spans);
        }
        Expr::Function(function) => {
            if let FunctionArgs::List { args, .. } = &function.args {
                for arg in args {
                    collect_expr(arg, spans);
                }
            }
        }
        Expr::Case(case) => {
            if let Some(operand) = &case.operand {
                collect_expr(operand, spans);
            }
            for branch in &case.branches {
                collect_expr(&branch.when, spans);
                collect_expr(&branch.then, spans);
            }
            if let Some(else_branch) = &case.else_branch {
                collect_expr(else_branch, spans);
            }
        }
        Expr::Grouped(grouped) => {
            for inner in &grouped.exprs {
                collect_expr(inner, spans);
            }
        }
        Expr::Subquery(subquery) => collect_select(&subquery.select, spans),
        Expr::Exists(exists) => collect_select(&exists.select, spans),
        Expr::Literal(_) | Expr::BindParameter(_) | Expr::Column(_) | Expr::Invalid(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse;

    fn sanitize_first(source: &str) -> String {
        let result = parse(source);
        sanitized_source(source, &result.statements[0])
    }

    #[test]
    fn test_plain_statements_pass_through() {
        assert_eq!(
            sanitize_first("SELECT id FROM users WHERE id = ?;"),
            "SELECT id FROM users WHERE id = ?"
        );
    }

    #[test]
    fn test_type_alias_suffix_is_removed() {
        assert_eq!(
            sanitize_first(
                "CREATE TABLE t (flag INTEGER AS Bool USING bool_adapter NOT NULL, n TEXT);"
            ),
            "CREATE TABLE t (flag INTEGER NOT NULL, n TEXT)"
        );
    }

    #[test]
    fn test_cast_alias_is_removed() {
        assert_eq!(
            sanitize_first("SELECT CAST(x AS INTEGER AS Bool) FROM t;"),
            "SELECT CAST(x AS INTEGER) FROM t"
        );
    }

    #[test]
    fn test_define_query_header_is_stripped() {
        assert_eq!(
            sanitize_first("DEFINE QUERY findUser(output: User) AS SELECT id FROM users;"),
            "SELECT id FROM users"
        );
    }
}
