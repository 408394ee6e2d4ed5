use nohash_hasher::IntMap;
use smol_str::SmolStr;
use squill_lib_core::ast::expr::{Expr, FunctionArgs, InfixOp};
use squill_lib_core::ast::stmt::{
    FromClause, InsertSource, JoinConstraint, ResultColumn, ReturningClause, SelectBody,
    SelectCore, SelectStmt, SetAssignment, SetTarget, Stmt, TableOrSubquery, UpsertAction,
    WithClause,
};

/// Candidate name for an expression while walking the checked tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Name {
    /// A proposed name, usually from a column reference.
    Some(SmolStr),
    /// An anonymous bind parameter awaiting a name.
    Needed(u32),
    None,
}

impl Name {
    /// Currently unused; kept until the intended predicate behavior is
    /// clarified. The rest of the module reads the payload directly.
    #[allow(dead_code)]
    pub fn is_some(&self) -> bool {
        false
    }

    /// Currently unused; see [`Name::is_some`].
    #[allow(dead_code)]
    pub fn is_needed(&self) -> bool {
        false
    }
}

/// Walk a statement and propose names for its bind parameters.
///
/// Explicitly named forms (`:name`, `@name`, `$name`) keep their own names;
/// anonymous `?` parameters pick up names from the columns they are compared
/// or assigned to. Returns a map from bind index to name.
pub fn infer_parameter_names(stmt: &Stmt) -> IntMap<u32, SmolStr> {
    let mut inferrer = NameInferrer {
        names: IntMap::default(),
    };
    inferrer.visit_stmt(stmt);
    inferrer.names
}

struct NameInferrer {
    names: IntMap<u32, SmolStr>,
}

impl NameInferrer {
    fn propose(&mut self, index: u32, name: impl Into<SmolStr>) {
        self.names.entry(index).or_insert_with(|| name.into());
    }

    /// Merge the names of two children: a proposed name feeds a parameter
    /// that needs one; otherwise the concrete name wins.
    fn combine(&mut self, lhs: Name, rhs: Name) -> Name {
        match (lhs, rhs) {
            (Name::Some(name), Name::Needed(index)) | (Name::Needed(index), Name::Some(name)) => {
                self.propose(index, name);
                Name::None
            }
            (Name::Some(name), _) | (_, Name::Some(name)) => Name::Some(name),
            (Name::Needed(index), _) | (_, Name::Needed(index)) => Name::Needed(index),
            (Name::None, Name::None) => Name::None,
        }
    }

    fn visit_expr(&mut self, expr: &Expr) -> Name {
        match expr {
            Expr::Column(column) => match &column.target {
                squill_lib_core::ast::expr::ColumnTarget::Named(name) => {
                    Name::Some(name.value.clone())
                }
                squill_lib_core::ast::expr::ColumnTarget::Star => Name::None,
            },
            Expr::BindParameter(bind) => match &bind.name {
                Some(explicit) => {
                    self.names.insert(bind.index, explicit.clone());
                    Name::None
                }
                None => Name::Needed(bind.index),
            },
            Expr::Infix(infix) => {
                let lhs = self.visit_expr(&infix.lhs);
                let rhs = self.visit_expr(&infix.rhs);
                match infix.op {
                    // `x IN (?)` proposes the pluralized column name.
                    InfixOp::In | InfixOp::NotIn => {
                        if let (Name::Some(name), Name::Needed(index)) = (&lhs, &rhs) {
                            self.propose(*index, pluralize(name));
                        }
                        Name::None
                    }
                    _ => self.combine(lhs, rhs),
                }
            }
            Expr::Between(between) => {
                let operand = self.visit_expr(&between.operand);
                let lower = self.visit_expr(&between.lower);
                let upper = self.visit_expr(&between.upper);
                if let Name::Some(name) = operand {
                    if let Name::Needed(index) = lower {
                        self.propose(index, camel_suffix(&name, "Lower"));
                    }
                    if let Name::Needed(index) = upper {
                        self.propose(index, camel_suffix(&name, "Upper"));
                    }
                }
                Name::None
            }
            Expr::Prefix(prefix) => self.visit_expr(&prefix.operand),
            Expr::Postfix(postfix) => self.visit_expr(&postfix.operand),
            Expr::Cast(cast) => self.visit_expr(&cast.operand),
            Expr::Grouped(grouped) => {
                if let [single] = grouped.exprs.as_slice() {
                    return self.visit_expr(single);
                }
                for inner in &grouped.exprs {
                    self.visit_expr(inner);
                }
                Name::None
            }
            Expr::Function(function) => {
                if let FunctionArgs::List { args, .. } = &function.args {
                    for arg in args {
                        self.visit_expr(arg);
                    }
                }
                Name::None
            }
            Expr::Case(case) => {
                if let Some(operand) = &case.operand {
                    self.visit_expr(operand);
                }
                for branch in &case.branches {
                    self.visit_expr(&branch.when);
                    self.visit_expr(&branch.then);
                }
                if let Some(else_branch) = &case.else_branch {
                    self.visit_expr(else_branch);
                }
                Name::None
            }
            Expr::Subquery(subquery) => {
                self.visit_select(&subquery.select);
                Name::None
            }
            Expr::Exists(exists) => {
                self.visit_select(&exists.select);
                Name::None
            }
            Expr::Literal(_) | Expr::Invalid(_) => Name::None,
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Select(select) => self.visit_select(select),
            Stmt::Insert(insert) => {
                self.visit_with(&insert.with);
                match &insert.source {
                    InsertSource::Values(rows) => {
                        for row in rows {
                            for (position, expr) in row.exprs.iter().enumerate() {
                                let name = self.visit_expr(expr);
                                // Potential names come from the target
                                // column list, positionally.
                                if let (Name::Needed(index), Some(column)) =
                                    (name, insert.columns.get(position))
                                {
                                    self.propose(index, column.value.clone());
                                }
                            }
                        }
                    }
                    InsertSource::Select(select) => self.visit_select(select),
                    InsertSource::DefaultValues => {}
                }
                if let Some(upsert) = &insert.upsert {
                    if let Some(where_clause) = &upsert.target_where {
                        self.visit_expr(where_clause);
                    }
                    if let UpsertAction::Update { sets, where_clause } = &upsert.action {
                        self.visit_sets(sets);
                        if let Some(where_clause) = where_clause {
                            self.visit_expr(where_clause);
                        }
                    }
                }
                self.visit_returning(&insert.returning);
            }
            Stmt::Update(update) => {
                self.visit_with(&update.with);
                self.visit_sets(&update.sets);
                if let Some(from) = &update.from {
                    self.visit_from(from);
                }
                if let Some(where_clause) = &update.where_clause {
                    self.visit_expr(where_clause);
                }
                self.visit_returning(&update.returning);
            }
            Stmt::Delete(delete) => {
                self.visit_with(&delete.with);
                if let Some(where_clause) = &delete.where_clause {
                    self.visit_expr(where_clause);
                }
                self.visit_returning(&delete.returning);
            }
            Stmt::QueryDefinition(query) => self.visit_stmt(&query.stmt),
            _ => {}
        }
    }

    fn visit_sets(&mut self, sets: &[SetAssignment]) {
        for set in sets {
            let value = self.visit_expr(&set.value);
            match (&set.target, value) {
                (SetTarget::Single(column), Name::Needed(index)) => {
                    self.propose(index, column.value.clone());
                }
                (SetTarget::Tuple(columns), _) => {
                    // Tuple targets name positionally when the value is a
                    // plain parenthesized list.
                    if let Expr::Grouped(grouped) = &set.value {
                        for (position, inner) in grouped.exprs.iter().enumerate() {
                            if let (Name::Needed(index), Some(column)) =
                                (self.visit_expr(inner), columns.get(position))
                            {
                                self.propose(index, column.value.clone());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_select(&mut self, select: &SelectStmt) {
        self.visit_with(&select.with);
        self.visit_body(&select.body);
        for term in &select.order_by {
            self.visit_expr(&term.expr);
        }
        if let Some(limit) = &select.limit {
            self.visit_expr(&limit.limit);
            if let Some(offset) = &limit.offset {
                self.visit_expr(offset);
            }
        }
    }

    fn visit_body(&mut self, body: &SelectBody) {
        match body {
            SelectBody::Core(core) => self.visit_core(core),
            SelectBody::Compound { lhs, rhs, .. } => {
                self.visit_body(lhs);
                self.visit_core(rhs);
            }
        }
    }

    fn visit_core(&mut self, core: &SelectCore) {
        for column in &core.columns {
            if let ResultColumn::Expr { expr, alias } = column {
                let name = self.visit_expr(expr);
                // An alias names a bind in its value position.
                if let (Name::Needed(index), Some(alias)) = (name, alias) {
                    self.propose(index, alias.value.clone());
                }
            }
        }
        if let Some(from) = &core.from {
            self.visit_from(from);
        }
        if let Some(where_clause) = &core.where_clause {
            self.visit_expr(where_clause);
        }
        for expr in &core.group_by {
            self.visit_expr(expr);
        }
        if let Some(having) = &core.having {
            self.visit_expr(having);
        }
    }

    fn visit_from(&mut self, from: &FromClause) {
        self.visit_source(&from.source);
        for join in &from.joins {
            self.visit_source(&join.table);
            if let Some(JoinConstraint::On(expr)) = &join.constraint {
                self.visit_expr(expr);
            }
        }
    }

    fn visit_source(&mut self, source: &TableOrSubquery) {
        match source {
            TableOrSubquery::Subquery { select, .. } => self.visit_select(select),
            TableOrSubquery::TableFunction { args, .. } => {
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            TableOrSubquery::Table { .. } => {}
        }
    }

    fn visit_with(&mut self, with: &Option<WithClause>) {
        if let Some(with) = with {
            for cte in &with.ctes {
                self.visit_select(&cte.select);
            }
        }
    }

    fn visit_returning(&mut self, returning: &Option<ReturningClause>) {
        if let Some(returning) = returning {
            for column in &returning.columns {
                if let ResultColumn::Expr { expr, alias } = column {
                    let name = self.visit_expr(expr);
                    if let (Name::Needed(index), Some(alias)) = (name, alias) {
                        self.propose(index, alias.value.clone());
                    }
                }
            }
        }
    }
}

fn pluralize(name: &str) -> SmolStr {
    SmolStr::new(format!("{name}s"))
}

fn camel_suffix(name: &str, suffix: &str) -> SmolStr {
    SmolStr::new(format!("{name}{suffix}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use squill_lib_core::parser::parse;

    use super::*;

    fn names_of(source: &str) -> Vec<(u32, String)> {
        let result = parse(source);
        let names = infer_parameter_names(&result.statements[0]);
        let mut pairs: Vec<(u32, String)> = names
            .into_iter()
            .map(|(index, name)| (index, name.to_string()))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_equality_names_anonymous_bind() {
        assert_eq!(
            names_of("SELECT * FROM t WHERE id = ?;"),
            vec![(1, "id".to_string())]
        );
        assert_eq!(
            names_of("SELECT * FROM t WHERE ? = id;"),
            vec![(1, "id".to_string())]
        );
    }

    #[test]
    fn test_explicit_names_are_kept() {
        assert_eq!(
            names_of("SELECT * FROM t WHERE id = :user_id;"),
            vec![(1, "user_id".to_string())]
        );
    }

    #[test]
    fn test_between_names_lower_and_upper() {
        assert_eq!(
            names_of("SELECT * FROM t WHERE created BETWEEN ? AND ?;"),
            vec![(1, "createdLower".to_string()), (2, "createdUpper".to_string())]
        );
    }

    #[test]
    fn test_in_pluralizes() {
        assert_eq!(
            names_of("SELECT * FROM t WHERE id IN (?);"),
            vec![(1, "ids".to_string())]
        );
    }

    #[test]
    fn test_insert_values_take_column_names() {
        assert_eq!(
            names_of("INSERT INTO t (id, name) VALUES (?, ?);"),
            vec![(1, "id".to_string()), (2, "name".to_string())]
        );
    }

    #[test]
    fn test_update_set_names() {
        assert_eq!(
            names_of("UPDATE t SET name = ? WHERE id = ?;"),
            vec![(1, "name".to_string()), (2, "id".to_string())]
        );
    }

    #[test]
    fn test_alias_names_bind() {
        assert_eq!(
            names_of("SELECT ? AS score FROM t;"),
            vec![(1, "score".to_string())]
        );
    }

    #[test]
    fn test_predicates_are_inert() {
        assert!(!Name::Some("x".into()).is_some());
        assert!(!Name::Needed(1).is_needed());
    }
}
