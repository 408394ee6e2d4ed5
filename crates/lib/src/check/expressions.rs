use squill_lib_core::ast::expr::{
    CaseExpr, ColumnExpr, ColumnTarget, Expr, FunctionArgs, FunctionExpr, Literal,
};

use crate::check::{Checker, Env};
use crate::environment::Resolution;
use crate::types::{Kind, Row, Type};

impl Checker<'_> {
    /// Type-check an expression, driving unification. The result is recorded
    /// on the node id so later passes can query it.
    pub(crate) fn check_expr(&mut self, env: &mut Env, expr: &Expr) -> Type {
        match expr {
            Expr::Literal(literal) => match &literal.value {
                Literal::Int(_) => self.state.fresh_var_for(literal.id, Kind::Integer),
                Literal::Double(_) => self.state.fresh_var_for(literal.id, Kind::Float),
                Literal::String(_) => self.state.nominal_of("TEXT", literal.id),
                Literal::Blob(_) => self.state.nominal_of("BLOB", literal.id),
                Literal::Null => {
                    let inner = self.state.fresh_var(Kind::General);
                    let ty = Type::optional(inner);
                    self.state.record(literal.id, ty.clone());
                    ty
                }
                Literal::True | Literal::False => self.state.nominal_of("INTEGER", literal.id),
                Literal::CurrentTime | Literal::CurrentDate | Literal::CurrentTimestamp => {
                    self.state.nominal_of("TEXT", literal.id)
                }
            },
            Expr::BindParameter(bind) => {
                self.state
                    .fresh_var_for_param(bind.index, bind.id, bind.location)
            }
            Expr::Column(column) => self.check_column(env, column),
            Expr::Prefix(prefix) => {
                let operand = self.check_expr(env, &prefix.operand);
                let scheme = self.catalog.prefix(prefix.op);
                let scheme = self.state.instantiate(&scheme.clone(), None);
                let result = self.state.fresh_var(Kind::General);
                let call = Type::function(vec![operand], result.clone());
                self.state.unify(&scheme, &call, prefix.location);
                let ty = self.state.solution(&result);
                self.state.record(prefix.id, ty.clone());
                ty
            }
            Expr::Infix(infix) => {
                let lhs = self.check_expr(env, &infix.lhs);
                let rhs = self.check_expr(env, &infix.rhs);
                let scheme = self.catalog.infix(infix.op);
                let scheme = self.state.instantiate(&scheme.clone(), None);
                let result = self.state.fresh_var(Kind::General);
                let call = Type::function(vec![lhs, rhs], result.clone());
                self.state.unify(&scheme, &call, infix.location);
                let ty = self.state.solution(&result);
                self.state.record(infix.id, ty.clone());
                ty
            }
            Expr::Postfix(postfix) => {
                let operand = self.check_expr(env, &postfix.operand);
                let scheme = self.catalog.postfix(&postfix.op);
                let scheme = self.state.instantiate(&scheme.clone(), None);
                let result = self.state.fresh_var(Kind::General);
                let call = Type::function(vec![operand], result.clone());
                self.state.unify(&scheme, &call, postfix.location);
                let ty = self.state.solution(&result);
                self.state.record(postfix.id, ty.clone());
                ty
            }
            Expr::Between(between) => {
                let operand = self.check_expr(env, &between.operand);
                let lower = self.check_expr(env, &between.lower);
                let upper = self.check_expr(env, &between.upper);
                let scheme = self.state.instantiate(&self.catalog.between().clone(), None);
                let result = self.state.fresh_var(Kind::General);
                let call = Type::function(vec![operand, lower, upper], result.clone());
                self.state.unify(&scheme, &call, between.location);
                let ty = self.state.solution(&result);
                self.state.record(between.id, ty.clone());
                ty
            }
            Expr::Function(function) => self.check_function(env, function),
            Expr::Cast(cast) => {
                // The operand is checked for its side effects only.
                self.check_expr(env, &cast.operand);
                let ty = self.declared_cast_type(&cast.type_name);
                self.state.record(cast.id, ty.clone());
                ty
            }
            Expr::Case(case) => self.check_case(env, case),
            Expr::Grouped(grouped) => {
                let types: Vec<Type> = grouped
                    .exprs
                    .iter()
                    .map(|inner| self.check_expr(env, inner))
                    .collect();
                let ty = Type::Row(Row::Fixed(types));
                self.state.record(grouped.id, ty.clone());
                ty
            }
            Expr::Subquery(subquery) => {
                env.push_scope();
                let chunks = self.check_select(env, &subquery.select);
                env.pop_scope();
                let types: Vec<Type> = crate::check::flatten(&chunks)
                    .into_iter()
                    .map(|column| column.ty.clone())
                    .collect();
                let ty = Type::Row(Row::Fixed(types));
                self.state.record(subquery.id, ty.clone());
                ty
            }
            Expr::Exists(exists) => {
                env.push_scope();
                self.check_select(env, &exists.select);
                env.pop_scope();
                self.state.nominal_of("INTEGER", exists.id)
            }
            Expr::Invalid(invalid) => {
                // The parser already reported this span.
                self.state.error_type_for(invalid.id)
            }
        }
    }

    fn check_column(&mut self, env: &mut Env, column: &ColumnExpr) -> Type {
        let schema = column.schema.as_ref().map(|s| s.value.as_str());
        let table = column.table.as_ref().map(|t| t.value.as_str());

        match &column.target {
            ColumnTarget::Star => {
                let types: Vec<Type> = match table {
                    Some(table) => match env.table_columns(table) {
                        Resolution::Success(columns) => {
                            columns.into_iter().map(|(_, ty)| ty).collect()
                        }
                        _ => {
                            self.error(format!("no such table: {table}"), column.location);
                            return self.state.error_type_for(column.id);
                        }
                    },
                    None => env
                        .visible_tables()
                        .into_iter()
                        .flat_map(|(_, columns)| columns)
                        .map(|(_, ty)| ty)
                        .collect(),
                };
                let ty = Type::Row(Row::Fixed(types));
                self.state.record(column.id, ty.clone());
                ty
            }
            ColumnTarget::Named(name) => {
                match env.lookup_column(schema, table, &name.value) {
                    Resolution::Success(resolved) => {
                        self.state.record(column.id, resolved.ty.clone());
                        resolved.ty
                    }
                    Resolution::Ambiguous(resolved) => {
                        self.error(
                            format!("ambiguous column name: {}", name.value),
                            column.location,
                        );
                        self.state.record(column.id, resolved.ty.clone());
                        resolved.ty
                    }
                    Resolution::ColumnDoesNotExist(name) => {
                        self.error(format!("no such column: {name}"), column.location);
                        self.state.error_type_for(column.id)
                    }
                    Resolution::TableDoesNotExist(name) => {
                        self.error(format!("no such table: {name}"), column.location);
                        self.state.error_type_for(column.id)
                    }
                    Resolution::SchemaDoesNotExist(name) => {
                        self.error(format!("no such schema: {name}"), column.location);
                        self.state.error_type_for(column.id)
                    }
                }
            }
        }
    }

    fn check_function(&mut self, env: &mut Env, function: &FunctionExpr) -> Type {
        let Some(builtin) = self.catalog.function(&function.name.value) else {
            self.error(
                format!("no such function: {}", function.name.value),
                function.location,
            );
            if let FunctionArgs::List { args, .. } = &function.args {
                for arg in args {
                    self.check_expr(env, arg);
                }
            }
            return self.state.error_type_for(function.id);
        };
        let scheme = builtin.scheme.clone();
        let accepts_star = builtin.accepts_star;
        let check = builtin.check;

        let ty = match &function.args {
            FunctionArgs::Star => {
                if !accepts_star {
                    self.error(
                        format!("{}(*) is not a valid call", function.name.value),
                        function.location,
                    );
                    return self.state.error_type_for(function.id);
                }
                self.state.nominal_of("INTEGER", function.id)
            }
            FunctionArgs::List { args, .. } => {
                let arg_types: Vec<Type> = args
                    .iter()
                    .map(|arg| self.check_expr(env, arg))
                    .collect();
                let instantiated = self.state.instantiate(&scheme, Some(arg_types.len()));
                let result = self.state.fresh_var(Kind::General);
                let call = Type::function(arg_types, result.clone());
                self.state.unify(&instantiated, &call, function.location);
                let ty = self.state.solution(&result);
                self.state.record(function.id, ty.clone());
                ty
            }
        };

        if let Some(check) = check {
            check(function, &mut self.state.diagnostics);
        }
        ty
    }

    fn check_case(&mut self, env: &mut Env, case: &CaseExpr) -> Type {
        let result = self.state.fresh_var(Kind::General);

        let when_target = match &case.operand {
            Some(operand) => self.check_expr(env, operand),
            None => Type::integer(),
        };
        for branch in &case.branches {
            let when = self.check_expr(env, &branch.when);
            self.state.unify(&when, &when_target, branch.when.location());
            let then = self.check_expr(env, &branch.then);
            self.state.unify(&then, &result, branch.then.location());
        }
        if let Some(else_branch) = &case.else_branch {
            let else_ty = self.check_expr(env, else_branch);
            self.state.unify(&else_ty, &result, else_branch.location());
        }

        let ty = self.state.solution(&result);
        self.state.record(case.id, ty.clone());
        ty
    }
}
