use ahash::AHashSet;
use itertools::Itertools;
use smol_str::SmolStr;
use squill_lib_core::ast::expr::Expr;
use squill_lib_core::ast::stmt::{
    AlterAction, AlterTableStmt, ColumnConstraintKind, ColumnDef, CreateIndexStmt,
    CreateTableBody, CreateTableStmt, CreateTriggerStmt, CreateViewStmt, CreateVirtualTableStmt,
    DeleteStmt, DropKind, DropStmt, ForeignKeyClause, FromClause, InsertSource, InsertStmt,
    JoinConstraint, ModuleArgument, PragmaStmt, PragmaValue, ResultColumn, ReturningClause,
    SelectBody, SelectCore, SelectStmt, SetAssignment, SetTarget, Stmt, TableConstraintKind,
    TableOrSubquery, TriggerEvent, UpdateStmt, UpsertAction, WithClause,
};
use squill_lib_core::ast::{self, TypeName};
use squill_lib_core::errors::Suggestion;
use squill_lib_core::helpers::Config;
use squill_lib_core::tokens::Location;

use crate::check::{flatten, Checker, Env, OutputChunk, OutputColumn};
use crate::environment::{ImportOptions, Resolution};
use crate::schema::{
    Column as SchemaColumn, Index, QualifiedName as SchemaQualifiedName, SchemaName, Table,
    TableKind, Trigger,
};
use crate::types::{Kind, Row, Type};

impl Checker<'_> {
    /// Check a statement inside an existing environment; trigger bodies pass
    /// an environment with `new`/`old` already imported.
    pub(crate) fn check_statement_in(&mut self, env: &mut Env, stmt: &Stmt) -> Vec<OutputChunk> {
        match stmt {
            Stmt::Select(select) => self.check_select(env, select),
            Stmt::Insert(insert) => self.check_insert(env, insert),
            Stmt::Update(update) => self.check_update(env, update),
            Stmt::Delete(delete) => self.check_delete(env, delete),
            Stmt::CreateTable(create) => {
                self.check_create_table(env, create);
                Vec::new()
            }
            Stmt::AlterTable(alter) => {
                self.check_alter_table(env, alter);
                Vec::new()
            }
            Stmt::DropTable(drop) | Stmt::DropIndex(drop) | Stmt::DropView(drop)
            | Stmt::DropTrigger(drop) => {
                self.check_drop(drop);
                Vec::new()
            }
            Stmt::CreateIndex(index) => {
                self.check_create_index(env, index);
                Vec::new()
            }
            Stmt::CreateView(view) => {
                self.check_create_view(env, view);
                Vec::new()
            }
            Stmt::CreateTrigger(trigger) => {
                self.check_create_trigger(env, trigger);
                Vec::new()
            }
            Stmt::CreateVirtualTable(virtual_table) => {
                self.check_create_virtual_table(virtual_table);
                Vec::new()
            }
            Stmt::Pragma(pragma) => {
                self.check_pragma(pragma);
                Vec::new()
            }
            Stmt::QueryDefinition(query) => {
                for option in &query.options {
                    let key = option.key.value.to_ascii_lowercase();
                    if key != "input" && key != "output" {
                        self.warning(
                            format!("unknown option: {}", option.key.value),
                            option.location,
                        );
                    }
                }
                self.check_statement_in(env, &query.stmt)
            }
            Stmt::Reindex(_) | Stmt::Empty(_) => Vec::new(),
        }
    }

    // -- SELECT -------------------------------------------------------------

    pub(crate) fn check_select(&mut self, env: &mut Env, select: &SelectStmt) -> Vec<OutputChunk> {
        env.push_scope();
        self.check_with(env, &select.with);

        // LIMIT first, in its own scope.
        if let Some(limit) = &select.limit {
            env.push_scope();
            let ty = self.check_expr(env, &limit.limit);
            self.expect_integer("LIMIT", &ty, limit.limit.location());
            if let Some(offset) = &limit.offset {
                let ty = self.check_expr(env, offset);
                self.expect_integer("OFFSET", &ty, offset.location());
            }
            env.pop_scope();
        }

        let arms = flatten_body(&select.body);
        let chunks = if let [core] = arms.as_slice() {
            env.push_scope();
            let chunks = self.check_select_core(env, core);
            for term in &select.order_by {
                self.check_expr(env, &term.expr);
            }
            env.pop_scope();
            chunks
        } else {
            // Each compound arm checks in a fresh scope; column types unify
            // pairwise across arms, names come from the first arm.
            let mut first: Option<(Vec<OutputChunk>, Vec<Type>)> = None;
            for arm in &arms {
                env.push_scope();
                let arm_chunks = self.check_select_core(env, arm);
                env.pop_scope();
                let types: Vec<Type> = flatten(&arm_chunks)
                    .into_iter()
                    .map(|column| column.ty.clone())
                    .collect();
                match &first {
                    None => first = Some((arm_chunks, types)),
                    Some((_, first_types)) => {
                        if first_types.len() != types.len() {
                            self.error(
                                "SELECTs to the left and right of a compound operator have \
                                 different numbers of result columns",
                                arm.location,
                            );
                        } else {
                            let pairs: Vec<(Type, Type)> = first_types
                                .iter()
                                .cloned()
                                .zip(types.iter().cloned())
                                .collect();
                            for (a, b) in pairs {
                                self.state.unify(&a, &b, arm.location);
                            }
                        }
                    }
                }
            }
            let (chunks, _) = first.expect("at least one arm");

            env.push_scope();
            for column in flatten(&chunks) {
                env.declare_result_alias(&column.name, column.ty.clone());
            }
            for term in &select.order_by {
                self.check_expr(env, &term.expr);
            }
            env.pop_scope();
            chunks
        };

        env.pop_scope();
        chunks
    }

    fn check_with(&mut self, env: &mut Env, with: &Option<WithClause>) {
        let Some(with) = with else {
            return;
        };
        for cte in &with.ctes {
            // A recursive CTE with a declared column list is pre-published
            // with fresh variables so self-references type-check.
            let pre_published = if with.recursive && !cte.columns.is_empty() {
                let mut table = Table::new(
                    SchemaQualifiedName::main(cte.name.value.clone()),
                    TableKind::Cte,
                );
                for column in &cte.columns {
                    let ty = self.state.fresh_var(Kind::General);
                    table.columns.insert(SchemaColumn::new(column.value.clone(), ty));
                }
                env.declare_cte(table.clone());
                Some(table)
            } else {
                None
            };

            let chunks = self.check_select(env, &cte.select);
            let output: Vec<OutputColumn> = flatten(&chunks).into_iter().cloned().collect();

            let mut table = Table::new(
                SchemaQualifiedName::main(cte.name.value.clone()),
                TableKind::Cte,
            );
            if cte.columns.is_empty() {
                for column in &output {
                    table
                        .columns
                        .insert(SchemaColumn::new(column.name.clone(), column.ty.clone()));
                }
            } else {
                if cte.columns.len() != output.len() {
                    self.error(
                        format!(
                            "CTE {} declares {} columns but its SELECT produces {}",
                            cte.name.value,
                            cte.columns.len(),
                            output.len()
                        ),
                        cte.location,
                    );
                }
                for (declared, column) in cte.columns.iter().zip(&output) {
                    table
                        .columns
                        .insert(SchemaColumn::new(declared.value.clone(), column.ty.clone()));
                }
            }

            if let Some(pre_published) = pre_published {
                let pairs: Vec<(Type, Type)> = pre_published
                    .columns
                    .iter()
                    .zip(table.columns.iter())
                    .map(|(a, b)| (a.ty.clone(), b.ty.clone()))
                    .collect();
                for (a, b) in pairs {
                    self.state.unify(&a, &b, cte.location);
                }
            }

            env.declare_cte(table);
        }
    }

    /// The caller pushes (and pops) the arm's scope.
    fn check_select_core(&mut self, env: &mut Env, core: &SelectCore) -> Vec<OutputChunk> {
        if let Some(from) = &core.from {
            self.import_from(env, from);
        }

        let chunks = self.check_result_columns(env, &core.columns);

        if let Some(where_clause) = &core.where_clause {
            let ty = self.check_expr(env, where_clause);
            self.expect_integer("WHERE", &ty, where_clause.location());
        }
        for expr in &core.group_by {
            self.check_expr(env, expr);
        }
        if let Some(having) = &core.having {
            let ty = self.check_expr(env, having);
            self.expect_integer("HAVING", &ty, having.location());
        }

        chunks
    }

    /// Accumulate result columns into chunks; wildcards close the current
    /// chunk. Aliases become visible in the surrounding scope as they are
    /// declared. Anonymous columns get `columnK` names by 1-based position.
    fn check_result_columns(
        &mut self,
        env: &mut Env,
        columns: &[ResultColumn],
    ) -> Vec<OutputChunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<OutputColumn> = Vec::new();
        let mut position = 0usize;

        let mut flush = |current: &mut Vec<OutputColumn>, chunks: &mut Vec<OutputChunk>| {
            if !current.is_empty() {
                chunks.push(OutputChunk::Columns(std::mem::take(current)));
            }
        };

        for column in columns {
            match column {
                ResultColumn::Expr { expr, alias } => {
                    position += 1;
                    let ty = self.check_expr(env, expr);
                    let name = match (alias, expr.column_name()) {
                        (Some(alias), _) => alias.value.clone(),
                        (None, Some(column_name)) => column_name.value.clone(),
                        (None, None) => SmolStr::new(format!("column{position}")),
                    };
                    let table = self.column_source(env, expr);
                    if let Some(alias) = alias {
                        env.declare_result_alias(&alias.value, ty.clone());
                    }
                    current.push(OutputColumn { name, ty, table });
                }
                ResultColumn::Star(location) => {
                    flush(&mut current, &mut chunks);
                    let tables = env.visible_tables();
                    if tables.is_empty() {
                        self.error("no tables specified", *location);
                    }
                    for (name, table_columns) in tables {
                        position += table_columns.len();
                        chunks.push(OutputChunk::Table {
                            columns: table_columns
                                .into_iter()
                                .map(|(column_name, ty)| OutputColumn {
                                    name: column_name,
                                    ty,
                                    table: Some(name.clone()),
                                })
                                .collect(),
                            name,
                        });
                    }
                }
                ResultColumn::TableStar(table, location) => {
                    flush(&mut current, &mut chunks);
                    match env.table_columns(&table.value) {
                        Resolution::Success(table_columns) => {
                            position += table_columns.len();
                            chunks.push(OutputChunk::Table {
                                name: table.value.clone(),
                                columns: table_columns
                                    .into_iter()
                                    .map(|(column_name, ty)| OutputColumn {
                                        name: column_name,
                                        ty,
                                        table: Some(table.value.clone()),
                                    })
                                    .collect(),
                            });
                        }
                        _ => {
                            self.error(format!("no such table: {}", table.value), *location);
                        }
                    }
                }
            }
        }

        flush(&mut current, &mut chunks);
        chunks
    }

    fn column_source(&self, env: &Env, expr: &Expr) -> Option<SmolStr> {
        let Expr::Column(column) = expr else {
            return None;
        };
        let squill_lib_core::ast::expr::ColumnTarget::Named(name) = &column.target else {
            return None;
        };
        let schema = column.schema.as_ref().map(|s| s.value.as_str());
        let table = column.table.as_ref().map(|t| t.value.as_str());
        match env.lookup_column(schema, table, &name.value) {
            Resolution::Success(resolved) | Resolution::Ambiguous(resolved) => resolved.table,
            _ => None,
        }
    }

    // -- FROM ---------------------------------------------------------------

    fn import_from(&mut self, env: &mut Env, from: &FromClause) {
        if let Some(table) = self.resolve_source(env, &from.source) {
            env.import(
                &table,
                ImportOptions::default().config(|o| o.alias = source_alias(&from.source)),
            );
        }

        for join in &from.joins {
            let resolved = self.resolve_source(env, &join.table);
            let mut options = ImportOptions::default().config(|o| {
                o.alias = source_alias(&join.table);
                o.is_optional = join.op.is_optional();
            });

            match &join.constraint {
                Some(JoinConstraint::Using(columns)) => {
                    let Some(table) = &resolved else {
                        continue;
                    };
                    // The join columns merge; the right-hand copies are
                    // hidden, and their types unify with the left side.
                    let mut only = AHashSet::new();
                    for column in table.columns.iter() {
                        if !columns
                            .iter()
                            .any(|using| using.value.eq_ignore_ascii_case(&column.name))
                        {
                            only.insert(SmolStr::new(column.name.to_ascii_lowercase()));
                        }
                    }
                    for using in columns {
                        let right = table.columns.get(&using.value).map(|c| c.ty.clone());
                        match (env.lookup_column(None, None, &using.value), right) {
                            (
                                Resolution::Success(left) | Resolution::Ambiguous(left),
                                Some(right),
                            ) => {
                                self.state.unify(&left.ty, &right, using.location);
                            }
                            _ => {
                                self.error(
                                    format!("no such column: {}", using.value),
                                    using.location,
                                );
                            }
                        }
                    }
                    options.only_columns_in = Some(only);
                    env.import(table, options);
                }
                constraint => {
                    if let Some(table) = &resolved {
                        env.import(table, options);
                    }
                    if let Some(JoinConstraint::On(expr)) = constraint {
                        let ty = self.check_expr(env, expr);
                        self.expect_integer("JOIN constraint", &ty, expr.location());
                    }
                }
            }
        }
    }

    /// Resolve a FROM source to a table shape without importing it.
    fn resolve_source(&mut self, env: &mut Env, source: &TableOrSubquery) -> Option<Table> {
        match source {
            TableOrSubquery::Table { name, .. } => self.resolve_table_name(env, name),
            TableOrSubquery::TableFunction { args, location, .. } => {
                // Parsed, but semantics are not implemented.
                self.error("table-valued functions are not supported", *location);
                for arg in args {
                    self.check_expr(env, arg);
                }
                None
            }
            TableOrSubquery::Subquery { select, alias, .. } => {
                let chunks = self.check_select(env, select);
                let name = alias
                    .as_ref()
                    .map(|a| a.value.clone())
                    .unwrap_or_else(|| SmolStr::new(""));
                let mut table = Table::new(SchemaQualifiedName::main(name), TableKind::Subquery);
                for column in flatten(&chunks) {
                    table
                        .columns
                        .insert(SchemaColumn::new(column.name.clone(), column.ty.clone()));
                }
                Some(table)
            }
        }
    }

    /// CTEs shadow schema tables; unqualified schema lookups search `temp`
    /// then `main`.
    fn resolve_table_name(&mut self, env: &Env, name: &ast::QualifiedName) -> Option<Table> {
        if let Some(schema_ident) = &name.schema {
            let schema_name = SchemaName::parse(&schema_ident.value);
            if !schema_name.is_known() {
                self.error(
                    format!("no such schema: {}", schema_ident.value),
                    schema_ident.location,
                );
                return None;
            }
            return match self.schema.table(Some(&schema_name), &name.name.value) {
                Some(table) => Some(table.clone()),
                None => {
                    self.error(
                        format!("no such table: {}", name.name.value),
                        name.name.location,
                    );
                    None
                }
            };
        }

        if let Some(cte) = env.lookup_cte(&name.name.value) {
            return Some(cte.clone());
        }
        match self.schema.table(None, &name.name.value) {
            Some(table) => Some(table.clone()),
            None => {
                self.error(
                    format!("no such table: {}", name.name.value),
                    name.name.location,
                );
                None
            }
        }
    }

    // -- INSERT / UPDATE / DELETE -------------------------------------------

    fn check_insert(&mut self, env: &mut Env, insert: &InsertStmt) -> Vec<OutputChunk> {
        env.push_scope();
        self.check_with(env, &insert.with);

        let Some(table) = self.resolve_table_name(env, &insert.table) else {
            // Keep checking the source so bind parameters keep their slots.
            match &insert.source {
                InsertSource::Values(rows) => {
                    for row in rows {
                        for expr in &row.exprs {
                            self.check_expr(env, expr);
                        }
                    }
                }
                InsertSource::Select(select) => {
                    self.check_select(env, select);
                }
                InsertSource::DefaultValues => {}
            }
            env.pop_scope();
            return Vec::new();
        };

        env.import(
            &table,
            ImportOptions::default()
                .config(|o| o.alias = insert.alias.as_ref().map(|a| a.value.clone())),
        );

        // Target row: the listed columns, or every storable column.
        let mut target_types = Vec::new();
        let mut provided: AHashSet<SmolStr> = AHashSet::new();
        if insert.columns.is_empty() {
            for column in table.columns.iter().filter(|c| !c.is_generated) {
                target_types.push(column.ty.clone());
                provided.insert(SmolStr::new(column.name.to_ascii_lowercase()));
            }
        } else {
            for ident in &insert.columns {
                match table.columns.get(&ident.value) {
                    Some(column) if column.is_generated => {
                        self.error(
                            format!("cannot INSERT into generated column: {}", column.name),
                            ident.location,
                        );
                        target_types.push(Type::Error);
                    }
                    Some(column) => target_types.push(column.ty.clone()),
                    None => {
                        self.error(format!("no such column: {}", ident.value), ident.location);
                        target_types.push(Type::Error);
                    }
                }
                provided.insert(SmolStr::new(ident.value.to_ascii_lowercase()));
            }
        }

        if matches!(insert.source, InsertSource::DefaultValues) {
            provided.clear();
        }
        let missing: Vec<&SmolStr> = table
            .columns
            .iter()
            .filter(|column| {
                !provided.contains(&SmolStr::new(column.name.to_ascii_lowercase()))
                    && !column.is_generated
                    && !column.has_default
                    && !column.ty.is_optional()
            })
            .map(|column| &column.name)
            .collect();
        if !missing.is_empty() {
            self.error(
                format!("missing required columns: {}", missing.iter().join(", ")),
                insert.location,
            );
        }

        let target_row = Type::Row(Row::Fixed(target_types.clone()));
        match &insert.source {
            InsertSource::DefaultValues => {}
            InsertSource::Values(rows) => {
                for row in rows {
                    let types: Vec<Type> = row
                        .exprs
                        .iter()
                        .map(|expr| self.check_expr(env, expr))
                        .collect();
                    if types.len() != target_types.len() {
                        self.error(
                            format!(
                                "{} values for {} columns",
                                types.len(),
                                target_types.len()
                            ),
                            row.location,
                        );
                    } else {
                        self.state
                            .unify(&Type::Row(Row::Fixed(types)), &target_row, row.location);
                    }
                }
            }
            InsertSource::Select(select) => {
                let chunks = self.check_select(env, select);
                let types: Vec<Type> = flatten(&chunks)
                    .into_iter()
                    .map(|column| column.ty.clone())
                    .collect();
                if types.len() != target_types.len() {
                    self.error(
                        format!("{} values for {} columns", types.len(), target_types.len()),
                        select.location,
                    );
                } else {
                    self.state.unify(
                        &Type::Row(Row::Fixed(types)),
                        &target_row,
                        select.location,
                    );
                }
            }
        }

        if let Some(upsert) = &insert.upsert {
            // The proposed row is reachable as `excluded.column` only.
            env.import(
                &table,
                ImportOptions::default().config(|o| {
                    o.alias = Some(SmolStr::new_static("excluded"));
                    o.qualified_access_only = true;
                }),
            );
            for target in &upsert.targets {
                if table.columns.get(&target.column.value).is_none() {
                    self.error(
                        format!("no such column: {}", target.column.value),
                        target.column.location,
                    );
                }
            }
            if let Some(where_clause) = &upsert.target_where {
                let ty = self.check_expr(env, where_clause);
                self.expect_integer("WHERE", &ty, where_clause.location());
            }
            if let UpsertAction::Update { sets, where_clause } = &upsert.action {
                self.check_set_assignments(env, &table, sets);
                if let Some(where_clause) = where_clause {
                    let ty = self.check_expr(env, where_clause);
                    self.expect_integer("WHERE", &ty, where_clause.location());
                }
            }
        }

        let chunks = self.check_returning(env, &insert.returning);
        env.pop_scope();
        chunks
    }

    fn check_update(&mut self, env: &mut Env, update: &UpdateStmt) -> Vec<OutputChunk> {
        env.push_scope();
        self.check_with(env, &update.with);

        let Some(table) = self.resolve_table_name(env, &update.table) else {
            for set in &update.sets {
                self.check_expr(env, &set.value);
            }
            if let Some(where_clause) = &update.where_clause {
                self.check_expr(env, where_clause);
            }
            env.pop_scope();
            return Vec::new();
        };

        env.import(
            &table,
            ImportOptions::default()
                .config(|o| o.alias = update.alias.as_ref().map(|a| a.value.clone())),
        );
        if let Some(from) = &update.from {
            self.import_from(env, from);
        }

        self.check_set_assignments(env, &table, &update.sets);

        if let Some(where_clause) = &update.where_clause {
            let ty = self.check_expr(env, where_clause);
            self.expect_integer("WHERE", &ty, where_clause.location());
        }

        let chunks = self.check_returning(env, &update.returning);
        env.pop_scope();
        chunks
    }

    fn check_delete(&mut self, env: &mut Env, delete: &DeleteStmt) -> Vec<OutputChunk> {
        env.push_scope();
        self.check_with(env, &delete.with);

        let Some(table) = self.resolve_table_name(env, &delete.table) else {
            if let Some(where_clause) = &delete.where_clause {
                self.check_expr(env, where_clause);
            }
            env.pop_scope();
            return Vec::new();
        };

        env.import(
            &table,
            ImportOptions::default()
                .config(|o| o.alias = delete.alias.as_ref().map(|a| a.value.clone())),
        );

        if let Some(where_clause) = &delete.where_clause {
            let ty = self.check_expr(env, where_clause);
            self.expect_integer("WHERE", &ty, where_clause.location());
        }

        let chunks = self.check_returning(env, &delete.returning);
        env.pop_scope();
        chunks
    }

    fn check_set_assignments(&mut self, env: &mut Env, table: &Table, sets: &[SetAssignment]) {
        for set in sets {
            match &set.target {
                SetTarget::Single(ident) => {
                    let column_ty = match table.columns.get(&ident.value) {
                        Some(column) => column.ty.clone(),
                        None => {
                            self.error(format!("no such column: {}", ident.value), ident.location);
                            Type::Error
                        }
                    };
                    let value_ty = self.check_expr(env, &set.value);
                    self.state.unify(&column_ty, &value_ty, set.location);
                }
                SetTarget::Tuple(idents) => {
                    let column_types: Vec<Type> = idents
                        .iter()
                        .map(|ident| match table.columns.get(&ident.value) {
                            Some(column) => column.ty.clone(),
                            None => {
                                self.error(
                                    format!("no such column: {}", ident.value),
                                    ident.location,
                                );
                                Type::Error
                            }
                        })
                        .collect();
                    let value_ty = self.check_expr(env, &set.value);
                    self.state.unify(
                        &Type::Row(Row::Fixed(column_types)),
                        &value_ty,
                        set.location,
                    );
                }
            }
        }
    }

    fn check_returning(
        &mut self,
        env: &mut Env,
        returning: &Option<ReturningClause>,
    ) -> Vec<OutputChunk> {
        match returning {
            Some(returning) => self.check_result_columns(env, &returning.columns),
            None => Vec::new(),
        }
    }

    // -- DDL ----------------------------------------------------------------

    fn check_create_table(&mut self, env: &mut Env, create: &CreateTableStmt) {
        let schema_name = self.target_schema(create.temporary, &create.name);
        let qname = SchemaQualifiedName::new(schema_name, create.name.name.value.clone());

        match &create.body {
            CreateTableBody::ColumnsAndConstraints {
                columns,
                constraints,
                options,
            } => {
                if self.pragmas.require_strict_tables && !options.strict {
                    self.state.diagnostics.push(
                        squill_lib_core::errors::Diagnostic::error(
                            "Missing STRICT table option",
                            create.location,
                        )
                        .with_suggestion(Suggestion::Append(" STRICT".to_string())),
                    );
                }

                let mut table = Table::new(qname, TableKind::Normal);
                let mut pk_declarations: Vec<Location> = Vec::new();
                let mut pk_columns: Vec<SmolStr> = Vec::new();

                for column in columns {
                    let base = self.declared_column_type(column.type_name.as_ref());
                    let not_null = column.is_not_null() || column.is_primary_key();
                    let ty = if not_null { base } else { Type::optional(base) };

                    let mut schema_column = SchemaColumn::new(column.name.value.clone(), ty);
                    schema_column.has_default = column.default_expr().is_some();
                    schema_column.is_generated = column.is_generated();

                    if let Some(constraint) = column
                        .constraints
                        .iter()
                        .find(|c| matches!(c.kind, ColumnConstraintKind::PrimaryKey { .. }))
                    {
                        pk_declarations.push(constraint.location);
                        pk_columns.push(column.name.value.clone());
                        // A sole INTEGER PRIMARY KEY is the rowid; it
                        // auto-assigns, so inserts may omit it.
                        if schema_column.ty.nominal_name() == Some("INTEGER") {
                            schema_column.has_default = true;
                        }
                    }

                    if !table.columns.insert(schema_column) {
                        self.error(
                            format!("duplicate column name: {}", column.name.value),
                            column.name.location,
                        );
                    }
                }

                for constraint in constraints {
                    match &constraint.kind {
                        TableConstraintKind::PrimaryKey(indexed) => {
                            pk_declarations.push(constraint.location);
                            for indexed_column in indexed {
                                if table.columns.get(&indexed_column.column.value).is_none() {
                                    self.error(
                                        format!(
                                            "no such column: {}",
                                            indexed_column.column.value
                                        ),
                                        indexed_column.column.location,
                                    );
                                } else {
                                    pk_columns.push(indexed_column.column.value.clone());
                                }
                            }
                        }
                        TableConstraintKind::Unique(indexed) => {
                            for indexed_column in indexed {
                                if table.columns.get(&indexed_column.column.value).is_none() {
                                    self.error(
                                        format!(
                                            "no such column: {}",
                                            indexed_column.column.value
                                        ),
                                        indexed_column.column.location,
                                    );
                                }
                            }
                        }
                        TableConstraintKind::ForeignKey { columns, .. } => {
                            for ident in columns {
                                if table.columns.get(&ident.value).is_none() {
                                    self.error(
                                        format!("no such column: {}", ident.value),
                                        ident.location,
                                    );
                                }
                            }
                        }
                        TableConstraintKind::Check(_) => {}
                    }
                }

                if pk_declarations.len() > 1 {
                    self.error(
                        format!("table {} already has a primary key", create.name.name.value),
                        pk_declarations[1],
                    );
                }
                table.primary_key = pk_columns;

                // Column expressions check in a sub-environment seeded with
                // the sibling columns.
                env.push_scope();
                env.import(&table, ImportOptions::default());
                for column in columns {
                    let declared = table
                        .columns
                        .get(&column.name.value)
                        .map(|c| c.ty.clone())
                        .unwrap_or(Type::Error);
                    for constraint in &column.constraints {
                        match &constraint.kind {
                            ColumnConstraintKind::Default(expr) => {
                                let ty = self.check_expr(env, expr);
                                self.state.unify(&ty, &declared, expr.location());
                            }
                            ColumnConstraintKind::Check(expr) => {
                                let ty = self.check_expr(env, expr);
                                self.expect_integer("CHECK", &ty, expr.location());
                            }
                            ColumnConstraintKind::Generated { expr, .. } => {
                                let ty = self.check_expr(env, expr);
                                self.state.unify(&ty, &declared, expr.location());
                            }
                            ColumnConstraintKind::ForeignKey(clause) => {
                                self.check_foreign_key_clause(clause);
                            }
                            _ => {}
                        }
                    }
                }
                for constraint in constraints {
                    match &constraint.kind {
                        TableConstraintKind::Check(expr) => {
                            let ty = self.check_expr(env, expr);
                            self.expect_integer("CHECK", &ty, expr.location());
                        }
                        TableConstraintKind::ForeignKey { clause, .. } => {
                            self.check_foreign_key_clause(clause);
                        }
                        _ => {}
                    }
                }
                env.pop_scope();

                self.create_table_in_schema(table, create.if_not_exists, create.location);
            }
            CreateTableBody::AsSelect(select) => {
                let chunks = self.check_select(env, select);
                let mut table = Table::new(qname, TableKind::Normal);
                for column in flatten(&chunks) {
                    let ty = self.state.solution_or_default(&column.ty);
                    table
                        .columns
                        .insert(SchemaColumn::new(column.name.clone(), ty));
                }
                self.create_table_in_schema(table, create.if_not_exists, create.location);
            }
        }
    }

    fn check_foreign_key_clause(&mut self, clause: &ForeignKeyClause) {
        match self.schema.table(None, &clause.table.value) {
            None => {
                self.error(
                    format!("no such table: {}", clause.table.value),
                    clause.table.location,
                );
            }
            Some(parent) => {
                let missing: Vec<&ast::Ident> = clause
                    .columns
                    .iter()
                    .filter(|ident| parent.columns.get(&ident.value).is_none())
                    .collect();
                for ident in missing {
                    self.error(format!("no such column: {}", ident.value), ident.location);
                }
            }
        }
    }

    fn create_table_in_schema(&mut self, table: Table, if_not_exists: bool, location: Location) {
        if self
            .schema
            .table(Some(&table.qname.schema), table.name())
            .is_some()
        {
            if !if_not_exists {
                self.error(format!("table {} already exists", table.name()), location);
            }
            return;
        }
        if let Err(error) = self.schema.create_table(table) {
            self.error(error.to_string(), location);
        }
    }

    fn target_schema(&mut self, temporary: bool, name: &ast::QualifiedName) -> SchemaName {
        if temporary {
            return SchemaName::Temp;
        }
        match &name.schema {
            None => SchemaName::Main,
            Some(schema_ident) => {
                let schema_name = SchemaName::parse(&schema_ident.value);
                if !schema_name.is_known() {
                    self.error(
                        format!("no such schema: {}", schema_ident.value),
                        schema_ident.location,
                    );
                    return SchemaName::Main;
                }
                schema_name
            }
        }
    }

    /// Map a declared type to its canonical nominal via SQLite's affinity
    /// rules, keeping any host alias wrapper.
    fn declared_column_type(&self, type_name: Option<&TypeName>) -> Type {
        let Some(type_name) = type_name else {
            return Type::any();
        };
        let inner = affinity_type(&type_name.name.value);
        wrap_alias(inner, type_name)
    }

    /// `CAST` keeps the raw (uppercased) spelling rather than canonicalizing.
    pub(crate) fn declared_cast_type(&self, type_name: &TypeName) -> Type {
        let inner = Type::Nominal(SmolStr::new(type_name.name.value.to_uppercase()));
        wrap_alias(inner, type_name)
    }

    fn check_alter_table(&mut self, env: &mut Env, alter: &AlterTableStmt) {
        let (kind, table_name) = match self.resolve_table_name(env, &alter.table) {
            Some(table) => (table.kind, table.name().clone()),
            None => return,
        };
        match kind {
            TableKind::View => {
                self.error(
                    format!("cannot alter view {table_name}"),
                    alter.table.location(),
                );
                return;
            }
            TableKind::Fts5 => {
                self.error(
                    format!("cannot alter virtual table {table_name}"),
                    alter.table.location(),
                );
                return;
            }
            _ => {}
        }

        let schema_name = alter
            .table
            .schema
            .as_ref()
            .map(|s| SchemaName::parse(&s.value));

        match &alter.action {
            AlterAction::RenameTo(new_name) => {
                if let Err(error) = self.schema.rename_table(
                    schema_name.as_ref(),
                    &alter.table.name.value,
                    &new_name.value,
                ) {
                    self.error(error.to_string(), new_name.location);
                }
            }
            AlterAction::RenameColumn { from, to } => {
                let failure = {
                    let Some(table) = self
                        .schema
                        .table_mut(schema_name.as_ref(), &alter.table.name.value)
                    else {
                        return;
                    };
                    if !table.columns.contains(&from.value) {
                        Some((format!("no such column: {}", from.value), from.location))
                    } else if !table.columns.rename(&from.value, &to.value) {
                        Some((format!("duplicate column name: {}", to.value), to.location))
                    } else {
                        for pk in &mut table.primary_key {
                            if pk.eq_ignore_ascii_case(&from.value) {
                                *pk = to.value.clone();
                            }
                        }
                        None
                    }
                };
                if let Some((message, location)) = failure {
                    self.error(message, location);
                }
            }
            AlterAction::AddColumn(column_def) => {
                self.check_add_column(env, alter, schema_name.as_ref(), column_def);
            }
            AlterAction::DropColumn(ident) => {
                let failure = {
                    let Some(table) = self
                        .schema
                        .table_mut(schema_name.as_ref(), &alter.table.name.value)
                    else {
                        return;
                    };
                    if !table.columns.contains(&ident.value) {
                        Some(format!("no such column: {}", ident.value))
                    } else if table
                        .primary_key
                        .iter()
                        .any(|pk| pk.eq_ignore_ascii_case(&ident.value))
                    {
                        Some(format!("cannot drop primary key column: {}", ident.value))
                    } else {
                        table.columns.remove(&ident.value);
                        None
                    }
                };
                if let Some(message) = failure {
                    self.error(message, ident.location);
                }
            }
        }
    }

    fn check_add_column(
        &mut self,
        env: &mut Env,
        alter: &AlterTableStmt,
        schema_name: Option<&SchemaName>,
        column_def: &ColumnDef,
    ) {
        let base = self.declared_column_type(column_def.type_name.as_ref());
        let not_null = column_def.is_not_null() || column_def.is_primary_key();
        let ty = if not_null { base } else { Type::optional(base) };

        let mut schema_column = SchemaColumn::new(column_def.name.value.clone(), ty.clone());
        schema_column.has_default = column_def.default_expr().is_some();
        schema_column.is_generated = column_def.is_generated();

        let inserted = {
            let Some(table) = self
                .schema
                .table_mut(schema_name, &alter.table.name.value)
            else {
                return;
            };
            table.columns.insert(schema_column)
        };
        if !inserted {
            self.error(
                format!("duplicate column name: {}", column_def.name.value),
                column_def.name.location,
            );
            return;
        }

        // Constraint expressions see the updated table.
        let table = self
            .schema
            .table(schema_name, &alter.table.name.value)
            .cloned()
            .expect("just updated");
        env.push_scope();
        env.import(&table, ImportOptions::default());
        for constraint in &column_def.constraints {
            match &constraint.kind {
                ColumnConstraintKind::Default(expr)
                | ColumnConstraintKind::Generated { expr, .. } => {
                    let expr_ty = self.check_expr(env, expr);
                    self.state.unify(&expr_ty, &ty, expr.location());
                }
                ColumnConstraintKind::Check(expr) => {
                    let expr_ty = self.check_expr(env, expr);
                    self.expect_integer("CHECK", &expr_ty, expr.location());
                }
                ColumnConstraintKind::ForeignKey(clause) => {
                    self.check_foreign_key_clause(clause);
                }
                _ => {}
            }
        }
        env.pop_scope();
    }

    fn check_create_index(&mut self, env: &mut Env, index: &CreateIndexStmt) {
        let Some(table) = self.schema.table(None, &index.table.value).cloned() else {
            self.error(
                format!("no such table: {}", index.table.value),
                index.table.location,
            );
            return;
        };

        for indexed_column in &index.columns {
            if table.columns.get(&indexed_column.column.value).is_none() {
                self.error(
                    format!("no such column: {}", indexed_column.column.value),
                    indexed_column.column.location,
                );
            }
        }

        if let Some(where_clause) = &index.where_clause {
            env.push_scope();
            env.import(&table, ImportOptions::default());
            let ty = self.check_expr(env, where_clause);
            self.expect_integer("WHERE", &ty, where_clause.location());
            env.pop_scope();
        }

        let schema_name = self.target_schema(false, &index.name);
        let result = self.schema.create_index(Index {
            qname: SchemaQualifiedName::new(schema_name, index.name.name.value.clone()),
            table: table.name().clone(),
        });
        if let Err(error) = result {
            if !index.if_not_exists {
                self.error(error.to_string(), index.name.name.location);
            }
        }
    }

    fn check_drop(&mut self, drop: &DropStmt) {
        let schema_name = drop.name.schema.as_ref().map(|s| SchemaName::parse(&s.value));
        let name = &drop.name.name;

        match drop.kind {
            DropKind::Table | DropKind::View => {
                let found = self
                    .schema
                    .table(schema_name.as_ref(), &name.value)
                    .map(|t| t.kind);
                match (drop.kind, found) {
                    (DropKind::Table, Some(TableKind::View)) => {
                        self.error(
                            format!("use DROP VIEW to delete view {}", name.value),
                            name.location,
                        );
                    }
                    (DropKind::View, Some(kind)) if kind != TableKind::View => {
                        self.error(
                            format!("use DROP TABLE to delete table {}", name.value),
                            name.location,
                        );
                    }
                    (_, Some(_)) => {
                        let _ = self.schema.drop_table(schema_name.as_ref(), &name.value);
                    }
                    (DropKind::Table, None) => {
                        if !drop.if_exists {
                            self.error(format!("no such table: {}", name.value), name.location);
                        }
                    }
                    (_, None) => {
                        if !drop.if_exists {
                            self.error(format!("no such view: {}", name.value), name.location);
                        }
                    }
                }
            }
            DropKind::Index => {
                if let Err(error) = self.schema.drop_index(schema_name.as_ref(), &name.value) {
                    if !drop.if_exists {
                        self.error(error.to_string(), name.location);
                    }
                }
            }
            DropKind::Trigger => {
                if let Err(error) = self.schema.drop_trigger(schema_name.as_ref(), &name.value) {
                    if !drop.if_exists {
                        self.error(error.to_string(), name.location);
                    }
                }
            }
        }
    }

    fn check_create_view(&mut self, env: &mut Env, view: &CreateViewStmt) {
        let chunks = self.check_select(env, &view.select);
        let output: Vec<OutputColumn> = flatten(&chunks).into_iter().cloned().collect();

        let schema_name = if view.temporary {
            SchemaName::Temp
        } else {
            self.target_schema(false, &view.name)
        };
        let mut table = Table::new(
            SchemaQualifiedName::new(schema_name, view.name.name.value.clone()),
            TableKind::View,
        );

        if view.columns.is_empty() {
            for column in &output {
                let ty = self.state.solution_or_default(&column.ty);
                table
                    .columns
                    .insert(SchemaColumn::new(column.name.clone(), ty));
            }
        } else {
            if view.columns.len() != output.len() {
                self.error(
                    format!(
                        "view {} declares {} columns but its SELECT produces {}",
                        view.name.name.value,
                        view.columns.len(),
                        output.len()
                    ),
                    view.location,
                );
            }
            for (declared, column) in view.columns.iter().zip(&output) {
                let ty = self.state.solution_or_default(&column.ty);
                table
                    .columns
                    .insert(SchemaColumn::new(declared.value.clone(), ty));
            }
        }

        self.create_table_in_schema(table, view.if_not_exists, view.location);
    }

    fn check_create_trigger(&mut self, env: &mut Env, trigger: &CreateTriggerStmt) {
        let Some(target) = self.resolve_table_name(env, &trigger.table) else {
            return;
        };

        if let TriggerEvent::Update(columns) = &trigger.event {
            for ident in columns {
                if target.columns.get(&ident.value).is_none() {
                    self.error(format!("no such column: {}", ident.value), ident.location);
                }
            }
        }

        env.push_scope();
        let imports_new = matches!(
            trigger.event,
            TriggerEvent::Insert | TriggerEvent::Update(_)
        );
        let imports_old = matches!(
            trigger.event,
            TriggerEvent::Delete | TriggerEvent::Update(_)
        );
        if imports_new {
            env.import(
                &target,
                ImportOptions::default().config(|o| {
                    o.alias = Some(SmolStr::new_static("new"));
                    o.qualified_access_only = true;
                }),
            );
        }
        if imports_old {
            env.import(
                &target,
                ImportOptions::default().config(|o| {
                    o.alias = Some(SmolStr::new_static("old"));
                    o.qualified_access_only = true;
                }),
            );
        }

        if let Some(when) = &trigger.when {
            let ty = self.check_expr(env, when);
            self.expect_integer("WHEN", &ty, when.location());
        }

        let mut used_tables = AHashSet::new();
        for stmt in &trigger.body {
            collect_used_tables(stmt, &mut used_tables);
            self.check_statement_in(env, stmt);
        }
        env.pop_scope();

        let schema_name = if trigger.temporary {
            SchemaName::Temp
        } else {
            self.target_schema(false, &trigger.name)
        };
        let result = self.schema.create_trigger(Trigger {
            qname: SchemaQualifiedName::new(schema_name, trigger.name.name.value.clone()),
            target_table: target.name().clone(),
            used_tables,
        });
        if let Err(error) = result {
            if !trigger.if_not_exists {
                self.error(error.to_string(), trigger.name.name.location);
            }
        }
    }

    fn check_create_virtual_table(&mut self, virtual_table: &CreateVirtualTableStmt) {
        if !virtual_table.module.value.eq_ignore_ascii_case("fts5") {
            self.error(
                format!(
                    "unsupported virtual table module: {}",
                    virtual_table.module.value
                ),
                virtual_table.module.location,
            );
            return;
        }

        let schema_name = self.target_schema(false, &virtual_table.name);
        let mut table = Table::new(
            SchemaQualifiedName::new(schema_name, virtual_table.name.name.value.clone()),
            TableKind::Fts5,
        );
        for argument in &virtual_table.args {
            if let ModuleArgument::Column { name, .. } = argument {
                table.columns.insert(SchemaColumn::new(
                    name.value.clone(),
                    Type::optional(Type::text()),
                ));
            }
        }
        self.create_table_in_schema(table, virtual_table.if_not_exists, virtual_table.location);
    }

    fn check_pragma(&mut self, pragma: &PragmaStmt) {
        if !pragma
            .name
            .name
            .value
            .eq_ignore_ascii_case("require_strict_tables")
        {
            // Unknown pragmas pass through untouched.
            log::debug!("ignoring pragma {}", pragma.name.name.value);
            return;
        }

        let parsed = match &pragma.value {
            Some(PragmaValue::Name(ident)) => match ident.value.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" => Some(true),
                "off" | "false" | "no" => Some(false),
                _ => None,
            },
            Some(PragmaValue::Literal(Expr::Literal(literal))) => match &literal.value {
                squill_lib_core::ast::expr::Literal::Int(1) => Some(true),
                squill_lib_core::ast::expr::Literal::Int(0) => Some(false),
                squill_lib_core::ast::expr::Literal::True => Some(true),
                squill_lib_core::ast::expr::Literal::False => Some(false),
                _ => None,
            },
            _ => None,
        };

        match parsed {
            Some(value) => self.pragmas.require_strict_tables = value,
            None => self.error(
                "expected one of {on, off, true, false, yes, no, 1, 0}",
                pragma.location,
            ),
        }
    }
}

fn wrap_alias(inner: Type, type_name: &TypeName) -> Type {
    match &type_name.alias {
        Some(alias) => Type::Alias {
            inner: Box::new(inner),
            label: alias.label.value.clone(),
            adapter: alias.adapter.as_ref().map(|a| a.value.clone()),
        },
        None => inner,
    }
}

/// SQLite's column affinity rules, mapped onto the nominal set.
fn affinity_type(declared: &str) -> Type {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        Type::integer()
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        Type::text()
    } else if upper.contains("BLOB") {
        Type::blob()
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        Type::real()
    } else {
        Type::any()
    }
}

fn flatten_body(body: &SelectBody) -> Vec<&SelectCore> {
    match body {
        SelectBody::Core(core) => vec![core],
        SelectBody::Compound { lhs, rhs, .. } => {
            let mut arms = flatten_body(lhs);
            arms.push(rhs);
            arms
        }
    }
}

fn source_alias(source: &TableOrSubquery) -> Option<SmolStr> {
    match source {
        TableOrSubquery::Table { alias, .. }
        | TableOrSubquery::TableFunction { alias, .. }
        | TableOrSubquery::Subquery { alias, .. } => alias.as_ref().map(|a| a.value.clone()),
    }
}

/// Table names a trigger body touches, recorded on the trigger.
fn collect_used_tables(stmt: &Stmt, used: &mut AHashSet<SmolStr>) {
    fn from_clause(from: &FromClause, used: &mut AHashSet<SmolStr>) {
        source(&from.source, used);
        for join in &from.joins {
            source(&join.table, used);
        }
    }
    fn source(table: &TableOrSubquery, used: &mut AHashSet<SmolStr>) {
        match table {
            TableOrSubquery::Table { name, .. } => {
                used.insert(name.name.value.clone());
            }
            TableOrSubquery::Subquery { select, .. } => select_stmt(select, used),
            TableOrSubquery::TableFunction { .. } => {}
        }
    }
    fn select_stmt(select: &SelectStmt, used: &mut AHashSet<SmolStr>) {
        let mut body = &select.body;
        loop {
            let core = match body {
                SelectBody::Core(core) => core,
                SelectBody::Compound { lhs, rhs, .. } => {
                    if let Some(from) = &rhs.from {
                        from_clause(from, used);
                    }
                    body = lhs;
                    continue;
                }
            };
            if let Some(from) = &core.from {
                from_clause(from, used);
            }
            break;
        }
    }

    match stmt {
        Stmt::Select(select) => select_stmt(select, used),
        Stmt::Insert(insert) => {
            used.insert(insert.table.name.value.clone());
            if let InsertSource::Select(select) = &insert.source {
                select_stmt(select, used);
            }
        }
        Stmt::Update(update) => {
            used.insert(update.table.name.value.clone());
            if let Some(from) = &update.from {
                from_clause(from, used);
            }
        }
        Stmt::Delete(delete) => {
            used.insert(delete.table.name.value.clone());
        }
        _ => {}
    }
}
