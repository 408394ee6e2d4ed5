use ahash::AHashSet;
use smol_str::SmolStr;
use squill_lib_core::helpers::IndexMap;

use crate::catalog::Catalog;
use crate::schema::Table;
use crate::types::Type;

/// Outcome of a lookup against the environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Success(T),
    /// More than one imported table exposes a matching column; the payload is
    /// the first match.
    Ambiguous(T),
    ColumnDoesNotExist(SmolStr),
    TableDoesNotExist(SmolStr),
    SchemaDoesNotExist(SmolStr),
}

/// How a table is published into the current scope.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Publish under a different name.
    pub alias: Option<SmolStr>,
    /// Wrap all column types in `Optional` (left-joined tables).
    pub is_optional: bool,
    /// Columns reachable only as `table.column`, never bare (`NEW`/`OLD` in
    /// triggers, `excluded` in upserts).
    pub qualified_access_only: bool,
    /// Restrict the published columns (`USING` joins). Lowercased names.
    pub only_columns_in: Option<AHashSet<SmolStr>>,
}

/// A resolved output column of a lookup: the publishing table (if any) and
/// the column's type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    pub table: Option<SmolStr>,
    pub ty: Type,
}

#[derive(Debug, Clone)]
struct ImportedTable {
    /// Published name (alias or table name).
    name: SmolStr,
    /// Underlying table name, for output attribution.
    source: SmolStr,
    columns: IndexMap<SmolStr, PublishedColumn>,
    qualified_only: bool,
}

#[derive(Debug, Clone)]
struct PublishedColumn {
    name: SmolStr,
    ty: Type,
}

#[derive(Debug, Default)]
struct Scope {
    imports: Vec<ImportedTable>,
    ctes: IndexMap<SmolStr, Table>,
    aliases: IndexMap<SmolStr, Type>,
}

/// The scoped symbol table used while checking a statement: imported tables,
/// exposed columns, CTEs, and (borrowed) operator/function catalogs.
pub struct Environment<'a> {
    catalog: &'a Catalog,
    scopes: Vec<Scope>,
}

impl<'a> Environment<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            scopes: vec![Scope::default()],
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "popped the root scope");
    }

    fn top(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("at least the root scope")
    }

    fn fold(name: &str) -> SmolStr {
        SmolStr::new(name.to_ascii_lowercase())
    }

    // -- declarations ------------------------------------------------------

    /// Publish a table's columns into the current scope.
    pub fn import(&mut self, table: &Table, options: ImportOptions) {
        let name = options.alias.unwrap_or_else(|| table.name().clone());
        let mut columns = IndexMap::default();
        for column in table.columns.iter() {
            if let Some(only) = &options.only_columns_in {
                if !only.contains(&Self::fold(&column.name)) {
                    continue;
                }
            }
            let ty = if options.is_optional {
                Type::optional(column.ty.clone())
            } else {
                column.ty.clone()
            };
            columns.insert(
                Self::fold(&column.name),
                PublishedColumn {
                    name: column.name.clone(),
                    ty,
                },
            );
        }
        self.top().imports.push(ImportedTable {
            name,
            source: table.name().clone(),
            columns,
            qualified_only: options.qualified_access_only,
        });
    }

    /// Register a common table expression in the current scope.
    pub fn declare_cte(&mut self, table: Table) {
        let key = Self::fold(table.name());
        self.top().ctes.insert(key, table);
    }

    pub fn lookup_cte(&self, name: &str) -> Option<&Table> {
        let key = Self::fold(name);
        self.scopes.iter().rev().find_map(|scope| scope.ctes.get(&key))
    }

    /// Make a result-column alias visible for the rest of the same SELECT.
    pub fn declare_result_alias(&mut self, name: &str, ty: Type) {
        let key = Self::fold(name);
        self.top().aliases.insert(key, ty);
    }

    // -- lookups -----------------------------------------------------------

    /// Resolve a (possibly qualified) column reference.
    pub fn lookup_column(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
        column: &str,
    ) -> Resolution<ResolvedColumn> {
        if let Some(schema) = schema {
            if !crate::schema::SchemaName::parse(schema).is_known() {
                return Resolution::SchemaDoesNotExist(SmolStr::new(schema));
            }
        }

        let key = Self::fold(column);

        if let Some(table) = table {
            let Some(import) = self.find_import(table) else {
                return Resolution::TableDoesNotExist(SmolStr::new(table));
            };
            return match import.columns.get(&key) {
                Some(found) => Resolution::Success(ResolvedColumn {
                    table: Some(import.name.clone()),
                    ty: found.ty.clone(),
                }),
                None => Resolution::ColumnDoesNotExist(SmolStr::new(column)),
            };
        }

        for scope in self.scopes.iter().rev() {
            let mut matches = scope
                .imports
                .iter()
                .filter(|import| !import.qualified_only)
                .filter_map(|import| {
                    import.columns.get(&key).map(|found| ResolvedColumn {
                        table: Some(import.name.clone()),
                        ty: found.ty.clone(),
                    })
                });
            if let Some(first) = matches.next() {
                return if matches.next().is_some() {
                    Resolution::Ambiguous(first)
                } else {
                    Resolution::Success(first)
                };
            }
            if let Some(ty) = scope.aliases.get(&key) {
                return Resolution::Success(ResolvedColumn {
                    table: None,
                    ty: ty.clone(),
                });
            }
        }

        Resolution::ColumnDoesNotExist(SmolStr::new(column))
    }

    fn find_import(&self, table: &str) -> Option<&ImportedTable> {
        let key = Self::fold(table);
        self.scopes.iter().rev().find_map(|scope| {
            scope
                .imports
                .iter()
                .find(|import| Self::fold(&import.name) == key)
        })
    }

    /// The published columns of `table`, in order, for `table.*`.
    pub fn table_columns(&self, table: &str) -> Resolution<Vec<(SmolStr, Type)>> {
        match self.find_import(table) {
            Some(import) => Resolution::Success(
                import
                    .columns
                    .values()
                    .map(|c| (c.name.clone(), c.ty.clone()))
                    .collect(),
            ),
            None => Resolution::TableDoesNotExist(SmolStr::new(table)),
        }
    }

    /// Every bare-visible table in the innermost scope that has imports, in
    /// import order, for `*` expansion.
    pub fn visible_tables(&self) -> Vec<(SmolStr, Vec<(SmolStr, Type)>)> {
        for scope in self.scopes.iter().rev() {
            if scope.imports.iter().any(|import| !import.qualified_only) {
                return scope
                    .imports
                    .iter()
                    .filter(|import| !import.qualified_only)
                    .map(|import| {
                        (
                            import.name.clone(),
                            import
                                .columns
                                .values()
                                .map(|c| (c.name.clone(), c.ty.clone()))
                                .collect(),
                        )
                    })
                    .collect();
            }
        }
        Vec::new()
    }

    /// The underlying table name an import publishes, for attribution.
    pub fn source_of(&self, published: &str) -> Option<SmolStr> {
        self.find_import(published).map(|import| import.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::{Column, QualifiedName, Table, TableKind};
    use squill_lib_core::helpers::Config;

    fn users() -> Table {
        let mut table = Table::new(QualifiedName::main("users"), TableKind::Normal);
        table.columns.insert(Column::new("id", Type::integer()));
        table.columns.insert(Column::new("name", Type::text()));
        table
    }

    fn posts() -> Table {
        let mut table = Table::new(QualifiedName::main("posts"), TableKind::Normal);
        table.columns.insert(Column::new("id", Type::integer()));
        table
            .columns
            .insert(Column::new("user_id", Type::integer()));
        table
    }

    #[test]
    fn test_bare_lookup_success_and_ambiguity() {
        let mut env = Environment::new(Catalog::global());
        env.import(&users(), ImportOptions::default());
        env.import(&posts(), ImportOptions::default());

        assert!(matches!(
            env.lookup_column(None, None, "name"),
            Resolution::Success(ResolvedColumn { ty, .. }) if ty == Type::text()
        ));
        assert!(matches!(
            env.lookup_column(None, None, "id"),
            Resolution::Ambiguous(_)
        ));
        assert!(matches!(
            env.lookup_column(None, None, "missing"),
            Resolution::ColumnDoesNotExist(_)
        ));
    }

    #[test]
    fn test_qualified_lookup_and_alias() {
        let mut env = Environment::new(Catalog::global());
        env.import(
            &users(),
            ImportOptions::default().config(|o| o.alias = Some("u".into())),
        );

        assert!(matches!(
            env.lookup_column(None, Some("u"), "id"),
            Resolution::Success(_)
        ));
        assert!(matches!(
            env.lookup_column(None, Some("users"), "id"),
            Resolution::TableDoesNotExist(_)
        ));
        assert!(matches!(
            env.lookup_column(Some("bogus"), Some("u"), "id"),
            Resolution::SchemaDoesNotExist(_)
        ));
    }

    #[test]
    fn test_optional_import_wraps_types() {
        let mut env = Environment::new(Catalog::global());
        env.import(
            &users(),
            ImportOptions::default().config(|o| o.is_optional = true),
        );
        let Resolution::Success(resolved) = env.lookup_column(None, None, "name") else {
            panic!();
        };
        assert_eq!(resolved.ty, Type::optional(Type::text()));
    }

    #[test]
    fn test_qualified_access_only_hides_bare_columns() {
        let mut env = Environment::new(Catalog::global());
        env.import(
            &users(),
            ImportOptions::default().config(|o| {
                o.alias = Some("excluded".into());
                o.qualified_access_only = true;
            }),
        );
        assert!(matches!(
            env.lookup_column(None, None, "id"),
            Resolution::ColumnDoesNotExist(_)
        ));
        assert!(matches!(
            env.lookup_column(None, Some("excluded"), "id"),
            Resolution::Success(_)
        ));
        assert!(env.visible_tables().is_empty());
    }

    #[test]
    fn test_only_columns_in_restricts() {
        let mut env = Environment::new(Catalog::global());
        let mut only = AHashSet::new();
        only.insert(SmolStr::new("id"));
        env.import(
            &users(),
            ImportOptions::default().config(|o| o.only_columns_in = Some(only)),
        );
        assert!(matches!(
            env.lookup_column(None, Some("users"), "name"),
            Resolution::ColumnDoesNotExist(_)
        ));
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut env = Environment::new(Catalog::global());
        env.import(&users(), ImportOptions::default());
        env.push_scope();
        env.import(&posts(), ImportOptions::default());

        // `id` resolves in the inner scope only; no ambiguity with `users`.
        assert!(matches!(
            env.lookup_column(None, None, "id"),
            Resolution::Success(ResolvedColumn { table: Some(t), .. }) if t == "posts"
        ));
        // Outer tables stay reachable for correlated references.
        assert!(matches!(
            env.lookup_column(None, Some("users"), "name"),
            Resolution::Success(_)
        ));
        env.pop_scope();
    }

    #[test]
    fn test_result_alias_visibility() {
        let mut env = Environment::new(Catalog::global());
        env.import(&users(), ImportOptions::default());
        env.declare_result_alias("full_name", Type::text());
        assert!(matches!(
            env.lookup_column(None, None, "full_name"),
            Resolution::Success(ResolvedColumn { table: None, .. })
        ));
        // Real columns win over aliases.
        env.declare_result_alias("name", Type::integer());
        let Resolution::Success(resolved) = env.lookup_column(None, None, "name") else {
            panic!();
        };
        assert_eq!(resolved.ty, Type::text());
    }

    #[test]
    fn test_cte_lookup_across_scopes() {
        let mut env = Environment::new(Catalog::global());
        let cte = Table::new(QualifiedName::main("recent"), TableKind::Cte);
        env.declare_cte(cte);
        env.push_scope();
        assert!(env.lookup_cte("RECENT").is_some());
        assert!(env.lookup_cte("missing").is_none());
        env.pop_scope();
    }
}
