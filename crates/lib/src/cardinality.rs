use ahash::AHashSet;
use smol_str::SmolStr;
use squill_lib_core::ast::expr::{ColumnTarget, Expr, InfixOp, Literal};
use squill_lib_core::ast::stmt::{InsertSource, SelectBody, SelectStmt, Stmt};

use crate::schema::{Schema, Table};

/// Whether a statement is guaranteed to yield at most one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cardinality {
    Single,
    Many,
}

/// Classify a checked statement's output cardinality.
pub fn infer_cardinality(schema: &Schema, stmt: &Stmt) -> Cardinality {
    match stmt {
        Stmt::QueryDefinition(query) => infer_cardinality(schema, &query.stmt),
        Stmt::Select(select) => select_cardinality(schema, select),
        Stmt::Insert(insert) => match &insert.source {
            InsertSource::DefaultValues => Cardinality::Single,
            InsertSource::Values(rows) if rows.len() == 1 => Cardinality::Single,
            _ => Cardinality::Many,
        },
        Stmt::Update(update) => {
            filtered_to_one(schema, &update.table, update.where_clause.as_ref())
        }
        Stmt::Delete(delete) => {
            filtered_to_one(schema, &delete.table, delete.where_clause.as_ref())
        }
        _ => Cardinality::Many,
    }
}

fn select_cardinality(schema: &Schema, select: &SelectStmt) -> Cardinality {
    if let Some(limit) = &select.limit {
        if matches!(
            &limit.limit,
            Expr::Literal(literal) if literal.value == Literal::Int(1)
        ) {
            return Cardinality::Single;
        }
    }

    let SelectBody::Core(core) = &select.body else {
        return Cardinality::Many;
    };
    let Some(from) = &core.from else {
        // A FROM-less SELECT is a single computed row.
        return Cardinality::Single;
    };
    let Some(table_name) = from.single_table() else {
        return Cardinality::Many;
    };
    let Some(table) = schema.table(None, &table_name.name.value) else {
        return Cardinality::Many;
    };
    let Some(where_clause) = &core.where_clause else {
        return Cardinality::Many;
    };

    if primary_key_covered(table, where_clause) {
        Cardinality::Single
    } else {
        Cardinality::Many
    }
}

fn filtered_to_one(
    schema: &Schema,
    table: &squill_lib_core::ast::QualifiedName,
    where_clause: Option<&Expr>,
) -> Cardinality {
    let Some(table) = schema.table(None, &table.name.value) else {
        return Cardinality::Many;
    };
    let Some(where_clause) = where_clause else {
        return Cardinality::Many;
    };
    if primary_key_covered(table, where_clause) {
        Cardinality::Single
    } else {
        Cardinality::Many
    }
}

fn primary_key_covered(table: &Table, where_clause: &Expr) -> bool {
    if table.primary_key.is_empty() {
        return false;
    }
    let tested = equality_columns(where_clause);
    table
        .primary_key
        .iter()
        .all(|pk| tested.contains(&SmolStr::new(pk.to_ascii_lowercase())))
}

/// Column names individually tested for equality at the top of an `AND`
/// tree, lowercased.
fn equality_columns(expr: &Expr) -> AHashSet<SmolStr> {
    let mut columns = AHashSet::new();
    collect_equalities(expr, &mut columns);
    columns
}

fn collect_equalities(expr: &Expr, columns: &mut AHashSet<SmolStr>) {
    let Expr::Infix(infix) = expr else {
        return;
    };
    match infix.op {
        InfixOp::And => {
            collect_equalities(&infix.lhs, columns);
            collect_equalities(&infix.rhs, columns);
        }
        InfixOp::Equals | InfixOp::Is => {
            for side in [&infix.lhs, &infix.rhs] {
                if let Expr::Column(column) = side.as_ref() {
                    if let ColumnTarget::Named(name) = &column.target {
                        columns.insert(SmolStr::new(name.value.to_ascii_lowercase()));
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use squill_lib_core::parser::parse;

    use super::*;
    use crate::schema::{Column, QualifiedName, TableKind};
    use crate::types::Type;

    fn schema_with_users() -> Schema {
        let mut schema = Schema::new();
        let mut table = Table::new(QualifiedName::main("users"), TableKind::Normal);
        table.columns.insert(Column::new("id", Type::integer()));
        table
            .columns
            .insert(Column::new("org", Type::integer()));
        table.columns.insert(Column::new("name", Type::text()));
        table.primary_key = vec!["id".into()];
        schema.create_table(table).unwrap();
        schema
    }

    fn cardinality_of(source: &str) -> Cardinality {
        let schema = schema_with_users();
        let result = parse(source);
        infer_cardinality(&schema, &result.statements[0])
    }

    #[test]
    fn test_limit_one_is_single() {
        assert_eq!(
            cardinality_of("SELECT name FROM users LIMIT 1;"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("SELECT name FROM users LIMIT 2;"),
            Cardinality::Many
        );
        assert_eq!(
            cardinality_of("SELECT name FROM users LIMIT :n;"),
            Cardinality::Many
        );
    }

    #[test]
    fn test_primary_key_equality_is_single() {
        assert_eq!(
            cardinality_of("SELECT name FROM users WHERE id = ?;"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("SELECT name FROM users WHERE id = ? AND name = 'x';"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("SELECT name FROM users WHERE name = 'x';"),
            Cardinality::Many
        );
        // An OR above the equality breaks the guarantee.
        assert_eq!(
            cardinality_of("SELECT name FROM users WHERE id = ? OR name = 'x';"),
            Cardinality::Many
        );
    }

    #[test]
    fn test_compound_select_is_many() {
        assert_eq!(
            cardinality_of("SELECT id FROM users UNION SELECT org FROM users;"),
            Cardinality::Many
        );
    }

    #[test]
    fn test_insert_forms() {
        assert_eq!(
            cardinality_of("INSERT INTO users DEFAULT VALUES;"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("INSERT INTO users (id, name) VALUES (1, 'a');"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b');"),
            Cardinality::Many
        );
    }

    #[test]
    fn test_update_delete_by_primary_key() {
        assert_eq!(
            cardinality_of("UPDATE users SET name = 'x' WHERE id = 1;"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("UPDATE users SET name = 'x';"),
            Cardinality::Many
        );
        assert_eq!(
            cardinality_of("DELETE FROM users WHERE id = ?;"),
            Cardinality::Single
        );
        assert_eq!(
            cardinality_of("DELETE FROM users WHERE org = ?;"),
            Cardinality::Many
        );
    }

    #[test]
    fn test_ddl_is_many() {
        assert_eq!(
            cardinality_of("CREATE TABLE t (a INTEGER);"),
            Cardinality::Many
        );
    }
}
