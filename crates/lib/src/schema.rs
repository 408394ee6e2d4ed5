use ahash::AHashSet;
use smol_str::SmolStr;
use squill_lib_core::helpers::IndexMap;

use crate::types::Type;

/// Which namespace an object lives in. Unqualified lookups search `temp`
/// first, then `main`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaName {
    Main,
    Temp,
    Custom(SmolStr),
}

impl SchemaName {
    pub fn parse(name: &str) -> SchemaName {
        if name.eq_ignore_ascii_case("main") {
            SchemaName::Main
        } else if name.eq_ignore_ascii_case("temp") {
            SchemaName::Temp
        } else {
            SchemaName::Custom(SmolStr::new(name.to_ascii_lowercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SchemaName::Main => "main",
            SchemaName::Temp => "temp",
            SchemaName::Custom(name) => name,
        }
    }

    /// Whether this schema actually exists; only `main` and `temp` do, since
    /// `ATTACH` is out of scope.
    pub fn is_known(&self) -> bool {
        !matches!(self, SchemaName::Custom(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: SchemaName,
    pub name: SmolStr,
}

impl QualifiedName {
    pub fn new(schema: SchemaName, name: impl Into<SmolStr>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    pub fn main(name: impl Into<SmolStr>) -> Self {
        Self::new(SchemaName::Main, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Normal,
    View,
    Cte,
    Subquery,
    Fts5,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: SmolStr,
    pub ty: Type,
    pub has_default: bool,
    pub is_generated: bool,
}

impl Column {
    pub fn new(name: impl Into<SmolStr>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: false,
            is_generated: false,
        }
    }
}

/// Ordered, case-insensitively keyed column collection. Order is observable:
/// it drives `INSERT … VALUES` positional matching and `SELECT *` expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    map: IndexMap<SmolStr, Column>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> SmolStr {
        SmolStr::new(name.to_ascii_lowercase())
    }

    /// Insert a column, keeping declaration order. Returns `false` when a
    /// column of that name is already present.
    pub fn insert(&mut self, column: Column) -> bool {
        let key = Self::key(&column.name);
        if self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, column);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.map.get(&Self::key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&Self::key(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.map.shift_remove(&Self::key(name))
    }

    /// Rename in place, preserving position.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        let from_key = Self::key(from);
        let Some(index) = self.map.get_index_of(&from_key) else {
            return false;
        };
        if self.contains(to) && !from.eq_ignore_ascii_case(to) {
            return false;
        }
        let mut column = self.map.shift_remove(&from_key).expect("indexed above");
        column.name = SmolStr::new(to);
        self.map.shift_insert(index, Self::key(to), column);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<Column> for Columns {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        let mut columns = Columns::new();
        for column in iter {
            columns.insert(column);
        }
        columns
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub qname: QualifiedName,
    pub columns: Columns,
    pub primary_key: Vec<SmolStr>,
    pub kind: TableKind,
}

impl Table {
    pub fn new(qname: QualifiedName, kind: TableKind) -> Self {
        Self {
            qname,
            columns: Columns::new(),
            primary_key: Vec::new(),
            kind,
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.qname.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub qname: QualifiedName,
    pub table: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub qname: QualifiedName,
    pub target_table: SmolStr,
    pub used_tables: AHashSet<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("table {0} already exists")]
    TableAlreadyExists(SmolStr),
    #[error("no such table: {0}")]
    TableDoesNotExist(SmolStr),
    #[error("index {0} already exists")]
    IndexAlreadyExists(SmolStr),
    #[error("no such index: {0}")]
    IndexDoesNotExist(SmolStr),
    #[error("trigger {0} already exists")]
    TriggerAlreadyExists(SmolStr),
    #[error("no such trigger: {0}")]
    TriggerDoesNotExist(SmolStr),
    #[error("no such column: {0}")]
    ColumnDoesNotExist(SmolStr),
    #[error("duplicate column name: {0}")]
    DuplicateColumn(SmolStr),
}

type Key = (SchemaName, SmolStr);

fn key(schema: &SchemaName, name: &str) -> Key {
    (schema.clone(), SmolStr::new(name.to_ascii_lowercase()))
}

/// The evolving database schema. Built by applying DDL in source order; each
/// later statement observes the schema as of the last applied DDL.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: IndexMap<Key, Table>,
    indexes: IndexMap<Key, Index>,
    triggers: IndexMap<Key, Trigger>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_key<'a>(
        &self,
        schema: Option<&SchemaName>,
        name: &str,
        contains: impl Fn(&Self, &Key) -> bool + 'a,
    ) -> Key {
        match schema {
            Some(schema) => key(schema, name),
            None => {
                let temp = key(&SchemaName::Temp, name);
                if contains(self, &temp) {
                    temp
                } else {
                    key(&SchemaName::Main, name)
                }
            }
        }
    }

    // -- tables ------------------------------------------------------------

    pub fn create_table(&mut self, table: Table) -> Result<(), SchemaError> {
        let key = key(&table.qname.schema, &table.qname.name);
        if self.tables.contains_key(&key) {
            return Err(SchemaError::TableAlreadyExists(table.qname.name.clone()));
        }
        log::debug!("schema: created table {}", table.qname.name);
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn table(&self, schema: Option<&SchemaName>, name: &str) -> Option<&Table> {
        let key = self.resolve_key(schema, name, |s, k| s.tables.contains_key(k));
        self.tables.get(&key)
    }

    pub fn table_mut(&mut self, schema: Option<&SchemaName>, name: &str) -> Option<&mut Table> {
        let key = self.resolve_key(schema, name, |s, k| s.tables.contains_key(k));
        self.tables.get_mut(&key)
    }

    pub fn drop_table(
        &mut self,
        schema: Option<&SchemaName>,
        name: &str,
    ) -> Result<Table, SchemaError> {
        let key = self.resolve_key(schema, name, |s, k| s.tables.contains_key(k));
        let table = self
            .tables
            .shift_remove(&key)
            .ok_or_else(|| SchemaError::TableDoesNotExist(SmolStr::new(name)))?;
        // Indexes and triggers on the table go with it.
        self.indexes
            .retain(|_, index| !index.table.eq_ignore_ascii_case(name));
        self.triggers
            .retain(|_, trigger| !trigger.target_table.eq_ignore_ascii_case(name));
        log::debug!("schema: dropped table {}", table.qname.name);
        Ok(table)
    }

    pub fn rename_table(
        &mut self,
        schema: Option<&SchemaName>,
        name: &str,
        new_name: &str,
    ) -> Result<(), SchemaError> {
        let old_key = self.resolve_key(schema, name, |s, k| s.tables.contains_key(k));
        if !self.tables.contains_key(&old_key) {
            return Err(SchemaError::TableDoesNotExist(SmolStr::new(name)));
        }
        let new_key = key(&old_key.0, new_name);
        if self.tables.contains_key(&new_key) {
            return Err(SchemaError::TableAlreadyExists(SmolStr::new(new_name)));
        }
        let mut table = self.tables.shift_remove(&old_key).expect("checked above");
        table.qname.name = SmolStr::new(new_name);
        self.tables.insert(new_key, table);
        for index in self.indexes.values_mut() {
            if index.table.eq_ignore_ascii_case(name) {
                index.table = SmolStr::new(new_name);
            }
        }
        for trigger in self.triggers.values_mut() {
            if trigger.target_table.eq_ignore_ascii_case(name) {
                trigger.target_table = SmolStr::new(new_name);
            }
        }
        Ok(())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    // -- indexes -----------------------------------------------------------

    pub fn create_index(&mut self, index: Index) -> Result<(), SchemaError> {
        let key = key(&index.qname.schema, &index.qname.name);
        if self.indexes.contains_key(&key) {
            return Err(SchemaError::IndexAlreadyExists(index.qname.name.clone()));
        }
        self.indexes.insert(key, index);
        Ok(())
    }

    pub fn drop_index(
        &mut self,
        schema: Option<&SchemaName>,
        name: &str,
    ) -> Result<Index, SchemaError> {
        let key = self.resolve_key(schema, name, |s, k| s.indexes.contains_key(k));
        self.indexes
            .shift_remove(&key)
            .ok_or_else(|| SchemaError::IndexDoesNotExist(SmolStr::new(name)))
    }

    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }

    // -- triggers ----------------------------------------------------------

    pub fn create_trigger(&mut self, trigger: Trigger) -> Result<(), SchemaError> {
        let key = key(&trigger.qname.schema, &trigger.qname.name);
        if self.triggers.contains_key(&key) {
            return Err(SchemaError::TriggerAlreadyExists(trigger.qname.name.clone()));
        }
        self.triggers.insert(key, trigger);
        Ok(())
    }

    pub fn drop_trigger(
        &mut self,
        schema: Option<&SchemaName>,
        name: &str,
    ) -> Result<Trigger, SchemaError> {
        let key = self.resolve_key(schema, name, |s, k| s.triggers.contains_key(k));
        self.triggers
            .shift_remove(&key)
            .ok_or_else(|| SchemaError::TriggerDoesNotExist(SmolStr::new(name)))
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.values()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn table(name: &str, columns: &[&str]) -> Table {
        let mut table = Table::new(QualifiedName::main(name), TableKind::Normal);
        for column in columns {
            table.columns.insert(Column::new(*column, Type::integer()));
        }
        table
    }

    #[test]
    fn test_create_and_lookup_is_case_insensitive() {
        let mut schema = Schema::new();
        schema.create_table(table("Users", &["Id"])).unwrap();
        let found = schema.table(None, "USERS").unwrap();
        assert_eq!(found.name().as_str(), "Users");
        assert!(found.columns.get("id").is_some());
    }

    #[test]
    fn test_duplicate_table_is_rejected() {
        let mut schema = Schema::new();
        schema.create_table(table("t", &[])).unwrap();
        assert_eq!(
            schema.create_table(table("T", &[])),
            Err(SchemaError::TableAlreadyExists("T".into()))
        );
    }

    #[test]
    fn test_temp_shadows_main() {
        let mut schema = Schema::new();
        schema.create_table(table("t", &["a"])).unwrap();
        let mut shadow = Table::new(QualifiedName::new(SchemaName::Temp, "t"), TableKind::Normal);
        shadow.columns.insert(Column::new("b", Type::text()));
        schema.create_table(shadow).unwrap();

        let found = schema.table(None, "t").unwrap();
        assert_eq!(found.qname.schema, SchemaName::Temp);
        assert!(schema.table(Some(&SchemaName::Main), "t").is_some());
    }

    #[test]
    fn test_drop_table_removes_dependents() {
        let mut schema = Schema::new();
        schema.create_table(table("t", &["a"])).unwrap();
        schema
            .create_index(Index {
                qname: QualifiedName::main("idx_t"),
                table: "t".into(),
            })
            .unwrap();
        schema
            .create_trigger(Trigger {
                qname: QualifiedName::main("trg_t"),
                target_table: "t".into(),
                used_tables: AHashSet::new(),
            })
            .unwrap();

        schema.drop_table(None, "t").unwrap();
        assert_eq!(schema.indexes().count(), 0);
        assert_eq!(schema.triggers().count(), 0);
    }

    #[test]
    fn test_rename_table_updates_dependents() {
        let mut schema = Schema::new();
        schema.create_table(table("t", &["a"])).unwrap();
        schema
            .create_index(Index {
                qname: QualifiedName::main("idx_t"),
                table: "t".into(),
            })
            .unwrap();
        schema.rename_table(None, "t", "u").unwrap();
        assert!(schema.table(None, "u").is_some());
        assert!(schema.table(None, "t").is_none());
        assert_eq!(schema.indexes().next().unwrap().table.as_str(), "u");
    }

    #[test]
    fn test_column_rename_preserves_order() {
        let mut columns: Columns = ["a", "b", "c"]
            .into_iter()
            .map(|name| Column::new(name, Type::integer()))
            .collect();
        assert!(columns.rename("b", "middle"));
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "middle", "c"]);
    }
}
