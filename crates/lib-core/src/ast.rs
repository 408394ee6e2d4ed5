pub mod expr;
pub mod stmt;

use smol_str::SmolStr;

use crate::tokens::Location;

/// Stable identifier for a syntax node, allocated by the parser from a
/// monotone counter. Node ids are non-zero and unique within one compilation
/// unit; passes use them as keys into side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl nohash_hasher::IsEnabled for NodeId {}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An identifier with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub value: SmolStr,
    pub location: Location,
}

impl Ident {
    pub fn new(value: impl Into<SmolStr>, location: Location) -> Self {
        Self {
            value: value.into(),
            location,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

/// A possibly schema-qualified object name (`foo`, `main.foo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<Ident>,
    pub name: Ident,
}

impl QualifiedName {
    pub fn unqualified(name: Ident) -> Self {
        Self { schema: None, name }
    }

    pub fn location(&self) -> Location {
        match &self.schema {
            Some(schema) => schema.location.spanning(self.name.location),
            None => self.name.location,
        }
    }
}

/// A declared SQL type, e.g. `INTEGER`, `VARCHAR(30)`, or the host-facing
/// `INTEGER AS Bool USING bool_adapter` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub name: Ident,
    /// Host-visible rename, from the `AS Label [USING adapter]` suffix.
    pub alias: Option<TypeAlias>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAlias {
    pub label: Ident,
    pub adapter: Option<Ident>,
    /// Span of the whole suffix, removed by sanitization.
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}
