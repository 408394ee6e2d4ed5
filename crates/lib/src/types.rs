use std::fmt::Display;

use nohash_hasher::IntMap;
use smol_str::SmolStr;
use squill_lib_core::helpers::IndexMap;

/// Nominal type names the checker produces itself. Declared column types are
/// canonicalized onto these; `CAST` keeps whatever the user spelled.
pub mod nominal {
    pub const INTEGER: &str = "INTEGER";
    pub const INT: &str = "INT";
    pub const REAL: &str = "REAL";
    pub const TEXT: &str = "TEXT";
    pub const BLOB: &str = "BLOB";
    pub const ANY: &str = "ANY";
}

/// The kind of a type variable constrains admissible solutions and supplies
/// the default when a variable is never solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    General,
    Integer,
    Float,
}

impl Kind {
    /// The concrete type an unsolved variable of this kind collapses to.
    pub fn default_type(self) -> Type {
        match self {
            Kind::General => Type::any(),
            Kind::Integer => Type::integer(),
            Kind::Float => Type::real(),
        }
    }

    /// Whether a concrete nominal is an acceptable solution under this kind.
    pub fn admits(self, name: &str) -> bool {
        match self {
            Kind::General => true,
            Kind::Integer | Kind::Float => {
                matches!(name, nominal::INT | nominal::INTEGER | nominal::REAL)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeVariable {
    pub id: u32,
    pub kind: Kind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A SQL type name such as `INTEGER`, `TEXT`, `BLOB`, `REAL`, `ANY`.
    Nominal(SmolStr),
    /// A placeholder awaiting a solution.
    Var(TypeVariable),
    /// An operator or function signature.
    Fn { params: Vec<Type>, ret: Box<Type> },
    Row(Row),
    /// Nullability.
    Optional(Box<Type>),
    /// A host-visible rename, e.g. `INTEGER AS Bool USING adapter`.
    /// Unification pierces aliases.
    Alias {
        inner: Box<Type>,
        label: SmolStr,
        adapter: Option<SmolStr>,
    },
    /// Sink for expressions that already produced a diagnostic; absorbs
    /// further unification silently.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Fixed(Vec<Type>),
    Named(IndexMap<SmolStr, Type>),
    /// A homogeneous variadic row, used for `IN`-style operands.
    Unknown(Box<Type>),
}

impl Row {
    pub fn len(&self) -> Option<usize> {
        match self {
            Row::Fixed(types) => Some(types.len()),
            Row::Named(columns) => Some(columns.len()),
            Row::Unknown(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// The element types, in order. `Unknown` rows yield their single
    /// element type.
    pub fn elements(&self) -> Vec<&Type> {
        match self {
            Row::Fixed(types) => types.iter().collect(),
            Row::Named(columns) => columns.values().collect(),
            Row::Unknown(inner) => vec![inner],
        }
    }
}

impl Type {
    pub fn integer() -> Type {
        Type::Nominal(SmolStr::new_static(nominal::INTEGER))
    }

    pub fn real() -> Type {
        Type::Nominal(SmolStr::new_static(nominal::REAL))
    }

    pub fn text() -> Type {
        Type::Nominal(SmolStr::new_static(nominal::TEXT))
    }

    pub fn blob() -> Type {
        Type::Nominal(SmolStr::new_static(nominal::BLOB))
    }

    pub fn any() -> Type {
        Type::Nominal(SmolStr::new_static(nominal::ANY))
    }

    /// Wrap in `Optional`, collapsing nested optionals. `Error` stays bare.
    pub fn optional(inner: Type) -> Type {
        match inner {
            Type::Optional(_) | Type::Error => inner,
            _ => Type::Optional(Box::new(inner)),
        }
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Fn {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Type::Var(_))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    /// Peel `Alias` and `Optional` wrappers down to the underlying type.
    pub fn root(&self) -> &Type {
        match self {
            Type::Optional(inner) => inner.root(),
            Type::Alias { inner, .. } => inner.root(),
            _ => self,
        }
    }

    /// The nominal name at the root, if there is one.
    pub fn nominal_name(&self) -> Option<&str> {
        match self.root() {
            Type::Nominal(name) => Some(name),
            _ => None,
        }
    }

    /// Whether a solved type contains any remaining variable.
    pub fn contains_var(&self) -> bool {
        match self {
            Type::Var(_) => true,
            Type::Nominal(_) | Type::Error => false,
            Type::Fn { params, ret } => params.iter().any(Type::contains_var) || ret.contains_var(),
            Type::Optional(inner) => inner.contains_var(),
            Type::Alias { inner, .. } => inner.contains_var(),
            Type::Row(Row::Fixed(types)) => types.iter().any(Type::contains_var),
            Type::Row(Row::Named(columns)) => columns.values().any(Type::contains_var),
            Type::Row(Row::Unknown(inner)) => inner.contains_var(),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Nominal(name) => write!(f, "{name}"),
            Type::Var(var) => write!(f, "t{}", var.id),
            Type::Fn { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::Row(Row::Fixed(types)) => {
                write!(f, "(")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Type::Row(Row::Named(columns)) => {
                write!(f, "(")?;
                for (i, (name, ty)) in columns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} {ty}")?;
                }
                write!(f, ")")
            }
            Type::Row(Row::Unknown(inner)) => write!(f, "({inner}, ...)"),
            Type::Optional(inner) => write!(f, "{inner}?"),
            Type::Alias { inner, label, .. } => write!(f, "{inner} AS {label}"),
            Type::Error => write!(f, "<error>"),
        }
    }
}

/// A substitution from type variables to types, applied structurally.
///
/// Insertion refuses to overwrite an existing mapping; combined with applying
/// the substitution to both sides before unifying, this keeps the mapping
/// acyclic so `apply` terminates.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    map: IntMap<u32, Type>,
}

impl Substitution {
    pub fn get(&self, var: &TypeVariable) -> Option<&Type> {
        self.map.get(&var.id)
    }

    pub fn insert(&mut self, var: TypeVariable, ty: Type) {
        debug_assert!(
            !self.map.contains_key(&var.id),
            "variable t{} is already solved",
            var.id
        );
        self.map.insert(var.id, ty);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Resolve `ty` under this substitution. Mapped variables are resolved
    /// recursively, so the result never mentions a solved variable.
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(var) => match self.map.get(&var.id) {
                Some(solved) => self.apply(solved),
                None => Type::Var(*var),
            },
            Type::Nominal(name) => Type::Nominal(name.clone()),
            Type::Fn { params, ret } => Type::Fn {
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(ret)),
            },
            Type::Row(Row::Fixed(types)) => {
                Type::Row(Row::Fixed(types.iter().map(|t| self.apply(t)).collect()))
            }
            Type::Row(Row::Named(columns)) => Type::Row(Row::Named(
                columns
                    .iter()
                    .map(|(name, t)| (name.clone(), self.apply(t)))
                    .collect(),
            )),
            Type::Row(Row::Unknown(inner)) => {
                Type::Row(Row::Unknown(Box::new(self.apply(inner))))
            }
            Type::Optional(inner) => Type::optional(self.apply(inner)),
            Type::Alias {
                inner,
                label,
                adapter,
            } => Type::Alias {
                inner: Box::new(self.apply(inner)),
                label: label.clone(),
                adapter: adapter.clone(),
            },
            Type::Error => Type::Error,
        }
    }
}

/// A universally quantified type; models polymorphic operators and builtins.
#[derive(Debug, Clone)]
pub struct TypeScheme {
    pub quantified: Vec<TypeVariable>,
    pub body: Type,
    pub variadic: bool,
}

impl TypeScheme {
    pub fn new(quantified: Vec<TypeVariable>, body: Type) -> Self {
        Self {
            quantified,
            body,
            variadic: false,
        }
    }

    /// A scheme with no quantified variables.
    pub fn mono(body: Type) -> Self {
        Self::new(Vec::new(), body)
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Substitute every quantified variable with a fresh one.
    ///
    /// For variadic function schemes, `preferred_args` adjusts the parameter
    /// list: the last parameter is repeated to grow, and trailing parameters
    /// are dropped to shrink, so optional trailing arguments type-check.
    pub fn instantiate(
        &self,
        mut fresh: impl FnMut(Kind) -> TypeVariable,
        preferred_args: Option<usize>,
    ) -> Type {
        let mut substitution = Substitution::default();
        for quantified in &self.quantified {
            substitution.insert(*quantified, Type::Var(fresh(quantified.kind)));
        }
        let body = substitution.apply(&self.body);

        if !self.variadic {
            return body;
        }
        let Some(n) = preferred_args else {
            return body;
        };
        let Type::Fn { mut params, ret } = body else {
            return body;
        };
        if params.len() < n {
            let last = params.last().cloned().unwrap_or(Type::any());
            params.resize(n, last);
        } else {
            params.truncate(n);
        }
        Type::Fn { params, ret }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn var(id: u32, kind: Kind) -> TypeVariable {
        TypeVariable { id, kind }
    }

    #[test]
    fn test_kind_ordering_and_defaults() {
        assert!(Kind::General < Kind::Integer);
        assert!(Kind::Integer < Kind::Float);
        assert_eq!(Kind::General.default_type(), Type::any());
        assert_eq!(Kind::Integer.default_type(), Type::integer());
        assert_eq!(Kind::Float.default_type(), Type::real());
    }

    #[test]
    fn test_optional_collapses() {
        let once = Type::optional(Type::integer());
        let twice = Type::optional(once.clone());
        assert_eq!(once, twice);
        assert_eq!(Type::optional(Type::Error), Type::Error);
    }

    #[test]
    fn test_root_pierces_alias_and_optional() {
        let ty = Type::optional(Type::Alias {
            inner: Box::new(Type::integer()),
            label: "Bool".into(),
            adapter: None,
        });
        assert_eq!(ty.nominal_name(), Some("INTEGER"));
    }

    #[test]
    fn test_substitution_apply_is_recursive() {
        let a = var(0, Kind::General);
        let b = var(1, Kind::General);
        let mut substitution = Substitution::default();
        substitution.insert(a, Type::Var(b));
        substitution.insert(b, Type::text());
        assert_eq!(substitution.apply(&Type::Var(a)), Type::text());
        assert_eq!(
            substitution.apply(&Type::optional(Type::Var(a))),
            Type::optional(Type::text())
        );
    }

    #[test]
    fn test_scheme_instantiation_freshens_variables() {
        let a = var(0, Kind::Integer);
        let scheme = TypeScheme::new(
            vec![a],
            Type::function(vec![Type::Var(a), Type::Var(a)], Type::Var(a)),
        );
        let mut next = 100;
        let ty = scheme.instantiate(
            |kind| {
                next += 1;
                var(next, kind)
            },
            None,
        );
        let Type::Fn { params, ret } = ty else {
            panic!();
        };
        assert_eq!(params[0], params[1]);
        assert_eq!(params[0], *ret);
        assert_eq!(params[0], Type::Var(var(101, Kind::Integer)));
    }

    #[test]
    fn test_variadic_instantiation_grows_and_shrinks() {
        let a = var(0, Kind::General);
        let scheme = TypeScheme::new(
            vec![a],
            Type::function(vec![Type::text(), Type::Var(a)], Type::text()),
        )
        .variadic();

        let mut next = 0;
        let mut fresh = |kind| {
            next += 1;
            var(next, kind)
        };

        let grown = scheme.instantiate(&mut fresh, Some(4));
        let Type::Fn { params, .. } = grown else {
            panic!();
        };
        assert_eq!(params.len(), 4);
        assert_eq!(params[1], params[3]);

        let shrunk = scheme.instantiate(&mut fresh, Some(1));
        let Type::Fn { params, .. } = shrunk else {
            panic!();
        };
        assert_eq!(params, vec![Type::text()]);
    }
}
