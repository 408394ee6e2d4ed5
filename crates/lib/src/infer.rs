use nohash_hasher::IntMap;
use squill_lib_core::ast::NodeId;
use squill_lib_core::errors::Diagnostic;
use squill_lib_core::tokens::Location;

use crate::types::{nominal, Kind, Row, Substitution, Type, TypeScheme, TypeVariable};

/// Mutable state threaded through type checking one statement.
///
/// Owns the substitution, the per-node type table, bind-parameter
/// de-duplication, and the diagnostics produced while checking.
#[derive(Debug, Default)]
pub struct InferenceState {
    next_var: u32,
    substitution: Substitution,
    node_types: IntMap<NodeId, Type>,
    /// Bind index to the node that first mentioned it; later occurrences
    /// reuse the first occurrence's type.
    param_first_node: IntMap<u32, NodeId>,
    param_locations: IntMap<u32, Vec<Location>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl InferenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_type_variable(&mut self, kind: Kind) -> TypeVariable {
        let id = self.next_var;
        self.next_var += 1;
        TypeVariable { id, kind }
    }

    pub fn fresh_var(&mut self, kind: Kind) -> Type {
        Type::Var(self.fresh_type_variable(kind))
    }

    /// A fresh variable recorded as the type of `node`.
    pub fn fresh_var_for(&mut self, node: NodeId, kind: Kind) -> Type {
        let ty = self.fresh_var(kind);
        self.record(node, ty.clone());
        ty
    }

    /// The type for a bind parameter occurrence, honoring de-duplication:
    /// the second occurrence of `:x` gets whatever the first one has.
    pub fn fresh_var_for_param(&mut self, index: u32, node: NodeId, location: Location) -> Type {
        self.param_locations.entry(index).or_default().push(location);
        if let Some(first) = self.param_first_node.get(&index) {
            let ty = self
                .node_types
                .get(first)
                .cloned()
                .unwrap_or(Type::Error);
            self.record(node, ty.clone());
            return ty;
        }
        self.param_first_node.insert(index, node);
        self.fresh_var_for(node, Kind::General)
    }

    pub fn record(&mut self, node: NodeId, ty: Type) {
        self.node_types.insert(node, ty);
    }

    /// A nominal type recorded on `node`.
    pub fn nominal_of(&mut self, name: impl Into<smol_str::SmolStr>, node: NodeId) -> Type {
        let ty = Type::Nominal(name.into());
        self.record(node, ty.clone());
        ty
    }

    /// The error sink, recorded on `node`. Used after a diagnostic has
    /// already been emitted.
    pub fn error_type_for(&mut self, node: NodeId) -> Type {
        self.record(node, Type::Error);
        Type::Error
    }

    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.node_types.get(&node)
    }

    /// Resolve a type under the current substitution.
    pub fn solution(&self, ty: &Type) -> Type {
        self.substitution.apply(ty)
    }

    /// Resolve a type; any variable still unsolved collapses to its kind
    /// default, recursively through optionals, aliases and rows.
    pub fn solution_or_default(&self, ty: &Type) -> Type {
        default_unsolved(self.substitution.apply(ty))
    }

    pub fn instantiate(&mut self, scheme: &TypeScheme, preferred_args: Option<usize>) -> Type {
        scheme.instantiate(|kind| self.fresh_type_variable(kind), preferred_args)
    }

    /// Every bind parameter seen so far: `(index, solved type, locations)`,
    /// ordered by index.
    pub fn parameter_solutions(&self, default_if_var: bool) -> Vec<(u32, Type, Vec<Location>)> {
        let mut indices: Vec<u32> = self.param_first_node.keys().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|index| {
                let node = self.param_first_node[&index];
                let ty = self.node_types.get(&node).cloned().unwrap_or(Type::Error);
                let ty = if default_if_var {
                    self.solution_or_default(&ty)
                } else {
                    self.solution(&ty)
                };
                let locations = self.param_locations.get(&index).cloned().unwrap_or_default();
                (index, ty, locations)
            })
            .collect()
    }

    // -- unification -------------------------------------------------------

    /// Equate two types, updating the substitution. Emits a diagnostic on
    /// failure; `Error` on either side absorbs silently.
    pub fn unify(&mut self, a: &Type, b: &Type, location: Location) {
        if !self.try_unify(a, b, location) {
            let a = self.solution(a);
            let b = self.solution(b);
            self.diagnostics.push(Diagnostic::error(
                format!("unable to unify {a} with {b}"),
                location,
            ));
        }
    }

    /// Like [`unify`](Self::unify) but leaves the failure diagnostic to the
    /// caller. Successful branches still update the substitution.
    pub fn unify_quiet(&mut self, a: &Type, b: &Type, location: Location) -> bool {
        self.try_unify(a, b, location)
    }

    fn try_unify(&mut self, a: &Type, b: &Type, location: Location) -> bool {
        let a = self.substitution.apply(a);
        let b = self.substitution.apply(b);

        if a == b {
            return true;
        }
        if a.is_error() || b.is_error() {
            // A prior diagnostic stands.
            return true;
        }

        match (&a, &b) {
            (Type::Var(v), Type::Var(w)) => {
                // The lower-kinded variable points at the higher-kinded one.
                if v.kind <= w.kind {
                    self.substitution.insert(*v, Type::Var(*w));
                } else {
                    self.substitution.insert(*w, Type::Var(*v));
                }
                true
            }
            (Type::Optional(x), Type::Optional(y)) => {
                let (x, y) = (x.as_ref().clone(), y.as_ref().clone());
                self.try_unify(&x, &y, location)
            }
            (Type::Var(v), Type::Optional(inner)) | (Type::Optional(inner), Type::Var(v))
                if inner.is_var() =>
            {
                let Type::Var(w) = inner.as_ref() else {
                    unreachable!();
                };
                if v.id == w.id {
                    // Equating a variable with an optional of itself would
                    // make the substitution cyclic; accept without solving.
                    return true;
                }
                if w.kind >= v.kind {
                    self.substitution
                        .insert(*v, Type::optional(Type::Var(*w)));
                } else {
                    let merged = self.fresh_type_variable(v.kind);
                    self.substitution.insert(*w, Type::Var(merged));
                    self.substitution
                        .insert(*v, Type::optional(Type::Var(merged)));
                }
                true
            }
            (Type::Optional(inner), concrete) | (concrete, Type::Optional(inner))
                if inner.is_var() && !concrete.is_var() =>
            {
                let Type::Var(v) = inner.as_ref() else {
                    unreachable!();
                };
                if !self.admissible(*v, concrete) {
                    return false;
                }
                self.substitution
                    .insert(*v, Type::optional((*concrete).clone()));
                true
            }
            (Type::Var(v), concrete) | (concrete, Type::Var(v)) => {
                if !self.admissible(*v, concrete) {
                    return false;
                }
                self.substitution.insert(*v, (*concrete).clone());
                true
            }
            (
                Type::Fn {
                    params: params_a,
                    ret: ret_a,
                },
                Type::Fn {
                    params: params_b,
                    ret: ret_b,
                },
            ) if params_a.len() == params_b.len() => {
                let pairs: Vec<_> = params_a
                    .iter()
                    .cloned()
                    .zip(params_b.iter().cloned())
                    .collect();
                let mut ok = true;
                for (x, y) in pairs {
                    ok &= self.try_unify(&x, &y, location);
                }
                let (ret_a, ret_b) = (ret_a.as_ref().clone(), ret_b.as_ref().clone());
                ok & self.try_unify(&ret_a, &ret_b, location)
            }
            (Type::Row(row), other) | (other, Type::Row(row)) => {
                self.unify_row(row.clone(), other.clone(), location)
            }
            (Type::Alias { inner, .. }, other) | (other, Type::Alias { inner, .. }) => {
                let (inner, other) = (inner.as_ref().clone(), other.clone());
                self.try_unify(&inner, &other, location)
            }
            _ => self.roots_compatible(&a, &b),
        }
    }

    fn unify_row(&mut self, row: Row, other: Type, location: Location) -> bool {
        match (&row, &other) {
            // An unknown row spreads its element over the other row.
            (Row::Unknown(elem), Type::Row(other_row)) => {
                let elem = elem.as_ref().clone();
                let elements: Vec<Type> = other_row.elements().into_iter().cloned().collect();
                let mut ok = true;
                for ty in elements {
                    ok &= self.try_unify(&elem, &ty, location);
                }
                ok
            }
            (_, Type::Row(Row::Unknown(elem))) => {
                let elem = elem.as_ref().clone();
                let elements: Vec<Type> = row.elements().into_iter().cloned().collect();
                let mut ok = true;
                for ty in elements {
                    ok &= self.try_unify(&ty, &elem, location);
                }
                ok
            }
            (_, Type::Row(other_row)) => {
                if row.len() != other_row.len() {
                    return false;
                }
                let lhs: Vec<Type> = row.elements().into_iter().cloned().collect();
                let rhs: Vec<Type> = other_row.elements().into_iter().cloned().collect();
                let mut ok = true;
                for (x, y) in lhs.into_iter().zip(rhs) {
                    ok &= self.try_unify(&x, &y, location);
                }
                ok
            }
            // A single-element row behaves as its element against non-rows.
            _ => {
                if row.len() == Some(1) {
                    let elem = row.elements()[0].clone();
                    self.try_unify(&elem, &other, location)
                } else {
                    false
                }
            }
        }
    }

    /// Kind admissibility for solving a variable with a concrete type,
    /// piercing `Optional` and `Alias`.
    fn admissible(&self, var: TypeVariable, concrete: &Type) -> bool {
        match var.kind {
            Kind::General => true,
            Kind::Integer | Kind::Float => match concrete.root() {
                Type::Nominal(name) => var.kind.admits(name),
                // Unsolved structure is fine; later unification narrows it.
                Type::Var(_) => true,
                _ => false,
            },
        }
    }

    /// Nominal compatibility after peeling `Alias` and `Optional`: identical
    /// names, `INTEGER`~`REAL`, `TEXT`~`BLOB`, and `ANY` with anything.
    fn roots_compatible(&self, a: &Type, b: &Type) -> bool {
        let (Some(a), Some(b)) = (a.nominal_name(), b.nominal_name()) else {
            return false;
        };
        if a == b || a == nominal::ANY || b == nominal::ANY {
            return true;
        }
        let numeric = |n: &str| matches!(n, nominal::INT | nominal::INTEGER | nominal::REAL);
        if numeric(a) && numeric(b) {
            return true;
        }
        matches!(
            (a, b),
            (nominal::TEXT, nominal::BLOB) | (nominal::BLOB, nominal::TEXT)
        )
    }
}

fn default_unsolved(ty: Type) -> Type {
    match ty {
        Type::Var(var) => var.kind.default_type(),
        Type::Optional(inner) => Type::optional(default_unsolved(*inner)),
        Type::Alias {
            inner,
            label,
            adapter,
        } => Type::Alias {
            inner: Box::new(default_unsolved(*inner)),
            label,
            adapter,
        },
        Type::Row(Row::Fixed(types)) => {
            Type::Row(Row::Fixed(types.into_iter().map(default_unsolved).collect()))
        }
        Type::Row(Row::Named(columns)) => Type::Row(Row::Named(
            columns
                .into_iter()
                .map(|(name, ty)| (name, default_unsolved(ty)))
                .collect(),
        )),
        Type::Row(Row::Unknown(inner)) => Type::Row(Row::Unknown(Box::new(default_unsolved(*inner)))),
        Type::Fn { params, ret } => Type::Fn {
            params: params.into_iter().map(default_unsolved).collect(),
            ret: Box::new(default_unsolved(*ret)),
        },
        Type::Nominal(_) | Type::Error => ty,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn loc() -> Location {
        Location::default()
    }

    #[test]
    fn test_unify_var_with_concrete() {
        let mut state = InferenceState::new();
        let a = state.fresh_var(Kind::General);
        state.unify(&a, &Type::text(), loc());
        assert_eq!(state.diagnostics, vec![]);
        assert_eq!(state.solution(&a), Type::text());
    }

    #[test]
    fn test_unify_kind_admissibility() {
        let mut state = InferenceState::new();
        let a = state.fresh_var(Kind::Integer);
        state.unify(&a, &Type::text(), loc());
        assert_eq!(state.diagnostics.len(), 1);
        assert!(state.diagnostics[0].message.contains("unable to unify"));
    }

    #[test]
    fn test_unify_kind_promotion() {
        let mut state = InferenceState::new();
        let general = state.fresh_var(Kind::General);
        let float = state.fresh_var(Kind::Float);
        state.unify(&general, &float, loc());
        assert_eq!(state.diagnostics, vec![]);
        // The general variable defers to the float-kinded one.
        assert_eq!(state.solution_or_default(&general), Type::real());
    }

    #[test]
    fn test_unify_integer_with_real_without_substitution() {
        let mut state = InferenceState::new();
        state.unify(&Type::integer(), &Type::real(), loc());
        state.unify(&Type::text(), &Type::blob(), loc());
        state.unify(&Type::any(), &Type::text(), loc());
        assert_eq!(state.diagnostics, vec![]);
    }

    #[test]
    fn test_unify_text_with_integer_fails() {
        let mut state = InferenceState::new();
        state.unify(&Type::text(), &Type::integer(), loc());
        assert_eq!(state.diagnostics.len(), 1);
    }

    #[test]
    fn test_error_absorbs_silently() {
        let mut state = InferenceState::new();
        state.unify(&Type::Error, &Type::text(), loc());
        state.unify(&Type::integer(), &Type::Error, loc());
        assert_eq!(state.diagnostics, vec![]);
    }

    #[test]
    fn test_unify_var_with_optional_concrete() {
        let mut state = InferenceState::new();
        let a = state.fresh_var(Kind::General);
        state.unify(&a, &Type::optional(Type::integer()), loc());
        assert_eq!(state.diagnostics, vec![]);
        assert_eq!(state.solution(&a), Type::optional(Type::integer()));
    }

    #[test]
    fn test_unify_optional_var_with_concrete() {
        let mut state = InferenceState::new();
        let inner = state.fresh_var(Kind::General);
        let optional = Type::optional(inner.clone());
        state.unify(&optional, &Type::integer(), loc());
        assert_eq!(state.diagnostics, vec![]);
        assert_eq!(state.solution(&inner), Type::optional(Type::integer()));
        assert_eq!(state.solution(&optional), Type::optional(Type::integer()));
    }

    #[test]
    fn test_unify_alias_pierces() {
        let mut state = InferenceState::new();
        let alias = Type::Alias {
            inner: Box::new(Type::integer()),
            label: "Bool".into(),
            adapter: None,
        };
        state.unify(&alias, &Type::integer(), loc());
        assert_eq!(state.diagnostics, vec![]);
    }

    #[test]
    fn test_unify_unknown_row_spreads() {
        let mut state = InferenceState::new();
        let elem = state.fresh_var(Kind::General);
        let unknown = Type::Row(Row::Unknown(Box::new(elem.clone())));
        let fixed = Type::Row(Row::Fixed(vec![
            Type::integer(),
            Type::integer(),
            Type::integer(),
        ]));
        state.unify(&unknown, &fixed, loc());
        assert_eq!(state.diagnostics, vec![]);
        assert_eq!(state.solution(&elem), Type::integer());
    }

    #[test]
    fn test_unify_single_element_row_with_scalar() {
        let mut state = InferenceState::new();
        let row = Type::Row(Row::Fixed(vec![Type::integer()]));
        state.unify(&row, &Type::integer(), loc());
        assert_eq!(state.diagnostics, vec![]);
    }

    #[test]
    fn test_unify_row_length_mismatch_fails() {
        let mut state = InferenceState::new();
        let two = Type::Row(Row::Fixed(vec![Type::integer(), Type::text()]));
        let three = Type::Row(Row::Fixed(vec![
            Type::integer(),
            Type::text(),
            Type::text(),
        ]));
        state.unify(&two, &three, loc());
        assert_eq!(state.diagnostics.len(), 1);
    }

    #[test]
    fn test_solution_or_default_is_idempotent_and_var_free() {
        let mut state = InferenceState::new();
        let a = state.fresh_var(Kind::Integer);
        let b = state.fresh_var(Kind::General);
        let ty = Type::optional(Type::Row(Row::Fixed(vec![a, b])));
        let solved = state.solution_or_default(&ty);
        assert!(!solved.contains_var());
        assert_eq!(state.solution_or_default(&solved), solved);
        assert_eq!(
            solved,
            Type::optional(Type::Row(Row::Fixed(vec![Type::integer(), Type::any()])))
        );
    }

    #[test]
    fn test_param_deduplication() {
        let mut state = InferenceState::new();
        let first = state.fresh_var_for_param(1, NodeId(10), loc());
        let second = state.fresh_var_for_param(1, NodeId(20), loc());
        assert_eq!(first, second);
        state.unify(&first, &Type::text(), loc());
        let params = state.parameter_solutions(true);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, 1);
        assert_eq!(params[0].1, Type::text());
        assert_eq!(params[0].2.len(), 2);
    }

    #[test]
    fn test_function_unification() {
        let mut state = InferenceState::new();
        let result = state.fresh_var(Kind::General);
        let call = Type::function(vec![Type::integer(), Type::integer()], result.clone());
        let scheme_ty = Type::function(vec![Type::integer(), Type::integer()], Type::integer());
        state.unify(&scheme_ty, &call, loc());
        assert_eq!(state.diagnostics, vec![]);
        assert_eq!(state.solution(&result), Type::integer());
    }
}
