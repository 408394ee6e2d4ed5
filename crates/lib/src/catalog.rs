use std::sync::LazyLock;

use ahash::AHashMap;
use smol_str::SmolStr;
use squill_lib_core::ast::expr::{FunctionArgs, FunctionExpr, InfixOp, Literal, PostfixOp, PrefixOp};
use squill_lib_core::ast::expr::Expr;
use squill_lib_core::errors::{Diagnostic, Suggestion};

use crate::types::{Kind, Type, TypeScheme, TypeVariable};

/// An advisory hook run after a builtin call type-checks; may push
/// warning-level diagnostics.
pub type CheckFn = fn(&FunctionExpr, &mut Vec<Diagnostic>);

pub struct Builtin {
    pub scheme: TypeScheme,
    pub check: Option<CheckFn>,
    /// Whether the `f(*)` argument form is accepted (`count(*)`).
    pub accepts_star: bool,
}

/// Immutable operator and builtin-function tables, built once at startup.
/// Environments borrow this rather than copying it.
pub struct Catalog {
    prefix: AHashMap<PrefixOp, TypeScheme>,
    infix: AHashMap<InfixOp, TypeScheme>,
    postfix_null_test: TypeScheme,
    postfix_collate: TypeScheme,
    between: TypeScheme,
    functions: AHashMap<SmolStr, Builtin>,
}

impl Catalog {
    pub fn global() -> &'static Catalog {
        static CATALOG: LazyLock<Catalog> = LazyLock::new(Catalog::build);
        &CATALOG
    }

    pub fn prefix(&self, op: PrefixOp) -> &TypeScheme {
        &self.prefix[&op]
    }

    pub fn infix(&self, op: InfixOp) -> &TypeScheme {
        &self.infix[&op]
    }

    pub fn postfix(&self, op: &PostfixOp) -> &TypeScheme {
        match op {
            PostfixOp::IsNull | PostfixOp::NotNull => &self.postfix_null_test,
            PostfixOp::Collate(_) => &self.postfix_collate,
        }
    }

    pub fn between(&self) -> &TypeScheme {
        &self.between
    }

    /// Case-insensitive builtin lookup.
    pub fn function(&self, name: &str) -> Option<&Builtin> {
        self.functions.get(&SmolStr::new(name.to_ascii_lowercase()))
    }

    fn build() -> Catalog {
        let mut prefix = AHashMap::new();
        // Unary plus, minus and tilde stay in the numeric kinds.
        for op in [PrefixOp::Plus, PrefixOp::Negate, PrefixOp::BitNot] {
            let a = var(0, Kind::Integer);
            prefix.insert(
                op,
                TypeScheme::new(
                    vec![a],
                    Type::function(vec![Type::Var(a)], Type::Var(a)),
                ),
            );
        }
        prefix.insert(
            PrefixOp::Not,
            TypeScheme::mono(Type::function(vec![Type::integer()], Type::integer())),
        );

        let mut infix = AHashMap::new();
        for op in [
            InfixOp::Add,
            InfixOp::Subtract,
            InfixOp::Multiply,
            InfixOp::Divide,
            InfixOp::Modulo,
        ] {
            let a = var(0, Kind::Integer);
            infix.insert(
                op,
                TypeScheme::new(
                    vec![a],
                    Type::function(vec![Type::Var(a), Type::Var(a)], Type::Var(a)),
                ),
            );
        }
        for op in [
            InfixOp::BitAnd,
            InfixOp::BitOr,
            InfixOp::ShiftLeft,
            InfixOp::ShiftRight,
        ] {
            infix.insert(
                op,
                TypeScheme::mono(Type::function(
                    vec![Type::integer(), Type::integer()],
                    Type::integer(),
                )),
            );
        }
        for op in [
            InfixOp::LessThan,
            InfixOp::LessEquals,
            InfixOp::GreaterThan,
            InfixOp::GreaterEquals,
            InfixOp::Equals,
            InfixOp::NotEquals,
            InfixOp::Is,
            InfixOp::IsNot,
        ] {
            let a = var(0, Kind::General);
            infix.insert(
                op,
                TypeScheme::new(
                    vec![a],
                    Type::function(vec![Type::Var(a), Type::Var(a)], Type::integer()),
                ),
            );
        }
        for op in [
            InfixOp::Like,
            InfixOp::NotLike,
            InfixOp::Glob,
            InfixOp::NotGlob,
            InfixOp::Regexp,
            InfixOp::NotRegexp,
            InfixOp::Match,
            InfixOp::NotMatch,
        ] {
            infix.insert(
                op,
                TypeScheme::mono(Type::function(
                    vec![Type::text(), Type::text()],
                    Type::integer(),
                )),
            );
        }
        for op in [InfixOp::And, InfixOp::Or] {
            infix.insert(
                op,
                TypeScheme::mono(Type::function(
                    vec![Type::integer(), Type::integer()],
                    Type::integer(),
                )),
            );
        }
        {
            let (a, b) = (var(0, Kind::General), var(1, Kind::General));
            infix.insert(
                InfixOp::Concat,
                TypeScheme::new(
                    vec![a, b],
                    Type::function(vec![Type::Var(a), Type::Var(b)], Type::text()),
                ),
            );
            infix.insert(
                InfixOp::Extract,
                TypeScheme::new(
                    vec![a, b],
                    Type::function(
                        vec![Type::Var(a), Type::Var(b)],
                        Type::optional(Type::text()),
                    ),
                ),
            );
            infix.insert(
                InfixOp::ExtractText,
                TypeScheme::new(
                    vec![a, b],
                    Type::function(
                        vec![Type::Var(a), Type::Var(b)],
                        Type::optional(Type::any()),
                    ),
                ),
            );
        }
        for op in [InfixOp::In, InfixOp::NotIn] {
            let a = var(0, Kind::General);
            infix.insert(
                op,
                TypeScheme::new(
                    vec![a],
                    Type::function(
                        vec![
                            Type::Var(a),
                            Type::Row(crate::types::Row::Unknown(Box::new(Type::Var(a)))),
                        ],
                        Type::integer(),
                    ),
                ),
            );
        }

        let postfix_null_test = {
            let a = var(0, Kind::General);
            TypeScheme::new(
                vec![a],
                Type::function(vec![Type::Var(a)], Type::integer()),
            )
        };
        let postfix_collate = {
            let a = var(0, Kind::General);
            TypeScheme::new(vec![a], Type::function(vec![Type::Var(a)], Type::Var(a)))
        };
        let between = {
            let a = var(0, Kind::General);
            TypeScheme::new(
                vec![a],
                Type::function(
                    vec![Type::Var(a), Type::Var(a), Type::Var(a)],
                    Type::integer(),
                ),
            )
        };

        Catalog {
            prefix,
            infix,
            postfix_null_test,
            postfix_collate,
            between,
            functions: builtin_functions(),
        }
    }
}

fn var(id: u32, kind: Kind) -> TypeVariable {
    TypeVariable { id, kind }
}

struct Registry {
    functions: AHashMap<SmolStr, Builtin>,
}

impl Registry {
    fn add(&mut self, name: &'static str, scheme: TypeScheme) -> &mut Builtin {
        self.functions.insert(
            SmolStr::new_static(name),
            Builtin {
                scheme,
                check: None,
                accepts_star: false,
            },
        );
        self.functions.get_mut(name).expect("just inserted")
    }

    /// `(params…) -> ret` with no quantified variables.
    fn mono(&mut self, name: &'static str, params: Vec<Type>, ret: Type) -> &mut Builtin {
        self.add(name, TypeScheme::mono(Type::function(params, ret)))
    }

    /// `∀a. build(a)` with the given kind for `a`.
    fn poly(
        &mut self,
        name: &'static str,
        kind: Kind,
        build: impl FnOnce(Type) -> (Vec<Type>, Type),
    ) -> &mut Builtin {
        let a = var(0, kind);
        let (params, ret) = build(Type::Var(a));
        self.add(name, TypeScheme::new(vec![a], Type::function(params, ret)))
    }
}

fn builtin_functions() -> AHashMap<SmolStr, Builtin> {
    let mut registry = Registry {
        functions: AHashMap::new(),
    };
    let r = &mut registry;

    // Core scalar functions.
    r.poly("abs", Kind::Integer, |a| (vec![a.clone()], a));
    r.poly("length", Kind::General, |a| (vec![a], Type::integer()));
    r.poly("octet_length", Kind::General, |a| (vec![a], Type::integer()));
    r.mono("lower", vec![Type::text()], Type::text());
    r.mono("upper", vec![Type::text()], Type::text());
    for name in ["trim", "ltrim", "rtrim"] {
        let builtin = r.mono(name, vec![Type::text(), Type::text()], Type::text());
        builtin.scheme.variadic = true;
    }
    r.mono(
        "substr",
        vec![Type::text(), Type::integer(), Type::integer()],
        Type::text(),
    )
    .scheme
    .variadic = true;
    r.mono(
        "substring",
        vec![Type::text(), Type::integer(), Type::integer()],
        Type::text(),
    )
    .scheme
    .variadic = true;
    r.mono(
        "replace",
        vec![Type::text(), Type::text(), Type::text()],
        Type::text(),
    );
    r.mono("instr", vec![Type::text(), Type::text()], Type::integer());
    r.poly("hex", Kind::General, |a| (vec![a], Type::text()));
    r.mono("unhex", vec![Type::text(), Type::text()], Type::optional(Type::blob()))
        .scheme
        .variadic = true;
    r.poly("quote", Kind::General, |a| (vec![a], Type::text()));
    r.poly("typeof", Kind::General, |a| (vec![a], Type::text()));
    r.mono("unicode", vec![Type::text()], Type::integer());
    r.mono("char", vec![Type::integer(), Type::integer()], Type::text())
        .scheme
        .variadic = true;
    r.poly("round", Kind::Integer, |a| {
        (vec![a, Type::integer()], Type::real())
    })
    .scheme
    .variadic = true;
    r.poly("sign", Kind::Integer, |a| (vec![a], Type::integer()));
    r.mono("random", vec![], Type::integer());
    r.mono("randomblob", vec![Type::integer()], Type::blob());
    r.mono("zeroblob", vec![Type::integer()], Type::blob());
    r.poly("likely", Kind::General, |a| (vec![a.clone()], a));
    r.poly("unlikely", Kind::General, |a| (vec![a.clone()], a));
    r.poly("likelihood", Kind::General, |a| {
        (vec![a.clone(), Type::real()], a)
    });
    r.mono(
        "format",
        vec![Type::text(), Type::any()],
        Type::text(),
    )
    .scheme
    .variadic = true;
    r.mono(
        "printf",
        vec![Type::text(), Type::any()],
        Type::text(),
    )
    .scheme
    .variadic = true;
    r.mono("glob", vec![Type::text(), Type::text()], Type::integer());
    r.mono(
        "like",
        vec![Type::text(), Type::text(), Type::text()],
        Type::integer(),
    )
    .scheme
    .variadic = true;

    // Null handling.
    r.poly("coalesce", Kind::General, |a| {
        (vec![a.clone(), a.clone()], a)
    })
    .scheme
    .variadic = true;
    r.poly("ifnull", Kind::General, |a| (vec![a.clone(), a.clone()], a));
    r.poly("nullif", Kind::General, |a| {
        (vec![a.clone(), a.clone()], Type::optional(a))
    });
    r.poly("iif", Kind::General, |a| {
        (vec![Type::integer(), a.clone(), a.clone()], a)
    });

    // Aggregates. sum/avg/total take the integer kind so text is rejected
    // while both INTEGER and REAL flow through.
    r.poly("count", Kind::General, |a| (vec![a], Type::integer()))
        .accepts_star = true;
    r.poly("sum", Kind::Integer, |a| {
        (vec![a.clone()], Type::optional(a))
    });
    r.poly("avg", Kind::Integer, |a| {
        (vec![a], Type::optional(Type::real()))
    });
    r.poly("total", Kind::Integer, |a| (vec![a], Type::real()));
    r.poly("min", Kind::General, |a| (vec![a.clone(), a.clone()], a))
        .scheme
        .variadic = true;
    r.poly("max", Kind::General, |a| (vec![a.clone(), a.clone()], a))
        .scheme
        .variadic = true;
    r.poly("group_concat", Kind::General, |a| {
        (vec![a, Type::text()], Type::optional(Type::text()))
    })
    .scheme
    .variadic = true;
    r.poly("string_agg", Kind::General, |a| {
        (vec![a, Type::text()], Type::optional(Type::text()))
    });

    // Date and time.
    for name in ["date", "time", "datetime"] {
        let builtin = r.mono(name, vec![Type::text()], Type::text());
        builtin.scheme.variadic = true;
    }
    r.mono("julianday", vec![Type::text()], Type::real())
        .scheme
        .variadic = true;
    r.mono("unixepoch", vec![Type::text()], Type::integer())
        .scheme
        .variadic = true;
    let strftime = r.mono("strftime", vec![Type::text(), Type::text()], Type::text());
    strftime.scheme.variadic = true;
    strftime.check = Some(check_strftime);

    // Bookkeeping.
    r.mono("last_insert_rowid", vec![], Type::integer());
    r.mono("changes", vec![], Type::integer());
    r.mono("total_changes", vec![], Type::integer());
    r.mono("sqlite_version", vec![], Type::text());
    r.mono("sqlite_source_id", vec![], Type::text());

    // JSON.
    r.poly("json", Kind::General, |a| (vec![a], Type::text()));
    r.poly("json_extract", Kind::General, |a| {
        (vec![a, Type::text()], Type::optional(Type::any()))
    })
    .scheme
    .variadic = true;
    r.mono("json_array", vec![Type::any()], Type::text())
        .scheme
        .variadic = true;
    r.mono("json_object", vec![Type::any()], Type::text())
        .scheme
        .variadic = true;

    // Trigger-only control flow; RAISE(...) lowers to this.
    r.mono("raise", vec![Type::text()], Type::any()).scheme.variadic = true;

    registry.functions
}

/// `strftime('%s', …)` is better spelled `unixepoch(…)`, which also types as
/// INTEGER instead of TEXT.
fn check_strftime(function: &FunctionExpr, diagnostics: &mut Vec<Diagnostic>) {
    let FunctionArgs::List { args, .. } = &function.args else {
        return;
    };
    let Some(Expr::Literal(first)) = args.first() else {
        return;
    };
    if !matches!(&first.value, Literal::String(text) if text == "%s") {
        return;
    }

    let replace_end = match args.get(1) {
        Some(second) => second.location().start,
        None => function.location.end,
    };
    let replacement = if args.len() > 1 { "unixepoch(" } else { "unixepoch()" };
    diagnostics.push(
        Diagnostic::warning(
            "strftime('%s', ...) returns TEXT; use unixepoch() for an INTEGER timestamp",
            function.location,
        )
        .with_suggestion(Suggestion::Replace(
            function.location.start..replace_end,
            replacement.to_string(),
        )),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_lookup_is_case_insensitive() {
        let catalog = Catalog::global();
        assert!(catalog.function("COALESCE").is_some());
        assert!(catalog.function("coalesce").is_some());
        assert!(catalog.function("CoAlesce").is_some());
        assert!(catalog.function("no_such_function").is_none());
    }

    #[test]
    fn test_count_accepts_star() {
        let catalog = Catalog::global();
        assert!(catalog.function("count").unwrap().accepts_star);
        assert!(!catalog.function("sum").unwrap().accepts_star);
    }

    #[test]
    fn test_operator_tables_are_complete() {
        let catalog = Catalog::global();
        for op in [
            InfixOp::Concat,
            InfixOp::Extract,
            InfixOp::ExtractText,
            InfixOp::Multiply,
            InfixOp::Divide,
            InfixOp::Modulo,
            InfixOp::Add,
            InfixOp::Subtract,
            InfixOp::BitAnd,
            InfixOp::BitOr,
            InfixOp::ShiftLeft,
            InfixOp::ShiftRight,
            InfixOp::LessThan,
            InfixOp::LessEquals,
            InfixOp::GreaterThan,
            InfixOp::GreaterEquals,
            InfixOp::Equals,
            InfixOp::NotEquals,
            InfixOp::Is,
            InfixOp::IsNot,
            InfixOp::In,
            InfixOp::NotIn,
            InfixOp::Like,
            InfixOp::NotLike,
            InfixOp::Glob,
            InfixOp::NotGlob,
            InfixOp::Regexp,
            InfixOp::NotRegexp,
            InfixOp::Match,
            InfixOp::NotMatch,
            InfixOp::And,
            InfixOp::Or,
        ] {
            let _ = catalog.infix(op);
        }
        for op in [PrefixOp::Plus, PrefixOp::Negate, PrefixOp::BitNot, PrefixOp::Not] {
            let _ = catalog.prefix(op);
        }
    }
}
