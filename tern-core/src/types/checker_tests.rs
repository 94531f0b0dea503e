//! Tests for the bidirectional type checker.

use super::checker::{ContextEntry, TypeChecker};
use super::{char_type, data, forall, format_type, fun, int, lit, var, Type};
use crate::ast::{Branch, DataDef, Def, Exp, LetBind, Pat, Program, TopBind};
use crate::error::CompilerError;
use crate::tir;

/// Run a whole program through the checker, returning the typed program and
/// the checker (for signature inspection).
fn typecheck(defs: Vec<Def>) -> Result<(tir::Program, TypeChecker), CompilerError> {
    let mut checker = TypeChecker::new();
    let program = checker.check_program(&Program::new(defs))?;
    Ok((program, checker))
}

fn sig_of(checker: &TypeChecker, name: &str) -> String {
    format_type(
        checker
            .sigs()
            .get(name)
            .unwrap_or_else(|| panic!("no signature for {}", name)),
    )
}

fn bool_data() -> DataDef {
    DataDef {
        ty: data("Bool", vec![]),
        injs: vec![
            ("False".to_string(), lit("Bool")),
            ("True".to_string(), lit("Bool")),
        ],
    }
}

fn maybe_data() -> DataDef {
    DataDef {
        ty: forall("a", data("Maybe", vec![var("a")])),
        injs: vec![
            ("Nothing".to_string(), data("Maybe", vec![var("a")])),
            (
                "Just".to_string(),
                fun(var("a"), data("Maybe", vec![var("a")])),
            ),
        ],
    }
}

#[test]
fn test_literal_types() {
    let mut checker = TypeChecker::new();
    let te = checker.infer(&Exp::int(42)).unwrap();
    assert_eq!(te.ty, int());
    let te = checker.infer(&Exp::ch('x')).unwrap();
    assert_eq!(te.ty, char_type());
}

#[test]
fn test_infer_identity_signature() {
    let (_, checker) = typecheck(vec![Def::Bind(TopBind::new(
        "id",
        &["x"],
        Exp::var("x"),
    ))])
    .unwrap();
    assert_eq!(sig_of(&checker, "id"), "forall a. a -> a");
}

#[test]
fn test_infer_const_signature() {
    let (_, checker) = typecheck(vec![Def::Bind(TopBind::new(
        "const",
        &["x", "y"],
        Exp::var("x"),
    ))])
    .unwrap();
    assert_eq!(sig_of(&checker, "const"), "forall a b. a -> b -> a");
}

#[test]
fn test_check_annotated_identity() {
    let id_ty = forall("a", fun(var("a"), var("a")));
    let (program, _) = typecheck(vec![
        Def::Sig("id".to_string(), id_ty.clone()),
        Def::Bind(TopBind::new("id", &["x"], Exp::var("x"))),
    ])
    .unwrap();
    let bind = program.get_bind("id").unwrap();
    assert_eq!(bind.ty, id_ty);
    assert!(matches!(bind.body.kind, tir::ExpKind::Abs(_, _)));
}

#[test]
fn test_annotated_identity_applied() {
    let (_, checker) = typecheck(vec![
        Def::Sig("id".to_string(), forall("a", fun(var("a"), var("a")))),
        Def::Bind(TopBind::new("id", &["x"], Exp::var("x"))),
        Def::Bind(TopBind::new(
            "main",
            &[],
            Exp::app(Exp::var("id"), Exp::int(5)),
        )),
    ])
    .unwrap();
    assert_eq!(sig_of(&checker, "main"), "Int");
}

#[test]
fn test_annotation_expression() {
    let mut checker = TypeChecker::new();
    let e = Exp::ann(
        Exp::abs("x", Exp::var("x")),
        forall("a", fun(var("a"), var("a"))),
    );
    let te = checker.infer(&e).unwrap();
    assert_eq!(format_type(&te.ty), "forall a. a -> a");
}

#[test]
fn test_higher_rank_argument() {
    // f takes a polymorphic function; passing the polymorphic id through
    // requires the quantifier cases on both sides of subtyping.
    let f_ty = fun(forall("a", fun(var("a"), var("a"))), int());
    let (_, checker) = typecheck(vec![
        Def::Sig("f".to_string(), f_ty),
        Def::Bind(TopBind::new(
            "f",
            &["g"],
            Exp::app(Exp::var("g"), Exp::int(1)),
        )),
        Def::Sig("id".to_string(), forall("a", fun(var("a"), var("a")))),
        Def::Bind(TopBind::new("id", &["x"], Exp::var("x"))),
        Def::Bind(TopBind::new(
            "main",
            &[],
            Exp::app(Exp::var("f"), Exp::var("id")),
        )),
    ])
    .unwrap();
    assert_eq!(sig_of(&checker, "main"), "Int");
}

#[test]
fn test_let_binding() {
    let (program, checker) = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::Let(
            LetBind {
                name: "f".to_string(),
                vars: vec!["x".to_string()],
                rhs: Box::new(Exp::var("x")),
            },
            Box::new(Exp::app(Exp::var("f"), Exp::int(5))),
        ),
    ))])
    .unwrap();
    assert_eq!(sig_of(&checker, "main"), "Int");
    let bind = program.get_bind("main").unwrap();
    assert!(matches!(bind.body.kind, tir::ExpKind::Let { .. }));
}

#[test]
fn test_add_types_to_int() {
    let (_, checker) = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::add(Exp::int(1), Exp::int(2)),
    ))])
    .unwrap();
    assert_eq!(sig_of(&checker, "main"), "Int");
}

#[test]
fn test_add_mismatch_reports_operands() {
    // 1 + 'a' fails checking the right operand against Int.
    let result = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::add(Exp::int(1), Exp::ch('a')),
    ))]);
    match result {
        Err(CompilerError::TypeMismatch(found, expected)) => {
            assert_eq!(found, "Char");
            assert_eq!(expected, "Int");
        }
        other => panic!("expected TypeMismatch, got {:?}", other.err()),
    }
}

#[test]
fn test_occurs_check_rejects_self_application() {
    let result = typecheck(vec![Def::Bind(TopBind::new(
        "bad",
        &["x"],
        Exp::app(Exp::var("x"), Exp::var("x")),
    ))]);
    assert!(matches!(result, Err(CompilerError::TypeMismatch(_, _))));
}

#[test]
fn test_apply_int_is_not_a_function() {
    let result = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::app(Exp::int(5), Exp::int(6)),
    ))]);
    assert!(matches!(result, Err(CompilerError::NotAFunction(_))));
}

#[test]
fn test_unresolved_rhs_name_checks_via_auto_extension() {
    // An unbound name gets a fresh existential so recursion works; the
    // monomorphizer reports genuinely unresolved names later.
    let (_, checker) = typecheck(vec![
        Def::Sig("f".to_string(), fun(int(), int())),
        Def::Bind(TopBind::new(
            "f",
            &["x"],
            Exp::add(Exp::var("x"), Exp::var("y")),
        )),
    ])
    .unwrap();
    assert_eq!(sig_of(&checker, "f"), "Int -> Int");
}

#[test]
fn test_unannotated_recursion() {
    let (_, checker) = typecheck(vec![Def::Bind(TopBind::new(
        "loop",
        &["x"],
        Exp::app(Exp::var("loop"), Exp::var("x")),
    ))])
    .unwrap();
    assert_eq!(sig_of(&checker, "loop"), "forall a b. a -> b");
}

#[test]
fn test_ambiguous_polymorphism() {
    // The argument's type is never constrained, so an existential survives.
    let result = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::app(
            Exp::abs("x", Exp::int(5)),
            Exp::abs("y", Exp::var("y")),
        ),
    ))]);
    assert!(matches!(
        result,
        Err(CompilerError::AmbiguousPolymorphism(name)) if name == "main"
    ));
}

// =============================================================================
// Data definitions and patterns
// =============================================================================

#[test]
fn test_case_over_bool() {
    let (_, checker) = typecheck(vec![
        Def::Data(bool_data()),
        Def::Bind(TopBind::new(
            "not",
            &["b"],
            Exp::case_of(
                Exp::var("b"),
                vec![
                    Branch::new(Pat::Enum("True".to_string()), Exp::inj("False")),
                    Branch::new(Pat::Enum("False".to_string()), Exp::inj("True")),
                ],
            ),
        )),
    ])
    .unwrap();
    assert_eq!(sig_of(&checker, "not"), "Bool -> Bool");
}

#[test]
fn test_constructor_patterns_generalize() {
    let (_, checker) = typecheck(vec![
        Def::Data(maybe_data()),
        Def::Bind(TopBind::new(
            "fromMaybe",
            &["d", "m"],
            Exp::case_of(
                Exp::var("m"),
                vec![
                    Branch::new(
                        Pat::Inj("Just".to_string(), vec![Pat::Var("x".to_string())]),
                        Exp::var("x"),
                    ),
                    Branch::new(Pat::Enum("Nothing".to_string()), Exp::var("d")),
                ],
            ),
        )),
    ])
    .unwrap();
    assert_eq!(sig_of(&checker, "fromMaybe"), "forall a. a -> Maybe a -> a");
}

#[test]
fn test_wildcard_and_literal_patterns() {
    let (_, checker) = typecheck(vec![Def::Bind(TopBind::new(
        "f",
        &["x"],
        Exp::case_of(
            Exp::var("x"),
            vec![
                Branch::new(Pat::Lit(crate::ast::Literal::Int(0)), Exp::int(1)),
                Branch::new(Pat::Wild, Exp::int(0)),
            ],
        ),
    ))])
    .unwrap();
    assert_eq!(sig_of(&checker, "f"), "Int -> Int");
}

#[test]
fn test_branch_result_mismatch() {
    let result = typecheck(vec![Def::Bind(TopBind::new(
        "f",
        &["x"],
        Exp::case_of(
            Exp::var("x"),
            vec![
                Branch::new(Pat::Lit(crate::ast::Literal::Int(0)), Exp::int(1)),
                Branch::new(Pat::Wild, Exp::ch('a')),
            ],
        ),
    ))]);
    assert!(matches!(result, Err(CompilerError::TypeMismatch(_, _))));
}

#[test]
fn test_unknown_constructor() {
    let result = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::inj("None"),
    ))]);
    assert!(matches!(
        result,
        Err(CompilerError::UnknownConstructor(k)) if k == "None"
    ));
}

#[test]
fn test_pattern_arity_mismatch() {
    let result = typecheck(vec![
        Def::Data(maybe_data()),
        Def::Bind(TopBind::new(
            "f",
            &["m"],
            Exp::case_of(
                Exp::var("m"),
                vec![Branch::new(
                    Pat::Inj(
                        "Just".to_string(),
                        vec![Pat::Var("x".to_string()), Pat::Var("y".to_string())],
                    ),
                    Exp::int(0),
                )],
            ),
        )),
    ]);
    assert!(matches!(
        result,
        Err(CompilerError::ArityMismatch(k, 1, 2)) if k == "Just"
    ));
}

#[test]
fn test_bad_data_head() {
    // Head arguments must be the bound parameters themselves.
    let result = typecheck(vec![Def::Data(DataDef {
        ty: data("Box", vec![int()]),
        injs: vec![("MkBox".to_string(), data("Box", vec![int()]))],
    })]);
    assert!(matches!(result, Err(CompilerError::BadDataDefinition(_))));
}

#[test]
fn test_bad_injection_return_type() {
    let result = typecheck(vec![Def::Data(DataDef {
        ty: forall("a", data("Maybe", vec![var("a")])),
        injs: vec![(
            "Nothing".to_string(),
            data("Maybe", vec![int()]),
        )],
    })]);
    assert!(matches!(result, Err(CompilerError::BadDataDefinition(_))));
}

#[test]
fn test_unbound_data_params() {
    let result = typecheck(vec![Def::Data(DataDef {
        ty: forall("a", data("Maybe", vec![var("a")])),
        injs: vec![(
            "Just".to_string(),
            fun(var("b"), data("Maybe", vec![var("a")])),
        )],
    })]);
    assert!(matches!(
        result,
        Err(CompilerError::UnboundDataParams(k)) if k == "Just"
    ));
}

#[test]
fn test_sig_with_unbound_type_variable() {
    let result = typecheck(vec![Def::Sig("f".to_string(), fun(var("z"), int()))]);
    assert!(matches!(
        result,
        Err(CompilerError::UnboundTypeVar(v)) if v == "z"
    ));
}

// =============================================================================
// Invariants
// =============================================================================

/// A battery of representative well-formed closed types.
fn type_battery() -> Vec<Type> {
    vec![
        int(),
        char_type(),
        fun(int(), char_type()),
        fun(fun(int(), int()), int()),
        forall("a", fun(var("a"), var("a"))),
        forall("a", forall("b", fun(var("a"), fun(var("b"), var("a"))))),
        data("List", vec![int()]),
        data("Pair", vec![int(), fun(int(), char_type())]),
        forall("a", fun(var("a"), data("List", vec![var("a")]))),
    ]
}

#[test]
fn test_subtype_reflexivity() {
    for ty in type_battery() {
        let mut checker = TypeChecker::new();
        checker
            .subtype(&ty, &ty)
            .unwrap_or_else(|e| panic!("{} should be a subtype of itself: {}", ty, e));
    }
}

#[test]
fn test_apply_idempotence() {
    // Drive inference far enough to leave solved existentials around, then
    // check that context application is a fixed point on every annotation.
    let mut checker = TypeChecker::new();
    let te = checker
        .infer(&Exp::app(
            Exp::abs("x", Exp::add(Exp::var("x"), Exp::int(1))),
            Exp::int(2),
        ))
        .unwrap();
    let mut tys = Vec::new();
    te.for_each_type(&mut |t| tys.push(t.clone()));
    tys.push(te.ty.clone());
    for ty in tys {
        let once = checker.apply(&ty);
        let twice = checker.apply(&once);
        assert_eq!(once, twice, "apply must be idempotent on {}", ty);
    }
}

#[test]
fn test_solutions_are_wellformed_monotypes() {
    // Every solution must be a monotype, must not mention its own
    // existential, and may only mention existentials introduced earlier.
    let mut checker = TypeChecker::new();
    checker
        .infer(&Exp::app(
            Exp::app(
                Exp::abs("x", Exp::abs("y", Exp::var("x"))),
                Exp::int(5),
            ),
            Exp::ch('c'),
        ))
        .unwrap();

    let env = checker.env().to_vec();
    let mut seen_solutions = false;
    for (idx, entry) in env.iter().enumerate() {
        if let ContextEntry::Solved(ev, solution) = entry {
            seen_solutions = true;
            assert!(solution.is_monotype(), "solution for {} is not a monotype", ev);
            assert!(
                !solution.contains_evar(*ev),
                "occurs violation: {} := {}",
                ev,
                solution
            );
            for free in solution.free_evars() {
                let pos = env.iter().position(|e| {
                    matches!(e, ContextEntry::EVar(x) if *x == free)
                        || matches!(e, ContextEntry::Solved(x, _) if *x == free)
                });
                assert!(
                    matches!(pos, Some(p) if p < idx),
                    "solution for {} mentions {} which does not appear earlier",
                    ev,
                    free
                );
            }
        }
    }
    assert!(seen_solutions, "inference should have solved something");
}

#[test]
fn test_context_monotonicity_under_solving() {
    // Solving rewrites entries in place; nothing is removed or reordered.
    let mut checker = TypeChecker::new();
    let a = checker.fresh_evar();
    let b = checker.fresh_evar();
    checker.push_entry(ContextEntry::EVar(a));
    checker.push_entry(ContextEntry::EVar(b));

    checker.subtype(&Type::EVar(a), &Type::EVar(b)).unwrap();

    let env = checker.env();
    assert_eq!(env.len(), 2);
    assert_eq!(env[0], ContextEntry::EVar(a));
    assert_eq!(env[1], ContextEntry::Solved(b, Type::EVar(a)));
}

#[test]
fn test_context_complete_and_empty_after_bind() {
    let mut checker = TypeChecker::new();
    checker
        .typecheck_bind(&TopBind::new(
            "main",
            &[],
            Exp::app(Exp::abs("x", Exp::var("x")), Exp::int(5)),
        ))
        .unwrap();
    assert!(checker.is_complete());
    assert!(checker.env().is_empty());
}

#[test]
fn test_monomorphic_bindings_are_fully_ground() {
    let (program, _) = typecheck(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::app(Exp::abs("x", Exp::add(Exp::var("x"), Exp::int(1))), Exp::int(2)),
    ))])
    .unwrap();
    let bind = program.get_bind("main").unwrap();
    bind.body.for_each_type(&mut |t| {
        assert!(t.is_ground(), "annotation {} is not ground", t);
    });
}
