//! End-to-end tests: type checking followed by monomorphization.

use crate::ast::{Branch, DataDef, Def, Exp, Pat, Program, TopBind};
use crate::error::CompilerError;
use crate::tir::ExpKind;
use crate::types::{data, forall, format_type, fun, lit, var};
use crate::{Lifted, Monomorphized, Renamed, TypeChecked};

fn type_check(defs: Vec<Def>) -> Result<TypeChecked, CompilerError> {
    Renamed::new(Program::new(defs)).type_check()
}

/// Run the full core: type check, then monomorphize. The checker's output is
/// already in lifted form for programs without local lambdas to lift.
fn compile(defs: Vec<Def>) -> Result<Monomorphized, CompilerError> {
    let checked = type_check(defs)?;
    Lifted::new(checked.program).monomorphize()
}

fn bool_defs() -> Vec<Def> {
    vec![Def::Data(DataDef {
        ty: data("Bool", vec![]),
        injs: vec![
            ("False".to_string(), lit("Bool")),
            ("True".to_string(), lit("Bool")),
        ],
    })]
}

#[test]
fn scenario_annotated_identity() {
    // id : forall a. a -> a; id x = x; main = id 5
    let defs = vec![
        Def::Sig("id".to_string(), forall("a", fun(var("a"), var("a")))),
        Def::Bind(TopBind::new("id", &["x"], Exp::var("x"))),
        Def::Bind(TopBind::new(
            "main",
            &[],
            Exp::app(Exp::var("id"), Exp::int(5)),
        )),
    ];

    let checked = type_check(defs.clone()).unwrap();
    assert_eq!(format_type(checked.sigs.get("main").unwrap()), "Int");

    let mono = compile(defs).unwrap().program;
    let id = mono.get_bind("id$Int_Int").unwrap();
    assert!(matches!(id.body.kind, ExpKind::Abs(_, _)));
    let main = mono.get_bind("main$Int").unwrap();
    match &main.body.kind {
        ExpKind::App(callee, arg) => {
            assert_eq!(callee.kind, ExpKind::Var("id$Int_Int".to_string()));
            assert!(matches!(arg.kind, ExpKind::Lit(crate::ast::Literal::Int(5))));
        }
        other => panic!("expected App, got {:?}", other),
    }
}

#[test]
fn scenario_inferred_const() {
    // const x y = x; main = const 3 4
    let defs = vec![
        Def::Bind(TopBind::new("const", &["x", "y"], Exp::var("x"))),
        Def::Bind(TopBind::new(
            "main",
            &[],
            Exp::app(Exp::app(Exp::var("const"), Exp::int(3)), Exp::int(4)),
        )),
    ];

    let checked = type_check(defs.clone()).unwrap();
    assert_eq!(
        format_type(checked.sigs.get("const").unwrap()),
        "forall a b. a -> b -> a"
    );

    let mono = compile(defs).unwrap().program;
    assert!(mono.get_bind("const$Int_Int_Int").is_some());
    let main = mono.get_bind("main$Int").unwrap();
    match &main.body.kind {
        ExpKind::App(inner, arg) => {
            assert!(matches!(arg.kind, ExpKind::Lit(crate::ast::Literal::Int(4))));
            match &inner.kind {
                ExpKind::App(callee, _) => {
                    assert_eq!(callee.kind, ExpKind::Var("const$Int_Int_Int".to_string()))
                }
                other => panic!("expected inner App, got {:?}", other),
            }
        }
        other => panic!("expected App, got {:?}", other),
    }
}

#[test]
fn scenario_bool_case() {
    // not b = case b of True => False; False => True
    // main = case (not True) of True => 1; False => 0
    let mut defs = bool_defs();
    defs.push(Def::Bind(TopBind::new(
        "not",
        &["b"],
        Exp::case_of(
            Exp::var("b"),
            vec![
                Branch::new(Pat::Enum("True".to_string()), Exp::inj("False")),
                Branch::new(Pat::Enum("False".to_string()), Exp::inj("True")),
            ],
        ),
    )));
    defs.push(Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::case_of(
            Exp::app(Exp::var("not"), Exp::inj("True")),
            vec![
                Branch::new(Pat::Enum("True".to_string()), Exp::int(1)),
                Branch::new(Pat::Enum("False".to_string()), Exp::int(0)),
            ],
        ),
    )));

    let checked = type_check(defs.clone()).unwrap();
    assert_eq!(format_type(checked.sigs.get("not").unwrap()), "Bool -> Bool");
    assert_eq!(format_type(checked.sigs.get("main").unwrap()), "Int");

    let mono = compile(defs).unwrap().program;
    assert!(mono.get_bind("not$Bool_Bool").is_some());
    let main = mono.get_bind("main$Int").unwrap();
    main.body.for_each_type(&mut |t| {
        assert!(t.is_ground(), "non-ground type {} in main", t);
    });
}

#[test]
fn scenario_unbound_reference() {
    // f : Int -> Int; f x = x + y — `y` auto-extends during checking and is
    // reported by the monomorphizer once f is demanded from main.
    let defs = vec![
        Def::Sig("f".to_string(), fun(crate::types::int(), crate::types::int())),
        Def::Bind(TopBind::new(
            "f",
            &["x"],
            Exp::add(Exp::var("x"), Exp::var("y")),
        )),
        Def::Bind(TopBind::new(
            "main",
            &[],
            Exp::app(Exp::var("f"), Exp::int(0)),
        )),
    ];

    assert!(type_check(defs.clone()).is_ok());
    let result = compile(defs);
    assert!(matches!(
        result,
        Err(CompilerError::UnresolvedName(name)) if name == "y"
    ));
}

#[test]
fn scenario_self_application() {
    // bad x = x x — rejected by the occurs check during instantiation.
    let result = type_check(vec![Def::Bind(TopBind::new(
        "bad",
        &["x"],
        Exp::app(Exp::var("x"), Exp::var("x")),
    ))]);
    assert!(matches!(result, Err(CompilerError::TypeMismatch(_, _))));
}

#[test]
fn scenario_add_char() {
    // main = 1 + 'a'
    let result = type_check(vec![Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::add(Exp::int(1), Exp::ch('a')),
    ))]);
    match result {
        Err(CompilerError::TypeMismatch(found, expected)) => {
            assert_eq!(found, "Char");
            assert_eq!(expected, "Int");
        }
        other => panic!("expected TypeMismatch, got {:?}", other.err().map(|e| e.to_string())),
    }
}

#[test]
fn pipeline_produces_ground_output() {
    let mut defs = bool_defs();
    defs.push(Def::Sig(
        "id".to_string(),
        forall("a", fun(var("a"), var("a"))),
    ));
    defs.push(Def::Bind(TopBind::new("id", &["x"], Exp::var("x"))));
    defs.push(Def::Bind(TopBind::new(
        "main",
        &[],
        Exp::add(
            Exp::app(Exp::var("id"), Exp::int(1)),
            Exp::case_of(
                Exp::app(Exp::var("id"), Exp::inj("True")),
                vec![
                    Branch::new(Pat::Enum("True".to_string()), Exp::int(1)),
                    Branch::new(Pat::Wild, Exp::int(0)),
                ],
            ),
        ),
    )));

    let mono = compile(defs).unwrap().program;
    // id is demanded at two distinct types.
    assert!(mono.get_bind("id$Int_Int").is_some());
    assert!(mono.get_bind("id$Bool_Bool").is_some());
    for bind in &mono.binds {
        bind.body.for_each_type(&mut |t| {
            assert!(t.is_ground(), "non-ground {} in {}", t, bind.name);
        });
    }
}
