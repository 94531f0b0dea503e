//! Monomorphization pass for the typed, lambda-lifted IR.
//!
//! Takes polymorphic top-level bindings and creates specialized monomorphic
//! copies for each concrete type they are actually used at, starting from
//! `main` at `Int`. Specializations are named `<bind>$<mangled-type>`, so
//!
//!   id : forall a. a -> a
//!
//! used at `Int -> Int` becomes `id$Int_Int`. The output is the closed set of
//! specializations reachable from `main$Int`, with every type ground.
//!
//! Preconditions: bindings are closed top-level functions (lambda lifting has
//! run), and bodies contain no `let`.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::debug;

use crate::error::{CompilerError, Result};
use crate::tir::{Bind, Branch, Exp, ExpKind, Param, Pat, PatKind, Program};
use crate::types::{format_type, fun, int, Type};

/// Mapping from the type variables of a binding's declared type to the
/// ground types of one specialization.
type Polys = HashMap<String, Type>;

/// Monomorphize a program. `main` is required and is specialized at `Int`.
pub fn monomorphize(program: Program) -> Result<Program> {
    Monomorphizer::new(program).run()
}

struct Monomorphizer {
    /// Original (possibly polymorphic) bindings by name.
    input: HashMap<String, Bind>,
    /// Specializations, keyed by mangled name. An `Incomplete` entry marks a
    /// specialization whose body is still being produced; a recursive
    /// reference to it returns the name without re-entering, which is what
    /// makes the traversal terminate.
    output: IndexMap<String, MonoEntry>,
}

enum MonoEntry {
    Incomplete,
    Complete(Bind),
}

impl Monomorphizer {
    fn new(program: Program) -> Self {
        let input = program
            .binds
            .into_iter()
            .map(|b| (b.name.clone(), b))
            .collect();
        Monomorphizer {
            input,
            output: IndexMap::new(),
        }
    }

    fn run(mut self) -> Result<Program> {
        let main = self
            .input
            .get("main")
            .cloned()
            .ok_or(CompilerError::MissingMain)?;
        self.morph_bind(&int(), &main)?;

        let binds = self
            .output
            .into_iter()
            .map(|(name, entry)| match entry {
                MonoEntry::Complete(bind) => bind,
                MonoEntry::Incomplete => {
                    unreachable!("specialization '{}' left incomplete", name)
                }
            })
            .collect();
        Ok(Program::new(binds))
    }

    /// Specialize `bind` at the ground type `expected`, returning the
    /// specialization's name. Revisits (including of an in-progress
    /// specialization) return the cached name immediately.
    fn morph_bind(&mut self, expected: &Type, bind: &Bind) -> Result<String> {
        let name = new_name(expected, bind)?;
        let polys = map_types(&bind.name, &bind.ty, expected)?;
        if self.output.contains_key(&name) {
            return Ok(name);
        }
        debug!("specializing '{}' as '{}'", bind.name, name);
        self.output.insert(name.clone(), MonoEntry::Incomplete);

        let mut locals: HashSet<String> =
            bind.params.iter().map(|p| p.name.clone()).collect();

        // Walk the parameter list off the expected type; the body is morphed
        // against what remains. With the checker's convention (parameters
        // folded into lambdas) the list is empty and the body sees the full
        // type.
        let mut params = Vec::with_capacity(bind.params.len());
        let mut body_ty = expected.clone();
        for param in &bind.params {
            match body_ty {
                Type::Fun(a, c) => {
                    params.push(Param {
                        name: param.name.clone(),
                        ty: *a,
                    });
                    body_ty = *c;
                }
                _ => {
                    return Err(CompilerError::StructuralTypeMismatch(format!(
                        "{} has {} parameters but specializes at {}",
                        bind.name,
                        bind.params.len(),
                        format_type(expected)
                    )))
                }
            }
        }
        let body = self.morph_exp(&body_ty, &bind.body, &polys, &mut locals)?;

        self.output.insert(
            name.clone(),
            MonoEntry::Complete(Bind {
                name: name.clone(),
                ty: expected.clone(),
                params,
                body,
            }),
        );
        Ok(name)
    }

    /// Rewrite an expression at the ground type `expected`, specializing
    /// every referenced global on the way.
    fn morph_exp(
        &mut self,
        expected: &Type,
        exp: &Exp,
        polys: &Polys,
        locals: &mut HashSet<String>,
    ) -> Result<Exp> {
        match &exp.kind {
            ExpKind::Lit(l) => Ok(Exp::new(ExpKind::Lit(*l), l.ty())),
            ExpKind::Var(x) => {
                if locals.contains(x) {
                    return Ok(Exp::new(ExpKind::Var(x.clone()), expected.clone()));
                }
                let bind = self
                    .input
                    .get(x)
                    .cloned()
                    .ok_or_else(|| CompilerError::UnresolvedName(x.clone()))?;
                let name = self.morph_bind(expected, &bind)?;
                Ok(Exp::new(ExpKind::Var(name), expected.clone()))
            }
            ExpKind::Inj(k) => Ok(Exp::new(ExpKind::Inj(k.clone()), expected.clone())),
            ExpKind::App(e1, e2) => {
                let arg_ty = mono(&e2.ty, polys)?;
                let arg = self.morph_exp(&arg_ty, e2, polys, locals)?;
                let fun_ty = fun(arg_ty, expected.clone());
                let callee = self.morph_exp(&fun_ty, e1, polys, locals)?;
                Ok(Exp::new(
                    ExpKind::App(Box::new(callee), Box::new(arg)),
                    expected.clone(),
                ))
            }
            ExpKind::Abs(x, body) => {
                locals.insert(x.clone());
                let body_ty = mono(&body.ty, polys)?;
                let body = self.morph_exp(&body_ty, body, polys, locals)?;
                Ok(Exp::new(
                    ExpKind::Abs(x.clone(), Box::new(body)),
                    expected.clone(),
                ))
            }
            ExpKind::Add(e1, e2) => {
                let lhs = self.morph_exp(&int(), e1, polys, locals)?;
                let rhs = self.morph_exp(&int(), e2, polys, locals)?;
                Ok(Exp::new(ExpKind::Add(Box::new(lhs), Box::new(rhs)), int()))
            }
            ExpKind::Case(scrut, branches) => {
                let scrut_ty = mono(&scrut.ty, polys)?;
                let scrut = self.morph_exp(&scrut_ty, scrut, polys, locals)?;
                let mut out = Vec::with_capacity(branches.len());
                for branch in branches {
                    let pat = morph_pat(&branch.pat, polys, locals)?;
                    let body = self.morph_exp(expected, &branch.body, polys, locals)?;
                    out.push(Branch { pat, body });
                }
                Ok(Exp::new(
                    ExpKind::Case(Box::new(scrut), out),
                    expected.clone(),
                ))
            }
            ExpKind::Let { name, .. } => Err(CompilerError::LetNotSupported(name.clone())),
        }
    }
}

/// Rewrite a pattern's type annotations and record its bound names as locals.
fn morph_pat(pat: &Pat, polys: &Polys, locals: &mut HashSet<String>) -> Result<Pat> {
    let ty = mono(&pat.ty, polys)?;
    let kind = match &pat.kind {
        PatKind::Var(x) => {
            locals.insert(x.clone());
            PatKind::Var(x.clone())
        }
        PatKind::Wild => PatKind::Wild,
        PatKind::Lit(l) => PatKind::Lit(*l),
        PatKind::Enum(k) => PatKind::Enum(k.clone()),
        PatKind::Inj(k, pats) => PatKind::Inj(
            k.clone(),
            pats.iter()
                .map(|p| morph_pat(p, polys, locals))
                .collect::<Result<Vec<_>>>()?,
        ),
    };
    Ok(Pat::new(kind, ty))
}

/// Apply the specialization mapping to a type. Every free type variable must
/// be mapped; a miss means an earlier stage leaked an unspecialized type.
/// Quantified variables stay put, so a higher-rank annotation survives long
/// enough to be rejected by name mangling.
fn mono(ty: &Type, polys: &Polys) -> Result<Type> {
    fn go(ty: &Type, polys: &Polys, bound: &mut Vec<String>) -> Result<Type> {
        match ty {
            Type::Lit(_) => Ok(ty.clone()),
            Type::Var(v) if bound.contains(v) => Ok(ty.clone()),
            Type::Var(v) => polys
                .get(v)
                .cloned()
                .ok_or_else(|| CompilerError::UnmappedTypeVariable(v.clone())),
            Type::EVar(ev) => Err(CompilerError::UnmappedTypeVariable(format!("{}", ev))),
            Type::Fun(a, b) => Ok(fun(go(a, polys, bound)?, go(b, polys, bound)?)),
            Type::All(v, body) => {
                bound.push(v.clone());
                let body = go(body, polys, bound)?;
                bound.pop();
                Ok(Type::All(v.clone(), Box::new(body)))
            }
            Type::Data(n, args) => Ok(Type::Data(
                n.clone(),
                args.iter()
                    .map(|a| go(a, polys, bound))
                    .collect::<Result<Vec<_>>>()?,
            )),
        }
    }
    go(ty, polys, &mut Vec::new())
}

/// Pair a binding's declared type against the expected specialization type,
/// structurally, collecting the mapping of type variables to ground types.
/// Shape disagreement indicates a bug in an earlier stage.
fn map_types(bind_name: &str, declared: &Type, expected: &Type) -> Result<Polys> {
    let mut polys = Polys::new();
    pair_types(bind_name, declared, expected, &mut polys)?;
    Ok(polys)
}

fn pair_types(bind_name: &str, declared: &Type, expected: &Type, polys: &mut Polys) -> Result<()> {
    match (declared, expected) {
        (Type::All(_, body), _) => pair_types(bind_name, body, expected, polys),
        (Type::Var(v), concrete) => match polys.get(v) {
            Some(previous) if previous != concrete => Err(structural_mismatch(
                bind_name, declared, expected,
            )),
            Some(_) => Ok(()),
            None => {
                polys.insert(v.clone(), concrete.clone());
                Ok(())
            }
        },
        (Type::Lit(a), Type::Lit(b)) if a == b => Ok(()),
        (Type::Fun(a1, a2), Type::Fun(b1, b2)) => {
            pair_types(bind_name, a1, b1, polys)?;
            pair_types(bind_name, a2, b2, polys)
        }
        (Type::Data(n1, args1), Type::Data(n2, args2))
            if n1 == n2 && args1.len() == args2.len() =>
        {
            for (a, b) in args1.iter().zip(args2) {
                pair_types(bind_name, a, b, polys)?;
            }
            Ok(())
        }
        _ => Err(structural_mismatch(bind_name, declared, expected)),
    }
}

fn structural_mismatch(bind_name: &str, declared: &Type, expected: &Type) -> CompilerError {
    CompilerError::StructuralTypeMismatch(format!(
        "{}: declared {} vs expected {}",
        bind_name,
        format_type(declared),
        format_type(expected)
    ))
}

/// The specialization name: `<bind>$<mangled-type>`. `$` cannot appear in
/// source identifiers (the renamer reserves it), so names stay injective.
fn new_name(expected: &Type, bind: &Bind) -> Result<String> {
    Ok(format!("{}${}", bind.name, mangle(&bind.name, expected)?))
}

fn mangle(bind_name: &str, ty: &Type) -> Result<String> {
    match ty {
        Type::Lit(name) => Ok(name.clone()),
        Type::Fun(a, b) => Ok(format!(
            "{}_{}",
            mangle(bind_name, a)?,
            mangle(bind_name, b)?
        )),
        Type::Data(name, args) => {
            let mut out = name.clone();
            for arg in args {
                out.push('_');
                out.push_str(&mangle(bind_name, arg)?);
            }
            Ok(out)
        }
        Type::Var(_) | Type::EVar(_) | Type::All(_, _) => Err(
            CompilerError::PolymorphicSpecialization(bind_name.to_string(), format_type(ty)),
        ),
    }
}
