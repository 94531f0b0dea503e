//! Bidirectional type checker over an ordered context.
//!
//! The checker follows the "complete and easy" formulation of higher-rank
//! predicative polymorphism: `check`, `infer`, `subtype`, and the two
//! instantiation judgments recurse into each other while mutating a single
//! ordered context of type variables, existentials, and term bindings. The
//! ordering of the context encodes scope and dependency: solutions may only
//! reference existentials that appear strictly earlier, and scopes are exited
//! by truncating the context at a marker.
//!
//! Output is the typed IR (`tir`), with every node annotated by its
//! most-solved type.

use indexmap::IndexMap;
use log::debug;

use crate::ast;
use crate::error::{CompilerError, Result};
use crate::tir::{self, ExpKind, PatKind};
use crate::types::{format_type, forall, fun, EVarId, Type};
use crate::IdSource;

/// One element of the ordered context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEntry {
    /// Term variable binding.
    Var(String, Type),
    /// Universal type variable in scope.
    TVar(String),
    /// Unsolved existential.
    EVar(EVarId),
    /// Existential solved to a monotype.
    Solved(EVarId, Type),
    /// Scope marker for rank-n quantifier instantiation.
    Marker(EVarId),
}

pub struct TypeChecker {
    /// The ordered local context. Grows as rules enter scopes and is
    /// truncated back on exit; reset to empty between top-level bindings.
    env: Vec<ContextEntry>,
    /// Top-level signatures: user-provided plus inferred ones, inserted as
    /// each binding completes.
    sig: IndexMap<String, Type>,
    /// Constructor types, closed over their data parameters.
    data_injs: IndexMap<String, Type>,
    /// Fresh existential allocator.
    evars: IdSource<EVarId>,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        TypeChecker {
            env: Vec::new(),
            sig: IndexMap::new(),
            data_injs: IndexMap::new(),
            evars: IdSource::new(),
        }
    }

    /// The current ordered context (for tests and debugging).
    pub fn env(&self) -> &[ContextEntry] {
        &self.env
    }

    pub fn sigs(&self) -> &IndexMap<String, Type> {
        &self.sig
    }

    pub fn into_sigs(self) -> IndexMap<String, Type> {
        self.sig
    }

    /// Constructor types registered by data definitions (for tests).
    pub fn data_injs(&self) -> &IndexMap<String, Type> {
        &self.data_injs
    }

    /// Allocate a fresh existential (exposed for tests).
    pub(crate) fn fresh_evar(&mut self) -> EVarId {
        self.evars.next_id()
    }

    /// Push a context entry directly (for tests).
    pub(crate) fn push_entry(&mut self, entry: ContextEntry) {
        self.env.push(entry);
    }

    // =========================================================================
    // Ordered context primitives
    // =========================================================================

    fn position_of(&self, entry: &ContextEntry) -> Option<usize> {
        self.env.iter().position(|e| e == entry)
    }

    /// Truncate the context at the first occurrence of `entry`, dropping the
    /// entry itself and everything after it. Returns the dropped tail.
    fn split_on(&mut self, entry: &ContextEntry) -> Vec<ContextEntry> {
        let idx = self
            .position_of(entry)
            .expect("split_on: entry must be present in the context");
        let mut tail = self.env.split_off(idx);
        tail.remove(0);
        tail
    }

    /// Truncate the context to the prefix strictly before `entry`.
    fn drop_trailing(&mut self, entry: &ContextEntry) {
        let idx = self
            .position_of(entry)
            .expect("drop_trailing: entry must be present in the context");
        self.env.truncate(idx);
    }

    /// Replace `entry` in place with the given sequence of entries.
    fn replace_entry(&mut self, entry: &ContextEntry, with: Vec<ContextEntry>) {
        let idx = self
            .position_of(entry)
            .expect("replace_entry: entry must be present in the context");
        self.env.splice(idx..=idx, with);
    }

    /// Rightmost-to-leftmost search for a solution of `ev`.
    fn find_solved(&self, ev: EVarId) -> Option<&Type> {
        self.env.iter().rev().find_map(|e| match e {
            ContextEntry::Solved(solved, ty) if *solved == ev => Some(ty),
            _ => None,
        })
    }

    /// The context is complete when no unsolved existential remains.
    pub fn is_complete(&self) -> bool {
        !self
            .env
            .iter()
            .any(|e| matches!(e, ContextEntry::EVar(_)))
    }

    /// Rightmost term-variable binding for `name`.
    fn lookup_var(&self, name: &str) -> Option<&Type> {
        self.env.iter().rev().find_map(|e| match e {
            ContextEntry::Var(x, ty) if x == name => Some(ty),
            _ => None,
        })
    }

    // =========================================================================
    // Well-formedness and context application
    // =========================================================================

    /// `Γ ⊢ A`: every universal is in scope and every existential is known.
    pub fn well_formed(&self, ty: &Type) -> Result<()> {
        well_formed_in(&self.env, &mut Vec::new(), ty)
    }

    /// `[Γ]A`: rewrite solved existentials to their solutions, to fixed point
    /// (solutions may themselves mention solved existentials).
    pub fn apply(&self, ty: &Type) -> Type {
        let mut current = self.apply_once(ty);
        loop {
            let next = self.apply_once(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn apply_once(&self, ty: &Type) -> Type {
        match ty {
            Type::Lit(_) | Type::Var(_) => ty.clone(),
            Type::EVar(ev) => match self.find_solved(*ev) {
                Some(solution) => solution.clone(),
                None => ty.clone(),
            },
            Type::Fun(a, b) => fun(self.apply_once(a), self.apply_once(b)),
            Type::All(v, body) => Type::All(v.clone(), Box::new(self.apply_once(body))),
            Type::Data(n, args) => {
                Type::Data(n.clone(), args.iter().map(|a| self.apply_once(a)).collect())
            }
        }
    }

    /// `[Γ]` extended pointwise over the typed IR.
    pub fn apply_exp(&self, exp: &tir::Exp) -> tir::Exp {
        exp.map_types(&mut |ty| self.apply(ty))
    }

    /// Render a type for error messages, in its most-solved form.
    fn render(&self, ty: &Type) -> String {
        format_type(&self.apply(ty))
    }

    // =========================================================================
    // Instantiation
    // =========================================================================

    /// `Γ ⊢ ά :=< A ⊣ Δ`: instantiate `ev` such that `ev <: ty`.
    fn instantiate_l(&mut self, ev: EVarId, ty: &Type) -> Result<()> {
        // Solve: a monotype well formed in the prefix left of `ev`.
        if self.try_solve(ev, ty) {
            return Ok(());
        }
        match ty {
            // Reach: solve the existential that stands further right,
            // preserving left-to-right dependency.
            Type::EVar(other) if self.stands_right_of(*other, ev) => {
                debug!("reach: solving {} := {}", other, ev);
                self.replace_entry(
                    &ContextEntry::EVar(*other),
                    vec![ContextEntry::Solved(*other, Type::EVar(ev))],
                );
                Ok(())
            }
            Type::Fun(a1, a2) => {
                let (ev1, ev2) = self.articulate_fun(ev);
                self.instantiate_r(a1, ev1)?;
                let a2 = self.apply(a2);
                self.instantiate_l(ev2, &a2)
            }
            Type::All(v, body) => {
                let entry = ContextEntry::TVar(v.clone());
                self.env.push(entry.clone());
                self.instantiate_l(ev, body)?;
                self.drop_trailing(&entry);
                Ok(())
            }
            Type::Data(name, args) => {
                let arg_evs = self.articulate_data(ev, name, args.len());
                for (arg_ev, arg) in arg_evs.into_iter().zip(args) {
                    let arg = self.apply(arg);
                    self.instantiate_l(arg_ev, &arg)?;
                }
                Ok(())
            }
            _ => Err(CompilerError::TypeMismatch(
                format!("{}", ev),
                self.render(ty),
            )),
        }
    }

    /// `Γ ⊢ A =:< ά ⊣ Δ`: instantiate `ev` such that `ty <: ev`.
    fn instantiate_r(&mut self, ty: &Type, ev: EVarId) -> Result<()> {
        if self.try_solve(ev, ty) {
            return Ok(());
        }
        match ty {
            Type::EVar(other) if self.stands_right_of(*other, ev) => {
                debug!("reach: solving {} := {}", other, ev);
                self.replace_entry(
                    &ContextEntry::EVar(*other),
                    vec![ContextEntry::Solved(*other, Type::EVar(ev))],
                );
                Ok(())
            }
            Type::Fun(a1, a2) => {
                let (ev1, ev2) = self.articulate_fun(ev);
                self.instantiate_l(ev1, a1)?;
                let a2 = self.apply(a2);
                self.instantiate_r(&a2, ev2)
            }
            Type::All(v, body) => {
                // Instantiate the quantifier with a fresh existential behind a
                // marker, so the scope can be truncated precisely on exit.
                let fresh = self.fresh_evar();
                let marker = ContextEntry::Marker(fresh);
                self.env.push(marker.clone());
                self.env.push(ContextEntry::EVar(fresh));
                let body = body.subst_var(v, &Type::EVar(fresh));
                self.instantiate_r(&body, ev)?;
                self.drop_trailing(&marker);
                Ok(())
            }
            Type::Data(name, args) => {
                let arg_evs = self.articulate_data(ev, name, args.len());
                for (arg_ev, arg) in arg_evs.into_iter().zip(args) {
                    let arg = self.apply(arg);
                    self.instantiate_r(&arg, arg_ev)?;
                }
                Ok(())
            }
            _ => Err(CompilerError::TypeMismatch(
                self.render(ty),
                format!("{}", ev),
            )),
        }
    }

    /// Attempt the Solve rule: `ty` is a monotype well formed strictly left
    /// of `ev`. Returns whether the solution was recorded.
    fn try_solve(&mut self, ev: EVarId, ty: &Type) -> bool {
        if !ty.is_monotype() {
            return false;
        }
        let idx = self
            .position_of(&ContextEntry::EVar(ev))
            .expect("instantiate: existential must be unsolved in the context");
        if well_formed_in(&self.env[..idx], &mut Vec::new(), ty).is_err() {
            return false;
        }
        debug!("solving {} := {}", ev, format_type(ty));
        self.replace_entry(
            &ContextEntry::EVar(ev),
            vec![ContextEntry::Solved(ev, ty.clone())],
        );
        true
    }

    fn stands_right_of(&self, candidate: EVarId, anchor: EVarId) -> bool {
        let c = self.position_of(&ContextEntry::EVar(candidate));
        let a = self.position_of(&ContextEntry::EVar(anchor));
        matches!((c, a), (Some(c), Some(a)) if c > a)
    }

    /// Replace `ev` with `ev := ά1 -> ά2`, inserting the fresh existentials
    /// at its position so the solution is well scoped.
    fn articulate_fun(&mut self, ev: EVarId) -> (EVarId, EVarId) {
        let ev1 = self.fresh_evar();
        let ev2 = self.fresh_evar();
        self.replace_entry(
            &ContextEntry::EVar(ev),
            vec![
                ContextEntry::EVar(ev2),
                ContextEntry::EVar(ev1),
                ContextEntry::Solved(ev, fun(Type::EVar(ev1), Type::EVar(ev2))),
            ],
        );
        (ev1, ev2)
    }

    /// Replace `ev` with `ev := D ά1 .. άn`, analogous to `articulate_fun`
    /// for applied data constructors (argument positions are invariant).
    fn articulate_data(&mut self, ev: EVarId, name: &str, arity: usize) -> Vec<EVarId> {
        let arg_evs: Vec<EVarId> = (0..arity).map(|_| self.fresh_evar()).collect();
        let mut entries: Vec<ContextEntry> = arg_evs
            .iter()
            .rev()
            .map(|e| ContextEntry::EVar(*e))
            .collect();
        entries.push(ContextEntry::Solved(
            ev,
            Type::Data(
                name.to_string(),
                arg_evs.iter().map(|e| Type::EVar(*e)).collect(),
            ),
        ));
        self.replace_entry(&ContextEntry::EVar(ev), entries);
        arg_evs
    }

    // =========================================================================
    // Subtyping
    // =========================================================================

    /// `Γ ⊢ A <: B ⊣ Δ`.
    pub fn subtype(&mut self, a: &Type, b: &Type) -> Result<()> {
        match (a, b) {
            (Type::Lit(x), Type::Lit(y)) if x == y => Ok(()),
            (Type::Var(x), Type::Var(y)) if x == y => Ok(()),
            (Type::EVar(x), Type::EVar(y)) if x == y => Ok(()),
            (Type::Fun(a1, a2), Type::Fun(b1, b2)) => {
                self.subtype(b1, a1)?;
                let a2 = self.apply(a2);
                let b2 = self.apply(b2);
                self.subtype(&a2, &b2)
            }
            (_, Type::All(v, body)) => {
                let entry = ContextEntry::TVar(v.clone());
                self.env.push(entry.clone());
                self.subtype(a, body)?;
                self.drop_trailing(&entry);
                Ok(())
            }
            (Type::All(v, body), _) => {
                let fresh = self.fresh_evar();
                let marker = ContextEntry::Marker(fresh);
                self.env.push(marker.clone());
                self.env.push(ContextEntry::EVar(fresh));
                let body = body.subst_var(v, &Type::EVar(fresh));
                self.subtype(&body, b)?;
                self.drop_trailing(&marker);
                Ok(())
            }
            (Type::EVar(ev), _) if !b.contains_evar(*ev) => self.instantiate_l(*ev, b),
            (_, Type::EVar(ev)) if !a.contains_evar(*ev) => self.instantiate_r(a, *ev),
            (Type::Data(n1, args1), Type::Data(n2, args2))
                if n1 == n2 && args1.len() == args2.len() =>
            {
                // Data arguments are invariant; apply between steps so later
                // positions see earlier solutions.
                for (arg1, arg2) in args1.iter().zip(args2) {
                    let arg1 = self.apply(arg1);
                    let arg2 = self.apply(arg2);
                    self.subtype(&arg1, &arg2)?;
                }
                Ok(())
            }
            _ => Err(CompilerError::TypeMismatch(self.render(a), self.render(b))),
        }
    }

    // =========================================================================
    // Checking and inference
    // =========================================================================

    /// `Γ ⊢ e <= A ⊣ Δ`: check `e` against `ty`, returning the typed node
    /// annotated with the most-solved form of `ty`.
    pub fn check(&mut self, e: &ast::Exp, ty: &Type) -> Result<tir::Exp> {
        match (e, ty) {
            (_, Type::All(v, body)) => {
                let entry = ContextEntry::TVar(v.clone());
                self.env.push(entry.clone());
                let inner = self.check(e, body)?;
                let inner = self.apply_exp(&inner);
                self.drop_trailing(&entry);
                Ok(tir::Exp::new(inner.kind, self.apply(ty)))
            }
            (ast::Exp::Abs(x, body), Type::Fun(a1, a2)) => {
                let entry = ContextEntry::Var(x.clone(), (**a1).clone());
                self.env.push(entry.clone());
                let tbody = self.check(body, a2)?;
                let tbody = self.apply_exp(&tbody);
                self.drop_trailing(&entry);
                Ok(tir::Exp::new(
                    ExpKind::Abs(x.clone(), Box::new(tbody)),
                    self.apply(ty),
                ))
            }
            _ => {
                let inferred = self.infer(e)?;
                let found = self.apply(&inferred.ty);
                let expected = self.apply(ty);
                self.subtype(&found, &expected)?;
                Ok(tir::Exp::new(inferred.kind, self.apply(ty)))
            }
        }
    }

    /// `Γ ⊢ e => A ⊣ Δ`: infer a type for `e`; the returned node's `ty` is
    /// the inferred type after context application.
    pub fn infer(&mut self, e: &ast::Exp) -> Result<tir::Exp> {
        match e {
            ast::Exp::Lit(l) => Ok(tir::Exp::new(ExpKind::Lit(*l), l.ty())),
            ast::Exp::Var(x) => {
                debug!("looking up variable '{}'", x);
                if let Some(ty) = self.lookup_var(x).cloned() {
                    return Ok(tir::Exp::new(ExpKind::Var(x.clone()), self.apply(&ty)));
                }
                if let Some(ty) = self.sig.get(x).cloned() {
                    return Ok(tir::Exp::new(ExpKind::Var(x.clone()), ty));
                }
                // Auto-extend: give an unknown name a fresh existential so
                // unannotated recursive references check. A genuinely
                // unresolved name surfaces later, from the monomorphizer.
                debug!("auto-extending context for '{}'", x);
                let ev = self.fresh_evar();
                self.env.push(ContextEntry::EVar(ev));
                self.env
                    .push(ContextEntry::Var(x.clone(), Type::EVar(ev)));
                Ok(tir::Exp::new(ExpKind::Var(x.clone()), Type::EVar(ev)))
            }
            ast::Exp::Inj(k) => {
                let ty = self
                    .data_injs
                    .get(k)
                    .cloned()
                    .ok_or_else(|| CompilerError::UnknownConstructor(k.clone()))?;
                Ok(tir::Exp::new(ExpKind::Inj(k.clone()), ty))
            }
            ast::Exp::Ann(inner, ty) => {
                let ty = normalize_nullary(ty);
                self.well_formed(&ty)?;
                self.check(inner, &ty)
            }
            ast::Exp::App(e1, e2) => {
                let t1 = self.infer(e1)?;
                let fun_ty = self.apply(&t1.ty);
                let (t2, result) = self.apply_infer(&fun_ty, e2)?;
                Ok(tir::Exp::new(
                    ExpKind::App(Box::new(t1), Box::new(t2)),
                    self.apply(&result),
                ))
            }
            ast::Exp::Abs(x, body) => {
                let param_ev = self.fresh_evar();
                let body_ev = self.fresh_evar();
                self.env.push(ContextEntry::EVar(param_ev));
                self.env.push(ContextEntry::EVar(body_ev));
                let entry = ContextEntry::Var(x.clone(), Type::EVar(param_ev));
                self.env.push(entry.clone());
                let tbody = self.check(body, &Type::EVar(body_ev))?;
                let tbody = self.apply_exp(&tbody);
                self.drop_trailing(&entry);
                let ty = fun(Type::EVar(param_ev), Type::EVar(body_ev));
                Ok(tir::Exp::new(
                    ExpKind::Abs(x.clone(), Box::new(tbody)),
                    self.apply(&ty),
                ))
            }
            ast::Exp::Let(lb, body) => {
                let lam = ast::Exp::fold_abs(&lb.vars, (*lb.rhs).clone());
                let trhs = self.infer(&lam)?;
                let bound_ty = self.apply(&trhs.ty);
                let entry = ContextEntry::Var(lb.name.clone(), bound_ty);
                self.env.push(entry.clone());
                let tbody = self.infer(body)?;
                let result = self.apply(&tbody.ty);
                let tbody = self.apply_exp(&tbody);
                let trhs = self.apply_exp(&trhs);
                self.split_on(&entry);
                Ok(tir::Exp::new(
                    ExpKind::Let {
                        name: lb.name.clone(),
                        rhs: Box::new(trhs),
                        body: Box::new(tbody),
                    },
                    result,
                ))
            }
            ast::Exp::Add(e1, e2) => {
                let int = crate::types::int();
                let t1 = self.check(e1, &int)?;
                let t2 = self.check(e2, &int)?;
                Ok(tir::Exp::new(
                    ExpKind::Add(Box::new(t1), Box::new(t2)),
                    int,
                ))
            }
            ast::Exp::Case(scrut, branches) => {
                if branches.is_empty() {
                    return Err(CompilerError::SyntaxOrShape(
                        "case expression with no branches".to_string(),
                    ));
                }
                let tscrut = self.infer(scrut)?;
                let scrut_ty = self.apply(&tscrut.ty);
                let mut tbranches = Vec::with_capacity(branches.len());
                for branch in branches {
                    tbranches.push(self.infer_branch(branch, &scrut_ty)?);
                }
                // Branch results must agree pairwise, with the context
                // applied between steps.
                let tys: Vec<Type> = tbranches.iter().map(|b| b.body.ty.clone()).collect();
                for pair in tys.windows(2) {
                    let first = self.apply(&pair[0]);
                    let second = self.apply(&pair[1]);
                    self.subtype(&first, &second)?;
                }
                let result = self.apply(&tbranches[0].body.ty);
                let tscrut = self.apply_exp(&tscrut);
                Ok(tir::Exp::new(
                    ExpKind::Case(Box::new(tscrut), tbranches),
                    result,
                ))
            }
        }
    }

    /// `Γ ⊢ A • e =>> C ⊣ Δ`: apply a function of type `ty` to `e`, yielding
    /// the typed argument and the result type.
    fn apply_infer(&mut self, ty: &Type, e: &ast::Exp) -> Result<(tir::Exp, Type)> {
        match ty {
            Type::All(v, body) => {
                let ev = self.fresh_evar();
                self.env.push(ContextEntry::EVar(ev));
                let body = body.subst_var(v, &Type::EVar(ev));
                self.apply_infer(&body, e)
            }
            Type::EVar(ev) => {
                let (ev1, ev2) = self.articulate_fun(*ev);
                let te = self.check(e, &Type::EVar(ev1))?;
                Ok((te, Type::EVar(ev2)))
            }
            Type::Fun(a, c) => {
                let te = self.check(e, a)?;
                Ok((te, (**c).clone()))
            }
            _ => Err(CompilerError::NotAFunction(self.render(ty))),
        }
    }

    // =========================================================================
    // Pattern typing
    // =========================================================================

    /// Type one `case` branch against the scrutinee type. Pattern bindings
    /// stay in the context for the branch body; names are globally unique, so
    /// they cannot shadow anything afterwards.
    fn infer_branch(&mut self, branch: &ast::Branch, scrut_ty: &Type) -> Result<tir::Branch> {
        let tpat = self.check_pattern(&branch.pat, scrut_ty)?;
        let tbody = self.infer(&branch.body)?;
        Ok(tir::Branch {
            pat: tpat,
            body: tbody,
        })
    }

    /// `Γ ⊢ p <= T ⊣ Δ`: check a pattern against the scrutinee type,
    /// extending the context with the pattern's variable bindings.
    fn check_pattern(&mut self, pat: &ast::Pat, ty: &Type) -> Result<tir::Pat> {
        match pat {
            ast::Pat::Var(x) => {
                self.env.push(ContextEntry::Var(x.clone(), ty.clone()));
                Ok(tir::Pat::new(PatKind::Var(x.clone()), self.apply(ty)))
            }
            ast::Pat::Wild => Ok(tir::Pat::new(PatKind::Wild, self.apply(ty))),
            ast::Pat::Lit(l) => {
                let expected = self.apply(ty);
                self.subtype(&l.ty(), &expected)?;
                Ok(tir::Pat::new(PatKind::Lit(*l), self.apply(ty)))
            }
            ast::Pat::Enum(k) => {
                let ctor_ty = self
                    .data_injs
                    .get(k)
                    .cloned()
                    .ok_or_else(|| CompilerError::UnknownConstructor(k.clone()))?;
                let expected = self.apply(ty);
                self.subtype(&ctor_ty, &expected)?;
                Ok(tir::Pat::new(PatKind::Enum(k.clone()), self.apply(ty)))
            }
            ast::Pat::Inj(k, pats) => {
                let mut ctor_ty = self
                    .data_injs
                    .get(k)
                    .cloned()
                    .ok_or_else(|| CompilerError::UnknownConstructor(k.clone()))?;
                // Open the constructor's quantifiers with fresh existentials.
                while let Type::All(v, body) = ctor_ty {
                    let ev = self.fresh_evar();
                    self.env.push(ContextEntry::EVar(ev));
                    ctor_ty = body.subst_var(&v, &Type::EVar(ev));
                }
                // Split into argument types and the data return type.
                let mut arg_tys = Vec::new();
                let mut ret = ctor_ty;
                while let Type::Fun(a, b) = ret {
                    arg_tys.push(*a);
                    ret = *b;
                }
                if pats.len() != arg_tys.len() {
                    return Err(CompilerError::ArityMismatch(
                        k.clone(),
                        arg_tys.len(),
                        pats.len(),
                    ));
                }
                let expected = self.apply(ty);
                self.subtype(&ret, &expected)?;
                let mut tpats = Vec::with_capacity(pats.len());
                for (sub_pat, arg_ty) in pats.iter().zip(&arg_tys) {
                    let arg_ty = self.apply(arg_ty);
                    tpats.push(self.check_pattern(sub_pat, &arg_ty)?);
                }
                Ok(tir::Pat::new(
                    PatKind::Inj(k.clone(), tpats),
                    self.apply(ty),
                ))
            }
        }
    }

    // =========================================================================
    // Top-level driver
    // =========================================================================

    /// Type-check one top-level binding. With a signature in scope the body
    /// is checked against it; otherwise the type is inferred and leftover
    /// existentials are generalized into fresh universals. The local context
    /// is reset to empty before returning.
    pub fn typecheck_bind(&mut self, bind: &ast::TopBind) -> Result<tir::Bind> {
        let result = self.typecheck_bind_inner(bind);
        // The partial context is discarded whether the binding succeeded or
        // an error escaped it.
        self.env.clear();
        result
    }

    fn typecheck_bind_inner(&mut self, bind: &ast::TopBind) -> Result<tir::Bind> {
        debug!("checking binding '{}'", bind.name);
        let lam = ast::Exp::fold_abs(&bind.vars, bind.rhs.clone());

        if let Some(declared) = self.sig.get(&bind.name).cloned() {
            let body = self.check(&lam, &declared)?;
            let body = self.apply_exp(&body);
            Ok(tir::Bind {
                name: bind.name.clone(),
                ty: declared,
                params: Vec::new(),
                body,
            })
        } else {
            let body = self.infer(&lam)?;
            let ty = self.apply(&body.ty);
            let gen_ty = self.generalize(&ty);
            let body = self.apply_exp(&body);
            if !self.is_complete() {
                return Err(CompilerError::AmbiguousPolymorphism(bind.name.clone()));
            }
            debug!(
                "inferred signature {} : {}",
                bind.name,
                format_type(&gen_ty)
            );
            self.sig.insert(bind.name.clone(), gen_ty.clone());
            Ok(tir::Bind {
                name: bind.name.clone(),
                ty: gen_ty,
                params: Vec::new(),
                body,
            })
        }
    }

    /// Quantify the existentials still free in an inferred type: each one is
    /// solved to a fresh universal in the context (so the subsequent IR
    /// application rewrites the body too), and the type is wrapped in the
    /// corresponding `forall`s, outermost first.
    fn generalize(&mut self, ty: &Type) -> Type {
        let free = ty.free_evars();
        let mut names = Vec::with_capacity(free.len());
        for (i, ev) in free.iter().enumerate() {
            let name = gen_var_name(i);
            if self.position_of(&ContextEntry::EVar(*ev)).is_some() {
                self.replace_entry(
                    &ContextEntry::EVar(*ev),
                    vec![ContextEntry::Solved(*ev, Type::Var(name.clone()))],
                );
            } else {
                // The entry fell out of scope; solve at the end instead.
                self.env
                    .push(ContextEntry::Solved(*ev, Type::Var(name.clone())));
            }
            names.push(name);
        }
        let core = self.apply(ty);
        names
            .into_iter()
            .rev()
            .fold(core, |acc, name| forall(&name, acc))
    }

    /// Load one data definition: validate its head and injections, then
    /// register the constructor types closed over the head parameters.
    pub fn load_data_def(&mut self, def: &ast::DataDef) -> Result<()> {
        // The head must be `forall* . D a1 .. an` with distinct parameters
        // applied in binding order.
        let mut params = Vec::new();
        let mut head = &def.ty;
        while let Type::All(v, body) = head {
            params.push(v.clone());
            head = &**body;
        }
        let (data_name, head_args) = match head {
            Type::Data(n, args) => (n.clone(), args.clone()),
            Type::Lit(n) if params.is_empty() => (n.clone(), Vec::new()),
            _ => return Err(CompilerError::BadDataDefinition(format_type(&def.ty))),
        };
        debug!("loading data definition '{}'", data_name);
        if head_args.len() != params.len() {
            return Err(CompilerError::BadDataDefinition(format_type(&def.ty)));
        }
        for (arg, param) in head_args.iter().zip(&params) {
            match arg {
                Type::Var(v) if v == param => {}
                _ => return Err(CompilerError::BadDataDefinition(format_type(&def.ty))),
            }
        }
        for (i, param) in params.iter().enumerate() {
            if params[..i].contains(param) {
                return Err(CompilerError::BadDataDefinition(format_type(&def.ty)));
            }
        }

        for (ctor, ctor_ty) in &def.injs {
            // The return type must be the identical head, order-sensitive.
            let mut ret = ctor_ty;
            while let Type::Fun(_, b) = ret {
                ret = &**b;
            }
            let ret_ok = match ret {
                Type::Data(n, args) => *n == data_name && *args == head_args,
                Type::Lit(n) => params.is_empty() && *n == data_name,
                _ => false,
            };
            if !ret_ok {
                return Err(CompilerError::BadDataDefinition(format_type(ctor_ty)));
            }
            // Every type variable in the injection must be a head parameter.
            for v in ctor_ty.free_vars() {
                if !params.contains(&v) {
                    return Err(CompilerError::UnboundDataParams(ctor.clone()));
                }
            }
            let normalized = normalize_nullary(ctor_ty);
            let closed = params
                .iter()
                .rev()
                .fold(normalized, |acc, p| forall(p, acc));
            self.data_injs.insert(ctor.clone(), closed);
        }
        Ok(())
    }

    /// Run the whole pass: definitions are processed in the given order
    /// (the driver supplies them dependency-first), and each successful
    /// binding extends the signature table for the ones after it.
    pub fn check_program(&mut self, program: &ast::Program) -> Result<tir::Program> {
        let mut binds = Vec::new();
        for def in &program.defs {
            match def {
                ast::Def::Data(d) => self.load_data_def(d)?,
                ast::Def::Sig(name, ty) => {
                    debug!("registering signature {} : {}", name, format_type(ty));
                    let ty = normalize_nullary(ty);
                    self.well_formed(&ty)?;
                    self.sig.insert(name.clone(), ty);
                }
                ast::Def::Bind(b) => binds.push(self.typecheck_bind(b)?),
            }
        }
        Ok(tir::Program::new(binds))
    }
}

/// Well-formedness against a context prefix, with `scope` tracking universals
/// bound while descending under quantifiers.
fn well_formed_in(entries: &[ContextEntry], scope: &mut Vec<String>, ty: &Type) -> Result<()> {
    match ty {
        Type::Lit(_) => Ok(()),
        Type::Var(v) => {
            let in_context = entries
                .iter()
                .any(|e| matches!(e, ContextEntry::TVar(n) if n == v));
            if in_context || scope.contains(v) {
                Ok(())
            } else {
                Err(CompilerError::UnboundTypeVar(v.clone()))
            }
        }
        Type::EVar(ev) => {
            let known = entries.iter().any(|e| match e {
                ContextEntry::EVar(e) => e == ev,
                ContextEntry::Solved(e, _) => e == ev,
                _ => false,
            });
            if known {
                Ok(())
            } else {
                Err(CompilerError::UnknownExistential(format!("{}", ev)))
            }
        }
        Type::Fun(a, b) => {
            well_formed_in(entries, scope, a)?;
            well_formed_in(entries, scope, b)
        }
        Type::All(v, body) => {
            scope.push(v.clone());
            let result = well_formed_in(entries, scope, body);
            scope.pop();
            result
        }
        Type::Data(_, args) => {
            for arg in args {
                well_formed_in(entries, scope, arg)?;
            }
            Ok(())
        }
    }
}

/// Rewrite zero-argument data applications to type literals.
fn normalize_nullary(ty: &Type) -> Type {
    match ty {
        Type::Lit(_) | Type::Var(_) | Type::EVar(_) => ty.clone(),
        Type::Fun(a, b) => fun(normalize_nullary(a), normalize_nullary(b)),
        Type::All(v, body) => Type::All(v.clone(), Box::new(normalize_nullary(body))),
        Type::Data(n, args) if args.is_empty() => Type::Lit(n.clone()),
        Type::Data(n, args) => Type::Data(n.clone(), args.iter().map(normalize_nullary).collect()),
    }
}

/// Names for generalized type variables: `a` .. `z`, then `t26`, `t27`, ...
fn gen_var_name(i: usize) -> String {
    if i < 26 {
        ((b'a' + i as u8) as char).to_string()
    } else {
        format!("t{}", i)
    }
}
