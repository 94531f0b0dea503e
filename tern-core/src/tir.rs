//! The typed IR.
//!
//! Every expression, pattern, and binding carries its type. The checker
//! produces this IR with all parameters folded into `Abs` nodes; the external
//! lambda lifter may unfold them back into `params`; the monomorphizer
//! accepts either form and emits fully ground types throughout.

use crate::ast::Literal;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub binds: Vec<Bind>,
}

impl Program {
    pub fn new(binds: Vec<Bind>) -> Program {
        Program { binds }
    }

    pub fn get_bind(&self, name: &str) -> Option<&Bind> {
        self.binds.iter().find(|b| b.name == name)
    }
}

/// A top-level binding with its declared (possibly polymorphic) type.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub name: String,
    pub ty: Type,
    pub params: Vec<Param>,
    pub body: Exp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A typed expression: the node shape plus its type.
#[derive(Debug, Clone, PartialEq)]
pub struct Exp {
    pub ty: Type,
    pub kind: ExpKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    Lit(Literal),
    Var(String),
    Inj(String),
    App(Box<Exp>, Box<Exp>),
    Abs(String, Box<Exp>),
    Let {
        name: String,
        rhs: Box<Exp>,
        body: Box<Exp>,
    },
    Add(Box<Exp>, Box<Exp>),
    Case(Box<Exp>, Vec<Branch>),
}

impl Exp {
    pub fn new(kind: ExpKind, ty: Type) -> Exp {
        Exp { ty, kind }
    }

    /// Rewrite every type annotation in the tree with `f`.
    pub fn map_types(&self, f: &mut impl FnMut(&Type) -> Type) -> Exp {
        let kind = match &self.kind {
            ExpKind::Lit(l) => ExpKind::Lit(*l),
            ExpKind::Var(x) => ExpKind::Var(x.clone()),
            ExpKind::Inj(k) => ExpKind::Inj(k.clone()),
            ExpKind::App(e1, e2) => {
                ExpKind::App(Box::new(e1.map_types(f)), Box::new(e2.map_types(f)))
            }
            ExpKind::Abs(x, body) => ExpKind::Abs(x.clone(), Box::new(body.map_types(f))),
            ExpKind::Let { name, rhs, body } => ExpKind::Let {
                name: name.clone(),
                rhs: Box::new(rhs.map_types(f)),
                body: Box::new(body.map_types(f)),
            },
            ExpKind::Add(e1, e2) => {
                ExpKind::Add(Box::new(e1.map_types(f)), Box::new(e2.map_types(f)))
            }
            ExpKind::Case(scrut, branches) => ExpKind::Case(
                Box::new(scrut.map_types(f)),
                branches
                    .iter()
                    .map(|b| Branch {
                        pat: b.pat.map_types(f),
                        body: b.body.map_types(f),
                    })
                    .collect(),
            ),
        };
        Exp {
            ty: f(&self.ty),
            kind,
        }
    }

    /// Visit every type annotation in the tree.
    pub fn for_each_type(&self, f: &mut impl FnMut(&Type)) {
        f(&self.ty);
        match &self.kind {
            ExpKind::Lit(_) | ExpKind::Var(_) | ExpKind::Inj(_) => {}
            ExpKind::App(e1, e2) | ExpKind::Add(e1, e2) => {
                e1.for_each_type(f);
                e2.for_each_type(f);
            }
            ExpKind::Abs(_, body) => body.for_each_type(f),
            ExpKind::Let { rhs, body, .. } => {
                rhs.for_each_type(f);
                body.for_each_type(f);
            }
            ExpKind::Case(scrut, branches) => {
                scrut.for_each_type(f);
                for b in branches {
                    b.pat.for_each_type(f);
                    b.body.for_each_type(f);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pat: Pat,
    pub body: Exp,
}

/// A typed pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pat {
    pub ty: Type,
    pub kind: PatKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatKind {
    Var(String),
    Wild,
    Lit(Literal),
    Enum(String),
    Inj(String, Vec<Pat>),
}

impl Pat {
    pub fn new(kind: PatKind, ty: Type) -> Pat {
        Pat { ty, kind }
    }

    pub fn map_types(&self, f: &mut impl FnMut(&Type) -> Type) -> Pat {
        let kind = match &self.kind {
            PatKind::Var(x) => PatKind::Var(x.clone()),
            PatKind::Wild => PatKind::Wild,
            PatKind::Lit(l) => PatKind::Lit(*l),
            PatKind::Enum(k) => PatKind::Enum(k.clone()),
            PatKind::Inj(k, pats) => {
                PatKind::Inj(k.clone(), pats.iter().map(|p| p.map_types(f)).collect())
            }
        };
        Pat {
            ty: f(&self.ty),
            kind,
        }
    }

    pub fn for_each_type(&self, f: &mut impl FnMut(&Type)) {
        f(&self.ty);
        if let PatKind::Inj(_, pats) = &self.kind {
            for p in pats {
                p.for_each_type(f);
            }
        }
    }

    /// Names bound by this pattern.
    pub fn bound_names(&self) -> Vec<String> {
        match &self.kind {
            PatKind::Var(x) => vec![x.clone()],
            PatKind::Wild | PatKind::Lit(_) | PatKind::Enum(_) => Vec::new(),
            PatKind::Inj(_, pats) => pats.iter().flat_map(Pat::bound_names).collect(),
        }
    }
}
