//! The source IR consumed by the type checker.
//!
//! Programs arrive here already lexed, parsed, desugared, and renamed by the
//! surrounding pipeline: operators are desugared to `Add`, pattern groups to
//! `Case`, and every binder carries a globally unique name. Identifiers are
//! opaque strings with no position info; errors reference them by rendered
//! form.

use crate::types::Type;

/// Literals of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Char(char),
}

impl Literal {
    /// The type of a literal.
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => crate::types::int(),
            Literal::Char(_) => crate::types::char_type(),
        }
    }
}

/// Expressions of the renamed, desugared source language.
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Lit(Literal),
    /// Term variable reference.
    Var(String),
    /// Constructor (injection) reference.
    Inj(String),
    /// Type annotation.
    Ann(Box<Exp>, Type),
    App(Box<Exp>, Box<Exp>),
    Abs(String, Box<Exp>),
    Let(LetBind, Box<Exp>),
    Add(Box<Exp>, Box<Exp>),
    Case(Box<Exp>, Vec<Branch>),
}

impl Exp {
    pub fn int(n: i64) -> Exp {
        Exp::Lit(Literal::Int(n))
    }

    pub fn ch(c: char) -> Exp {
        Exp::Lit(Literal::Char(c))
    }

    pub fn var(name: &str) -> Exp {
        Exp::Var(name.to_string())
    }

    pub fn inj(name: &str) -> Exp {
        Exp::Inj(name.to_string())
    }

    pub fn ann(e: Exp, ty: Type) -> Exp {
        Exp::Ann(Box::new(e), ty)
    }

    pub fn app(f: Exp, arg: Exp) -> Exp {
        Exp::App(Box::new(f), Box::new(arg))
    }

    pub fn abs(param: &str, body: Exp) -> Exp {
        Exp::Abs(param.to_string(), Box::new(body))
    }

    pub fn add(lhs: Exp, rhs: Exp) -> Exp {
        Exp::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn case_of(scrutinee: Exp, branches: Vec<Branch>) -> Exp {
        Exp::Case(Box::new(scrutinee), branches)
    }

    /// Wrap `body` in lambdas for `vars`, innermost-last.
    pub fn fold_abs(vars: &[String], body: Exp) -> Exp {
        vars.iter()
            .rev()
            .fold(body, |acc, v| Exp::Abs(v.clone(), Box::new(acc)))
    }
}

/// A (non-recursive) local binding: `let name v1 .. vn = rhs in body`.
#[derive(Debug, Clone, PartialEq)]
pub struct LetBind {
    pub name: String,
    pub vars: Vec<String>,
    pub rhs: Box<Exp>,
}

/// Patterns appearing in `case` branches.
#[derive(Debug, Clone, PartialEq)]
pub enum Pat {
    /// Bind the scrutinee to a variable.
    Var(String),
    /// Wildcard; matches anything, binds nothing.
    Wild,
    Lit(Literal),
    /// Nullary constructor.
    Enum(String),
    /// Constructor applied to argument patterns.
    Inj(String, Vec<Pat>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pat: Pat,
    pub body: Exp,
}

impl Branch {
    pub fn new(pat: Pat, body: Exp) -> Branch {
        Branch { pat, body }
    }
}

/// A data declaration.
///
/// `ty` is the head, syntactically `forall* . D a1 .. an` with distinct bound
/// parameters; each injection's type ends in the identical head. The checker
/// validates both and rejects anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDef {
    pub ty: Type,
    pub injs: Vec<(String, Type)>,
}

/// A top-level binding: `name v1 .. vn = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopBind {
    pub name: String,
    pub vars: Vec<String>,
    pub rhs: Exp,
}

impl TopBind {
    pub fn new(name: &str, vars: &[&str], rhs: Exp) -> TopBind {
        TopBind {
            name: name.to_string(),
            vars: vars.iter().map(|v| v.to_string()).collect(),
            rhs,
        }
    }
}

/// Top-level definitions, in dependency order.
///
/// A `Sig` for a binding must precede the binding itself; the surrounding
/// driver guarantees the ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Data(DataDef),
    Sig(String, Type),
    Bind(TopBind),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub defs: Vec<Def>,
}

impl Program {
    pub fn new(defs: Vec<Def>) -> Program {
        Program { defs }
    }
}
