//! Type system definitions and utilities for Tern.
//!
//! This module contains:
//! - `Type`: the type language (literals, variables, existentials, functions,
//!   quantifiers, applied data constructors)
//! - Helper functions for creating common types (`int`, `fun`, `forall`, ...)
//! - The bidirectional type checker (`checker` submodule)

pub mod checker;

#[cfg(test)]
mod checker_tests;

use std::fmt;

use itertools::Itertools;

/// Unique identifier for existential (unification) variables.
///
/// Existentials are allocated by a monotonic counter while the checker runs,
/// so ids never collide within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EVarId(pub u32);

impl From<u32> for EVarId {
    fn from(id: u32) -> Self {
        EVarId(id)
    }
}

impl fmt::Display for EVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// The Tern type language.
///
/// `Var` is a rigid universal variable bound by an enclosing `All`; `EVar` is
/// an existential introduced during inference and solved to a monotype by the
/// ordered context. Nullary data types are represented as `Lit` (the data
/// loader normalizes zero-argument `Data` heads), so `Data` always carries at
/// least one argument downstream of the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Primitive type constant: `Int`, `Char`, or a nullary user data type.
    Lit(String),
    /// Universal (rigid) type variable.
    Var(String),
    /// Existential (unification) variable.
    EVar(EVarId),
    /// Function type, right-associative.
    Fun(Box<Type>, Box<Type>),
    /// Universal quantifier; may appear at any depth (higher rank).
    All(String, Box<Type>),
    /// Applied data constructor.
    Data(String, Vec<Type>),
}

impl Type {
    /// A type is a monotype iff it contains no quantifier.
    pub fn is_monotype(&self) -> bool {
        match self {
            Type::Lit(_) | Type::Var(_) | Type::EVar(_) => true,
            Type::Fun(a, b) => a.is_monotype() && b.is_monotype(),
            Type::All(_, _) => false,
            Type::Data(_, args) => args.iter().all(Type::is_monotype),
        }
    }

    /// A type is ground when it contains no variables of any kind.
    pub fn is_ground(&self) -> bool {
        match self {
            Type::Lit(_) => true,
            Type::Var(_) | Type::EVar(_) | Type::All(_, _) => false,
            Type::Fun(a, b) => a.is_ground() && b.is_ground(),
            Type::Data(_, args) => args.iter().all(Type::is_ground),
        }
    }

    /// Free existentials in order of first appearance, deduplicated.
    pub fn free_evars(&self) -> Vec<EVarId> {
        let mut acc = Vec::new();
        self.collect_evars(&mut acc);
        acc
    }

    fn collect_evars(&self, acc: &mut Vec<EVarId>) {
        match self {
            Type::Lit(_) | Type::Var(_) => {}
            Type::EVar(ev) => {
                if !acc.contains(ev) {
                    acc.push(*ev);
                }
            }
            Type::Fun(a, b) => {
                a.collect_evars(acc);
                b.collect_evars(acc);
            }
            Type::All(_, body) => body.collect_evars(acc),
            Type::Data(_, args) => {
                for arg in args {
                    arg.collect_evars(acc);
                }
            }
        }
    }

    pub fn contains_evar(&self, ev: EVarId) -> bool {
        match self {
            Type::Lit(_) | Type::Var(_) => false,
            Type::EVar(e) => *e == ev,
            Type::Fun(a, b) => a.contains_evar(ev) || b.contains_evar(ev),
            Type::All(_, body) => body.contains_evar(ev),
            Type::Data(_, args) => args.iter().any(|a| a.contains_evar(ev)),
        }
    }

    /// Free universal variables (those not bound by an enclosing `All`).
    pub fn free_vars(&self) -> Vec<String> {
        fn go(ty: &Type, bound: &mut Vec<String>, acc: &mut Vec<String>) {
            match ty {
                Type::Lit(_) | Type::EVar(_) => {}
                Type::Var(v) => {
                    if !bound.contains(v) && !acc.contains(v) {
                        acc.push(v.clone());
                    }
                }
                Type::Fun(a, b) => {
                    go(a, bound, acc);
                    go(b, bound, acc);
                }
                Type::All(v, body) => {
                    bound.push(v.clone());
                    go(body, bound, acc);
                    bound.pop();
                }
                Type::Data(_, args) => {
                    for arg in args {
                        go(arg, bound, acc);
                    }
                }
            }
        }
        let mut acc = Vec::new();
        go(self, &mut Vec::new(), &mut acc);
        acc
    }

    /// Substitute `replacement` for the free universal variable `name`.
    /// Shadowing quantifiers stop the substitution.
    pub fn subst_var(&self, name: &str, replacement: &Type) -> Type {
        match self {
            Type::Lit(_) | Type::EVar(_) => self.clone(),
            Type::Var(v) => {
                if v == name {
                    replacement.clone()
                } else {
                    self.clone()
                }
            }
            Type::Fun(a, b) => fun(a.subst_var(name, replacement), b.subst_var(name, replacement)),
            Type::All(v, body) => {
                if v == name {
                    self.clone()
                } else {
                    Type::All(v.clone(), Box::new(body.subst_var(name, replacement)))
                }
            }
            Type::Data(n, args) => Type::Data(
                n.clone(),
                args.iter().map(|a| a.subst_var(name, replacement)).collect(),
            ),
        }
    }

}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_type(self))
    }
}

// =============================================================================
// Type helper functions
// =============================================================================

pub fn int() -> Type {
    Type::Lit("Int".to_string())
}

pub fn char_type() -> Type {
    Type::Lit("Char".to_string())
}

pub fn lit(name: &str) -> Type {
    Type::Lit(name.to_string())
}

pub fn var(name: &str) -> Type {
    Type::Var(name.to_string())
}

pub fn fun(param: Type, result: Type) -> Type {
    Type::Fun(Box::new(param), Box::new(result))
}

pub fn forall(name: &str, body: Type) -> Type {
    Type::All(name.to_string(), Box::new(body))
}

pub fn data(name: &str, args: Vec<Type>) -> Type {
    Type::Data(name.to_string(), args)
}

/// Format a type for display and error messages.
pub fn format_type(ty: &Type) -> String {
    match ty {
        Type::Lit(name) => name.clone(),
        Type::Var(name) => name.clone(),
        Type::EVar(ev) => format!("{}", ev),
        Type::Fun(a, b) => {
            // Parenthesize a function or quantifier on the left of an arrow.
            let a_str = match **a {
                Type::Fun(_, _) | Type::All(_, _) => format!("({})", format_type(a)),
                _ => format_type(a),
            };
            format!("{} -> {}", a_str, format_type(b))
        }
        Type::All(name, body) => {
            // Group consecutive quantifiers: `forall a b. ...`
            let mut names = vec![name.clone()];
            let mut inner: &Type = body;
            while let Type::All(n, b) = inner {
                names.push(n.clone());
                inner = &**b;
            }
            format!("forall {}. {}", names.join(" "), format_type(inner))
        }
        Type::Data(name, args) if args.is_empty() => name.clone(),
        Type::Data(name, args) => {
            let args_str = args
                .iter()
                .map(|a| match a {
                    Type::Fun(_, _) | Type::All(_, _) | Type::Data(_, _) => {
                        format!("({})", format_type(a))
                    }
                    _ => format_type(a),
                })
                .join(" ");
            format!("{} {}", name, args_str)
        }
    }
}
