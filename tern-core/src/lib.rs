//! Semantic-analysis core of the Tern compiler.
//!
//! Tern is a small statically-typed functional language (integer and
//! character literals, lambda abstraction, application, let-binding,
//! addition, parameterized algebraic data types with `case`). This crate
//! holds the two passes between the front end and the code generator:
//!
//! - bidirectional type inference and checking with predicative higher-rank
//!   polymorphism over an ordered context ([`types::checker`]);
//! - monomorphization of the typed, lambda-lifted IR
//!   ([`monomorphization`]).
//!
//! Lexing, parsing, renaming, desugaring, lambda lifting, code generation,
//! and the driver CLI are external collaborators: input arrives as an
//! [`ast::Program`] and leaves as a ground [`tir::Program`].

pub mod ast;
pub mod error;
pub mod monomorphization;
pub mod tir;
pub mod types;

pub use error::{CompilerError, Result};
pub use types::checker as type_checker;

#[cfg(test)]
mod integration_tests;

use std::marker::PhantomData;

use indexmap::IndexMap;

use types::checker::TypeChecker;
use types::Type;

// =============================================================================
// Generic ID allocation
// =============================================================================

/// Generic counter for generating unique IDs.
///
/// The ID type must implement `From<u32>` to convert the raw counter value.
#[derive(Debug, Clone)]
pub struct IdSource<Id> {
    next_id: u32,
    _phantom: PhantomData<Id>,
}

impl<Id: From<u32>> IdSource<Id> {
    pub fn new() -> Self {
        IdSource {
            next_id: 0,
            _phantom: PhantomData,
        }
    }

    pub fn next_id(&mut self) -> Id {
        let id = Id::from(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<Id: From<u32>> Default for IdSource<Id> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Typestate pipeline
// =============================================================================
//
// Each struct represents a pipeline stage; methods consume `self` and return
// the next stage, enforcing valid ordering:
//
//   Renamed::new(program)
//     -> .type_check()?          -> TypeChecked
//   (external lambda lifter)
//   Lifted::new(program)
//     -> .monomorphize()?        -> Monomorphized

/// A parsed, desugared, renamed program, ready for type checking.
pub struct Renamed {
    pub program: ast::Program,
}

impl Renamed {
    pub fn new(program: ast::Program) -> Self {
        Renamed { program }
    }

    /// Type-check the program, producing the typed IR and the signature
    /// table (user-provided signatures plus inferred ones).
    pub fn type_check(self) -> Result<TypeChecked> {
        let mut checker = TypeChecker::new();
        let program = checker.check_program(&self.program)?;
        Ok(TypeChecked {
            program,
            sigs: checker.into_sigs(),
        })
    }
}

/// Program has been type checked; every node carries its final type.
pub struct TypeChecked {
    pub program: tir::Program,
    pub sigs: IndexMap<String, Type>,
}

/// A typed program after lambda lifting: every binding is a closed top-level
/// function and bodies contain no `let`. The lifter itself is an external
/// collaborator; this stage is the monomorphizer's entry point.
pub struct Lifted {
    pub program: tir::Program,
}

impl Lifted {
    pub fn new(program: tir::Program) -> Self {
        Lifted { program }
    }

    /// Specialize every polymorphic binding reachable from `main` at the
    /// concrete types it is used at.
    pub fn monomorphize(self) -> Result<Monomorphized> {
        let program = monomorphization::monomorphize(self.program)?;
        Ok(Monomorphized { program })
    }
}

/// Final stage: a closed, monomorphic program for the code generator.
pub struct Monomorphized {
    pub program: tir::Program,
}
