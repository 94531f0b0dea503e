//! Error types shared by the type checker and the monomorphizer.
//!
//! Every error carries its operands pre-rendered (via
//! [`crate::types::format_type`] for types) so that messages never depend on
//! checker state that has already been torn down by the time they surface.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompilerError>;

/// All errors produced by the semantic-analysis core.
///
/// The first group comes out of the type checker, the second out of the
/// monomorphizer. Errors are fail-fast per top-level binding: the first error
/// inside a binding aborts that binding, and the driver decides whether to
/// continue with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilerError {
    /// Malformed input propagated from earlier pipeline stages.
    #[error("syntax or shape error: {0}")]
    SyntaxOrShape(String),

    /// A universal type variable with no `TVar` entry in scope.
    #[error("unbound type variable '{0}'")]
    UnboundTypeVar(String),

    /// An existential that is neither unsolved nor solved in the context.
    #[error("unknown existential {0}")]
    UnknownExistential(String),

    #[error("unknown constructor {0}")]
    UnknownConstructor(String),

    /// A reference to a name that is neither a local nor a known global.
    #[error("unresolved name {0}")]
    UnresolvedName(String),

    /// Subtyping failed: the first type is not a subtype of the second.
    #[error("type mismatch: {0} is not a subtype of {1}")]
    TypeMismatch(String, String),

    #[error("cannot apply an argument to a value of type {0}")]
    NotAFunction(String),

    /// A constructor pattern with the wrong number of argument patterns.
    #[error("constructor {0} expects {1} arguments, got {2}")]
    ArityMismatch(String, usize, usize),

    /// The context still holds unsolved existentials after inferring an
    /// unannotated top-level binding.
    #[error("ambiguous polymorphism in binding {0}")]
    AmbiguousPolymorphism(String),

    /// A data declaration whose head or injections violate the required
    /// `forall* . D a1 .. an` shape.
    #[error("malformed data definition: {0}")]
    BadDataDefinition(String),

    /// An injection mentions type variables not bound by its data head.
    #[error("constructor {0} mentions type variables not bound by its data head")]
    UnboundDataParams(String),

    /// The declared type of a binding and the call-site type disagree in
    /// shape. Indicates a bug in an earlier stage.
    #[error("structural type mismatch while specializing: {0}")]
    StructuralTypeMismatch(String),

    /// A type variable survived into monomorphization without a mapping.
    /// Indicates a bug in an earlier stage.
    #[error("unmapped type variable '{0}' during monomorphization")]
    UnmappedTypeVariable(String),

    /// A binding was demanded at a type that is not ground.
    #[error("cannot specialize {0} at the polymorphic type {1}")]
    PolymorphicSpecialization(String, String),

    #[error("program has no main binding")]
    MissingMain,

    /// `let` must be removed by lambda lifting before monomorphization.
    #[error("let bindings are not supported by monomorphization (in {0})")]
    LetNotSupported(String),
}
