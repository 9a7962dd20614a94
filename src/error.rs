use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::{Ident, Span};

fn source_span(span: Span) -> SourceSpan {
    (span.start, span.end - span.start).into()
}

/// Source error recorded on a CFG during lowering. Lowering keeps going after
/// recording one so that a single run surfaces every independent mistake; the
/// code generator refuses to emit anything for a program that carries any.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum SemanticError {
    #[error("variable `{name}` is already declared in this scope")]
    Redeclared {
        name: String,
        #[label("redeclared here")]
        span: SourceSpan,
    },
    #[error("variable `{name}` is not declared")]
    Undeclared {
        name: String,
        #[label("used here")]
        span: SourceSpan,
    },
    #[error("variable `{name}` is read before being initialized")]
    Uninitialized {
        name: String,
        #[label("read here")]
        span: SourceSpan,
    },
    #[error("function `{name}` expects {expected} argument(s), but {found} were passed")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        #[label("called here")]
        span: SourceSpan,
    },
}

impl SemanticError {
    pub fn redeclared(name: &Ident) -> Self {
        Self::Redeclared {
            name: name.item.clone(),
            span: source_span(name.span),
        }
    }

    pub fn undeclared(name: &Ident) -> Self {
        Self::Undeclared {
            name: name.item.clone(),
            span: source_span(name.span),
        }
    }

    pub fn uninitialized(name: &Ident) -> Self {
        Self::Uninitialized {
            name: name.item.clone(),
            span: source_span(name.span),
        }
    }

    pub fn arity_mismatch(name: &Ident, expected: usize, found: usize, span: Span) -> Self {
        Self::ArityMismatch {
            name: name.item.clone(),
            expected,
            found,
            span: source_span(span),
        }
    }
}

/// Structural error that aborts lowering for the whole program immediately,
/// unlike [`SemanticError`]s which accumulate.
#[derive(Debug, Error, Diagnostic)]
pub enum ProgramError {
    #[error("function `{name}` declares {count} parameters; at most 6 are supported")]
    TooManyParams {
        name: String,
        count: usize,
        #[label("declared here")]
        span: SourceSpan,
    },
    #[error("function `{name}` is called with {count} arguments; at most 6 are supported")]
    TooManyArgs {
        name: String,
        count: usize,
        #[label("called here")]
        span: SourceSpan,
    },
    #[error("function `{name}` is defined more than once")]
    DuplicateFunction {
        name: String,
        #[label("second definition")]
        span: SourceSpan,
    },
}

impl ProgramError {
    pub fn too_many_params(name: &Ident, count: usize) -> Self {
        Self::TooManyParams {
            name: name.item.clone(),
            count,
            span: source_span(name.span),
        }
    }

    pub fn too_many_args(name: &Ident, count: usize, span: Span) -> Self {
        Self::TooManyArgs {
            name: name.item.clone(),
            count,
            span: source_span(span),
        }
    }

    pub fn duplicate_function(name: &Ident) -> Self {
        Self::DuplicateFunction {
            name: name.item.clone(),
            span: source_span(name.span),
        }
    }
}
