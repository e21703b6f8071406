//! Execution context threaded through collaborator calls.

use tracing::Span;

/// Diagnostic context for one cache operation.
///
/// Carries a [`tracing`] span so that work a collaborator performs on
/// behalf of this operation (say, a member reader issuing SQL) is
/// attributed to it. The context is passed explicitly to the calls that
/// need it and carries no invalidation semantics; the span closes when
/// the context is dropped, on every exit path.
#[derive(Debug)]
pub struct ExecutionContext {
    span: Span,
}

impl ExecutionContext {
    /// Open a context for the named operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            span: tracing::debug_span!("cache_operation", operation),
        }
    }

    /// Enter the context's span for the current scope.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// The span attributing work to this operation.
    pub fn span(&self) -> &Span {
        &self.span
    }
}
