//! Correlation context threaded through a request/turn/tick for tracing.

use tracing::Span;
use uuid::Uuid;

/// A correlation id plus the component and operation it was created for,
/// used to open a consistent `tracing` span at request/turn/tick/decision
/// boundaries (Gateway requests, Agent Runtime turns, Scheduler ticks,
/// Access Policy decisions).
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Uuid,
    component: &'static str,
    operation: Option<&'static str>,
}

impl RequestContext {
    /// Start a new context for `component` (e.g. `"gateway"`, `"runtime"`).
    #[must_use]
    pub fn new(component: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            component,
            operation: None,
        }
    }

    /// Attach the specific operation being performed (e.g. `"post_message"`).
    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    /// The correlation id other log lines for this request should carry.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Build the `tracing::Span` this context's operations should run under.
    #[must_use]
    pub fn span(&self) -> Span {
        match self.operation {
            Some(op) => tracing::info_span!("request", component = self.component, operation = op, request_id = %self.id),
            None => tracing::info_span!("request", component = self.component, request_id = %self.id),
        }
    }

    /// Enter the context's span for the remainder of the current scope.
    #[must_use]
    pub fn enter(&self) -> RequestGuard {
        RequestGuard {
            _entered: self.span().entered(),
        }
    }
}

/// RAII guard keeping a [`RequestContext`]'s span entered.
pub struct RequestGuard {
    _entered: tracing::span::EnteredSpan,
}
