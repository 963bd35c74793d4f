// ============================================================================
// Context Handles
// ============================================================================
//
// A context wraps one adapter and owns at most one live client at a time.
// It counts nested acquisitions and hands the client back to the adapter
// only when the count returns to zero:
//
//   depth 0 ──acquire──> depth 1 ──acquire──> depth 2
//      ^                   │  ^                  │
//      └──release (frees)──┘  └────release───────┘
//
// Invariant: depth > 0 implies the slot holds a client unless it was
// explicitly invalidated.
//
// ============================================================================

mod asynchronous;
pub(crate) mod guard;
mod sync;

pub use asynchronous::AsyncContext;
pub use sync::Context;
