#![forbid(unsafe_code)]

//! Error values reported by the runtime.
//!
//! Graph and store operations report these as `!ERR` events (see
//! [`EventStream::error`](crate::EventStream::error)) and keep running. Only
//! the executor entry points ([`Trax::block_on`](crate::Trax::block_on),
//! [`Trax::run_until_stalled`](crate::Trax::run_until_stalled)) also return
//! them.

use thiserror::Error;

/// Boxed error returned by processor bodies and callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result of a processor body.
pub type ComputeResult = Result<(), BoxError>;

#[derive(Debug, Clone, Error)]
pub enum TraxError {
    // -- identity --
    #[error("Invalid trax id: \"{original}\" changed to \"{sanitized}\"")]
    InvalidId { original: String, sanitized: String },

    #[error("Invalid id: \"{id}\" is reserved")]
    ReservedId { id: String },

    #[error("Duplicate store id \"{id}\": store created as \"{assigned}\"")]
    DuplicateStoreId { id: String, assigned: String },

    // -- ownership --
    #[error("Computed property conflict: {object_id}.{prop} can only be set by {owner}")]
    ComputedPropertyConflict {
        object_id: String,
        prop: String,
        owner: String,
    },

    #[error("Computed content conflict: {object_id} can only be changed by {owner}")]
    ComputedContentConflict { object_id: String, owner: String },

    // -- graph --
    #[error("({processor_id}) Circular reference: Processors cannot run twice during reconciliation")]
    CircularReference { processor_id: String },

    #[error("({processor_id}) No dependencies found: processor will never be re-executed")]
    NoDependencies { processor_id: String },

    #[error("({object_id}) Invalid array length: {length}")]
    InvalidArrayLength { object_id: String, length: f64 },

    // -- lifecycle --
    #[error("({store_id}) Store disposed: {operation} ignored")]
    StoreDisposed { store_id: String, operation: String },

    #[error("({store_id}) Store.remove: root objects cannot be removed")]
    RootRemoval { store_id: String },

    #[error("({store_id}) Store.remove: {object_id} does not belong to this store")]
    ForeignObject { store_id: String, object_id: String },

    #[error("({store_id}) Store.add: invalid init value for \"{id}\" (object or array expected)")]
    InvalidInitValue { store_id: String, id: String },

    #[error("({store_id}) createStore init function must define a root object - see Store::init")]
    MissingRoot { store_id: String },

    #[error("({context_id}) Invalid processing context transition: {action} from {state}")]
    ContextTransition {
        context_id: String,
        action: &'static str,
        state: &'static str,
    },

    #[error("({context_id}) Unclosed processing context")]
    UnclosedContext { context_id: String },

    #[error("Event type cannot start with reserved prefix: {kind}")]
    ReservedEventType { kind: String },

    #[error("Event stream: invalid event data for {kind}: {reason}")]
    InvalidEventData { kind: String, reason: String },

    #[error("Executor busy: {operation} cannot run from inside a runtime task")]
    ExecutorBusy { operation: &'static str },

    // -- compute --
    #[error("({processor_id}) Compute error: {reason}")]
    Compute { processor_id: String, reason: String },

    #[error("({processor_id}) onDirty callback execution error: {reason}")]
    OnDirty { processor_id: String, reason: String },

    #[error("({store_id}) Action error in {action}: {reason}")]
    Action {
        store_id: String,
        action: String,
        reason: String,
    },
}

impl TraxError {
    /// Category label used in the `tracing` mirror of `!ERR` events.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidId { .. } | Self::ReservedId { .. } | Self::DuplicateStoreId { .. } => {
                "identity"
            }
            Self::ComputedPropertyConflict { .. } | Self::ComputedContentConflict { .. } => {
                "ownership"
            }
            Self::CircularReference { .. }
            | Self::NoDependencies { .. }
            | Self::InvalidArrayLength { .. } => "graph",
            Self::StoreDisposed { .. }
            | Self::RootRemoval { .. }
            | Self::ForeignObject { .. }
            | Self::InvalidInitValue { .. }
            | Self::MissingRoot { .. }
            | Self::ContextTransition { .. }
            | Self::UnclosedContext { .. }
            | Self::ReservedEventType { .. }
            | Self::ExecutorBusy { .. } => "lifecycle",
            Self::InvalidEventData { .. }
            | Self::Compute { .. }
            | Self::OnDirty { .. }
            | Self::Action { .. } => "compute",
        }
    }
}
