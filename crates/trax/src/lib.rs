#![forbid(unsafe_code)]

//! trax public facade.
//!
//! Re-exports the runtime and adds [`global`], one shared [`Trax`] per thread
//! for application code that does not want to thread a handle around.

pub use trax_core::*;

pub mod prelude {
    pub use trax_core::{
        AddOptions, ComputeContext, ComputeFn, ComputeResult, ComputeTrigger, EventMatch,
        EventStream, ObjectKind, Processor, ProcessorOptions, Store, StreamEvent, Trax,
        TraxConfig, TraxError, TraxObject, Value, defer,
    };
}

thread_local! {
    static GLOBAL: Trax = Trax::default();
}

/// Runtime shared by every caller on this thread.
///
/// ```
/// use serde_json::json;
///
/// let store = trax::global().create_store_from("Prefs", json!({"dark": false}));
/// assert!(trax::global().get_store("Prefs").is_some());
/// # drop(store);
/// ```
#[must_use]
pub fn global() -> Trax {
    GLOBAL.with(Trax::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_shared_per_thread() {
        let store = global().create_store_from("Shared", serde_json::json!({"n": 1}));
        let found = global().get_store("Shared").unwrap();
        assert_eq!(found.id(), store.id());

        let other = std::thread::spawn(|| global().get_store("Shared").is_none())
            .join()
            .unwrap();
        assert!(other);
    }
}
