#![forbid(unsafe_code)]

//! Core: tracked object graph, processors, stores, reconciliation and the
//! causal event log.

pub mod config;
pub mod error;
pub mod linked_list;
pub mod object;
pub mod processor;
pub mod runtime;
pub mod store;
pub mod stream;
pub mod value;
pub mod wrapper;

pub use config::TraxConfig;
pub use error::{BoxError, ComputeResult, TraxError};
pub use object::{DICT_SIZE, MAX_ARRAY_LENGTH, ObjectKind, TraxObject};
pub use processor::{ComputeContext, ComputeFn, ComputeTrigger, Processor, ProcessorOptions};
pub use runtime::{Trax, TraxHandle, TraxObjectType};
pub use store::{AddOptions, ContentFn, Store};
pub use stream::{EventMatch, EventStream, EventStreamConfig, StreamEvent, TraxEvent};
pub use value::{ExternalRef, Value};
pub use wrapper::{defer, run_sync};
