//! A bridge that lets an unmodified native host runtime execute its JavaScript on an external
//! managed engine. It provides:
//! - A generation-checked handle table with stack-disciplined scopes ([`HandleTable`], [`Local`],
//!   [`Persistent`])
//! - A boundary dispatcher marshaling calls/data in both directions, re-entrant to any depth
//!   ([`BoundaryCx`], [`NativeCallbackRegistry`])
//! - An embedding API shim: isolates, contexts, handle scopes, templates ([`Isolate`])
//! - Cooperative termination primitives ([`TerminationHandle`])
//! - An optional per-call-site boundary profiler ([`BoundaryProfiler`])
//!
//! # Handle validity
//!
//! A handle is a packed `{ index, generation }` into the isolate's handle table. Closing the
//! scope that owns a local handle frees its slot and bumps the slot generation, so a stale handle
//! is always detectable: resolving it fails with [`Violation::InvalidHandle`] instead of
//! returning whatever value later reused the slot. Persistent handles are reference counted and
//! survive scope closure until released.
//!
//! # The boundary
//!
//! The managed engine sits behind the [`ManagedEngine`] contract and is never inspected beyond
//! it. Primitives cross the boundary by value, strings by a single encoding-conversion copy, and
//! objects/functions as handles only. Script exceptions cross as values
//! ([`BridgeError::Exception`]); misuse of the boundary itself is a fatal
//! [`BridgeError::Violation`] and is never downgraded to a script exception.

mod dispatch;
mod engine;
mod error;
mod handle;
mod interrupt;
mod isolate;
mod modules;
mod profiler;
mod table;
mod template;

pub use crate::dispatch::BoundaryCx;
pub use crate::dispatch::NativeCallbackFn;
pub use crate::dispatch::NativeCallbackMeta;
pub use crate::dispatch::NativeCallbackRegistry;
pub use crate::engine::EngineError;
pub use crate::engine::FunctionRef;
pub use crate::engine::HostBoundary;
pub use crate::engine::ManagedEngine;
pub use crate::engine::ManagedString;
pub use crate::engine::ManagedValue;
pub use crate::engine::NativeCallbackId;
pub use crate::engine::ObjectRef;
pub use crate::error::BridgeError;
pub use crate::error::Termination;
pub use crate::error::Violation;
pub use crate::handle::HandleId;
pub use crate::handle::Local;
pub use crate::handle::Persistent;
pub use crate::handle::ScopeId;
pub use crate::interrupt::TerminationHandle;
pub use crate::interrupt::TerminationToken;
pub use crate::isolate::ContextId;
pub use crate::isolate::Isolate;
pub use crate::isolate::IsolateOptions;
pub use crate::isolate::IsolateState;
pub use crate::modules::CoreModuleRegistry;
pub use crate::profiler::BoundaryProfiler;
pub use crate::profiler::CallSite;
pub use crate::profiler::Direction;
pub use crate::profiler::LatencyHistogram;
pub use crate::profiler::ProfileRecord;
pub use crate::table::HandleTable;
pub use crate::table::HandleTableLimits;
pub use crate::template::TemplateId;
pub use crate::template::TemplateProperty;
