//! Key-addressed store for generated artifacts
//!
//! Producers push generated payloads (script bundles, stylesheets) into a
//! [`Store`] under content-derived keys, a retrieval [`Protocol`] serves them
//! back with cache directives and consumes single-use ones, and a
//! [`Scavenger`] evicts anything older than a threshold.
//!
//! Three backends sit behind the same [`Backend`] contract: a plain
//! directory, a per-user sandboxed container and a database table reached
//! through a [`DbStoreProvider`].

pub mod backend;
pub mod clock;
mod error;
pub mod naming;
pub mod protocol;
mod scavenger;
mod store;
pub mod time_span;
mod types;
mod writer;

pub use backend::{
    Backend, BackendKind, DatabaseBackend, DbConnectionSettings, DbStoreProvider, FileBackend,
    MemoryDbProvider, SandboxScope, SandboxedBackend, DEFAULT_STORE_NAME,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, StoreError};
pub use naming::{content_hash, NamingStrategy};
pub use protocol::{CacheDirective, ConsumptionGuarantee, Protocol, Request, Response, Status};
pub use scavenger::Scavenger;
pub use store::Store;
pub use types::{record_name, Artifact, ArtifactRecord, ContentsEncoding, Longevity};
pub use writer::{ArtifactWriter, DEFAULT_HANDLER_PATH};
