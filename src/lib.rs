//! # flagcore
//!
//! A client-side feature-flag evaluation engine: given a declarative datafile and a
//! caller-supplied context, decides whether a feature is enabled, which variation is
//! assigned, and what each typed variable resolves to.
//!
//! The evaluation pipeline ([`evaluation`]) is deterministic and pure; it never
//! throws, encoding every failure mode in its `reason` field instead. [`instance`]
//! wires that pipeline up to a mutable datafile store, sticky/initial override
//! tables, a background refresher, and an event emitter.
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> flagcore::error::Result<()> {
//! use flagcore::instance::{Instance, Options};
//! use flagcore::model::Datafile;
//! use flagcore::types::{AttributeValue, Context};
//!
//! let datafile: Datafile = serde_json::from_str(r#"{
//!     "schemaVersion": "1",
//!     "revision": "1",
//!     "attributes": [],
//!     "segments": [],
//!     "features": []
//! }"#)?;
//!
//! let instance = Instance::new(Options {
//!     datafile: Some(datafile),
//!     ..Options::default()
//! }).await?;
//!
//! let mut ctx = Context::new();
//! ctx.insert("userId", AttributeValue::String("user-123".into()));
//! let _ = instance.is_enabled("my-feature", &ctx);
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod emitter;
pub mod error;
pub mod evaluation;
pub mod force;
pub mod instance;
pub mod model;
pub mod overrides;
pub mod targeting;
pub mod traffic;
pub mod types;

pub use error::{Error, Result};
pub use instance::{DatafileFetcher, Instance, Options};
