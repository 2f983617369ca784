//! Tycho — multi-session agent core.
//!
//! One conversational agent holding many independent, concurrent
//! conversations, each able to invoke tools exposed by a dynamic set of
//! external tool-provider servers. Every tool invocation passes through an
//! approval gate, and the agent's provider-agnostic conversation history is
//! translated on demand into whatever wire format the bound model backend
//! requires.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tycho::prelude::*;
//!
//! # #[derive(Clone)] struct MyRunner;
//! # #[async_trait::async_trait]
//! # impl ModelRunner for MyRunner {
//! #     async fn invoke(&self, _: &ProviderPayload, _: &[ToolSchema]) -> tycho::error::Result<ModelTurn> {
//! #         Ok(ModelTurn::text_only("hi"))
//! #     }
//! # }
//! # async fn example() -> tycho::error::Result<()> {
//! let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
//! let manager = Arc::new(ConnectionManager::new());
//! let gate = Arc::new(ConfirmationGate::new(store.clone(), GateConfig::default(), None));
//! let ctx = SessionContext {
//!     manager,
//!     gate,
//!     runner: Arc::new(MyRunner),
//!     store,
//!     sink: None,
//! };
//! let defaults = SessionDefaults::new(ModelBinding::new(WireFormat::OpenAi, "gpt-4o"));
//! let orchestrator = SessionOrchestrator::new(ctx, defaults, SessionLimits::default());
//!
//! let session = orchestrator.create_or_get(Some("s1")).await?;
//! let answer = session.run("Hello!").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod approvals;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod model;
pub mod prelude;
pub mod session;
pub mod store;
pub mod toolserver;
pub mod types;
pub mod util;
