//! Span ingestion pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     SPAN INGESTION PIPELINE                         │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────┐   ┌─────────┐   ┌─────────┐   ┌──────────────────┐    │
//! │  │1. READ  │──▶│2. DECODE│──▶│3.PERSIST│──▶│4. SAVE CURSOR    │    │
//! │  │         │   │         │   │         │   │                  │    │
//! │  │ gRPC    │   │ OTLP →  │   │ DuckDB  │   │ SQLite           │    │
//! │  │ stream  │   │ rows +  │   │ one txn │   │ poller_state     │    │
//! │  │ collect │   │ patches │   │         │   │                  │    │
//! │  └─────────┘   └─────────┘   └─────────┘   └──────────────────┘    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cursor only moves after step 4; any earlier failure re-reads the
//! batch next cycle and the store's upsert-ignore inserts absorb it.

pub mod decode;
pub mod persist;
pub mod poller;
pub mod reader;

pub use poller::{PollerError, SpanPoller};
pub use reader::{IngestionClient, ReaderError, SpanFrame};
