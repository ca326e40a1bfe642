//! The trait seams of the engine.
//!
//! [`MarketplaceDatabase`] is the contract a storage backend must fulfil (see [`crate::SqliteDatabase`] for the
//! SQLite implementation), and [`PaymentProcessor`] is the contract for the external payment processor client.
//! The engine APIs are generic over both, so the processor can be swapped for a mock in tests and the storage
//! layer can grow alternative backends without touching the flow logic.
mod marketplace_database;
mod processor;

pub use marketplace_database::{LedgerError, MarketplaceDatabase};
pub use processor::{
    IntentRef,
    NewIntentRequest,
    PaymentProcessor,
    ProcessorError,
    ProcessorEvent,
    ProcessorEventKind,
    ProcessorIntent,
};
