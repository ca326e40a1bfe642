//! Marketplace Order & Payment Engine
//!
//! This library contains the core logic for the marketplace order/payment backend: the order lifecycle state
//! machine, the payment reconciliation flow against an external processor, and the vendor rating aggregate.
//! It is provider-agnostic: the HTTP layer, authentication and the concrete payment processor are external
//! collaborators.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need
//!    to access the database directly. Instead, use the public API provided by the engine. The exception is the
//!    data types used in the database, which are defined in the [`db_types`] module and are public.
//! 2. The engine public API ([`mod@api`]). [`OrderFlowApi`] owns order creation and the status state machine,
//!    [`ReconciliationApi`] owns payment intents and the idempotent application of processor notifications, and
//!    [`RatingApi`] owns the review set and the derived vendor rating.
//! 3. The trait seams ([`mod@traits`]) that a storage backend and a payment processor must implement.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted when certain
//! actions occur, for example when an order settles an `OrderPaid` event is emitted. A simple handler framework
//! lets you hook into these events and perform custom actions.
pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use api::{
    order_objects,
    OrderFlowApi,
    OrderFlowError,
    RatingApi,
    RatingError,
    ReconciliationApi,
    ReconciliationError,
    SettlementOutcome,
};
pub use traits::{
    IntentRef,
    LedgerError,
    MarketplaceDatabase,
    NewIntentRequest,
    PaymentProcessor,
    ProcessorError,
    ProcessorEvent,
    ProcessorEventKind,
    ProcessorIntent,
};
