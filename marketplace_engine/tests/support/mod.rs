use chrono::Duration;
use marketplace_engine::{
    db_types::{NewOrder, NewOrderItem},
    events::EventProducers,
    helpers::FixedEstimator,
    test_utils::{prepare_test_env, random_db_path, MockProcessor},
    OrderFlowApi,
    ReconciliationApi,
    SqliteDatabase,
};
use mp_common::Cents;

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn order_api(db: SqliteDatabase) -> OrderFlowApi<SqliteDatabase, FixedEstimator> {
    OrderFlowApi::new(db, FixedEstimator(Duration::minutes(40)), EventProducers::default())
}

pub fn reconciliation_api(
    db: SqliteDatabase,
    processor: MockProcessor,
) -> ReconciliationApi<SqliteDatabase, MockProcessor> {
    ReconciliationApi::new(db, processor, EventProducers::default())
}

/// Two 125.00 items, a 20.00 delivery fee and 13.50 tax, for a 283.50 total.
pub fn sample_order(customer_id: i64, vendor_id: i64) -> NewOrder {
    NewOrder::new(customer_id, vendor_id, "12 Harbour Rd")
        .with_item(NewOrderItem::new(101, 2, Cents::from_major(125)))
        .with_fees(Cents::from_major(20), Cents::major_minor(13, 50))
}
