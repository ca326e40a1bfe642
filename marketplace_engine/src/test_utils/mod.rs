pub mod mock_processor;
pub mod prepare_env;

pub use mock_processor::{MockProcessor, TEST_SIGNING_KEY};
pub use prepare_env::{create_database, prepare_test_env, random_db_path, run_migrations};
