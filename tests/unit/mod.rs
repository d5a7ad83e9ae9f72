//! Unit tests for individual components

mod builders_test;
mod config_test;
mod error_test;
mod events_test;
mod retry_test;
mod runtime_test;
mod store_test;
mod util_test;
