mod buffer_pool_test;
mod index_concurrent_test;
mod index_test;
mod wal_rule_test;
