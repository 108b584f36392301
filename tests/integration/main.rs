// Integration tests, one binary over an in-memory database per test

mod common;
mod jobs_test;
mod ledger_test;
mod membership_test;
mod routes_test;
mod saga_test;
