pub mod fetch;
pub mod gen;
pub mod ingest;
pub mod schema;
pub mod store;
pub mod worker;
