/// Match document storage backends.
pub mod document_store;
/// Persisted document shapes.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
