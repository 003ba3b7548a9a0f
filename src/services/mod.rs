/// Loading and synthesis of match documents.
pub mod bootstrap_service;
/// Periodic clock evaluation of open matches.
pub mod clock_driver;
/// Operator entry points: open, dispatch and language.
pub mod controller_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Coalescing writer of match documents.
pub mod persistence;
/// Public service for read-only snapshots.
pub mod public_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events stream management.
pub mod sse_service;
/// Document store supervision and reconnection.
pub mod storage_supervisor;
/// Viewer-side snapshot tracking and cue derivation.
pub mod viewer_feed;
