pub mod api; // Ingestion + acknowledgment HTTP surface
pub mod catalog; // Threshold catalog loading and lookup
pub mod classifier; // Pure criticality classification
pub mod config;
pub mod core_state; // Shared service state
pub mod db;
pub mod dispatch; // Notification fan-out and retry
pub mod engine; // Alert lifecycle state machine
pub mod models;
pub mod policy; // Escalation chain definition
pub mod scheduler; // Durable escalation timers
