/// Buzz-in claims, answer submission and skip votes.
pub mod arbitration;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Anonymous device identities.
pub mod identity;
/// Re-arming timers and judging from stored session state.
pub mod recovery;
/// Round state machine driver: start, verdicts, reveal, advance, game over, reset.
pub mod round_director;
/// Pure item selection with bounded retry.
pub mod selection;
/// Session lifecycle: create, join, snapshot, abandon.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Session store connection supervisor.
pub mod storage_supervisor;
