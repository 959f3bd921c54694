pub mod clock;
pub mod evidence_store;
pub mod rate_limiter;
