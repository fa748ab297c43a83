pub mod backoff;
pub mod ws;
