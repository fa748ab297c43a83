pub mod alerts;
pub mod cache;
pub mod merge;
pub mod notifications;
pub mod schedule;
