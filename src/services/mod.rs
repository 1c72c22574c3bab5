pub mod cache;
pub mod enrichment;
pub mod notify;
pub mod poller;
