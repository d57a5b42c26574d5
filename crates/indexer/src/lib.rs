pub mod chain;
pub mod poller;
pub mod reorg;
