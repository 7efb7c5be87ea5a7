pub mod aggregator;
pub mod client;
pub mod config;
pub mod ep_error;
pub mod feed;
pub mod log;
pub mod log_buffer;
pub mod projection;
pub mod shutdown;
pub mod simulator;
pub mod stage;
pub mod synchronizer;
pub mod timer;
pub mod types;
