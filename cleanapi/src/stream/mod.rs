pub mod heartbeat;
pub mod simulator;
pub mod tracking;
