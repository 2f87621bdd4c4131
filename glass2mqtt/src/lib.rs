// externally visible interfaces
pub mod backoff;
pub mod config;
pub mod error;
pub mod home_assistant_config;
pub mod link_supervisor;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod poller;
pub mod publisher;
pub mod readings;
pub mod session;
pub mod vendor_config;
