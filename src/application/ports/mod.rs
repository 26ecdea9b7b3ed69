pub mod event_publisher;
pub mod job_queue;
pub mod payment_gateway;
