//! Core data types for requests, responses, and async jobs.

pub mod job;
pub mod operation;
pub mod request;
pub mod response;

pub use job::{JobRecord, JobStatus, JobTicket};
pub use operation::{Operation, OperationParams};
pub use request::InferRequest;
pub use response::{Inference, InferResponse};
