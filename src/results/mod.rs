pub mod store;
pub mod types;

pub use store::{ResultStore, write_atomic};
pub use types::{Attachment, FailureDetail, ResultRecord, Step, StoreError, StoreResult, TestStatus};
