pub mod model;
pub mod submitter;

pub use model::{Description, Document, Product};
pub use submitter::{DocumentSubmitter, PermitRelease, SubmissionResult};
