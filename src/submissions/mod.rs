mod lifecycle;
mod reference;
mod service;

pub use lifecycle::{validate_authors, validate_title, AuthorInput, MAX_AUTHORS};
pub use reference::{ReferenceAllocator, ReferenceNumber, SUBMISSION_COUNTER};
pub use service::{NewSubmission, SubmissionService, UploadedFile, VersionHistory};
