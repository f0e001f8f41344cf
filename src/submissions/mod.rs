//! School report submissions: status machine, form rows, templates

pub mod catalog;
pub mod completion;
pub mod forms;
pub mod plans;
pub mod status;
pub mod templates;
pub mod workflow;

pub use forms::{FormSection, SubmissionForms};
pub use status::{SubmissionStatus, Transition};
pub use templates::TemplateManager;
pub use workflow::SubmissionWorkflow;
