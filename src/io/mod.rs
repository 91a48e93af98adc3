pub mod hashio;
pub mod hashtool;
pub mod report;

pub use hashio::{HashLoader, HashRecord, LoadError, LoadOptions};
pub use report::ReportError;
