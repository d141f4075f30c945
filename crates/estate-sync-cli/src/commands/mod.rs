pub mod common;
pub mod completions;
pub mod import;
pub mod notifications;
pub mod overstays;
pub mod records;
pub mod review;
pub mod scope;
pub mod status;
pub mod sync;
