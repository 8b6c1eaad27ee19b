pub mod adapter;
pub mod privdrop;
pub mod registry;
pub mod sync_run;
pub mod worker;

pub use registry::{Supervisor, SupervisedToolRun};
