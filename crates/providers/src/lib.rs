pub mod collab;

pub use collab::{CollabClients, RefineResult, SummarizeResult};
