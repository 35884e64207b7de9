mod requests;

pub use requests::{ConfigUpdate, CreateThreadRequest};
