pub mod client;
pub(crate) mod store;
