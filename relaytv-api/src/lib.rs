// RelayTV API Library
//
// HTTP surface of the stream gateway

pub mod http;

pub use http::{create_router, AppState};
