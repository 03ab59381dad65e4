pub mod id;
pub mod progress;
pub mod stream;

pub use id::{generate_id, ContentId};
pub use progress::{ProgressKey, ProgressRecord};
pub use stream::{encode_query_value, relay_path, StreamMode, StreamRequest};
