pub mod bus;
pub mod stream;
pub mod types;

pub use stream::ChangeStream;
pub use types::{ChangeEvent, Namespace, OperationType};
