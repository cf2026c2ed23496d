pub mod id;
pub mod model;

pub use id::DocumentId;
pub use model::{
    canonical_string, document_id, from_document, get_path, to_document, values_equal, Document,
    ID_FIELD, PATH_SEPARATOR,
};
