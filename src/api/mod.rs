pub mod document_handlers;
pub mod exchange_extractor;
pub mod file_handlers;
pub mod handlers;
pub mod representation;
pub mod routes;

pub use document_handlers::*;
pub use file_handlers::*;
pub use handlers::*;
pub use routes::*;
