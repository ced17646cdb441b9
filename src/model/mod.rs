pub mod common;
pub mod content;
pub mod errors;
pub mod request_context;
pub mod resource;
pub mod transformer;

pub use common::*;
pub use content::*;
pub use errors::*;
pub use request_context::*;
pub use resource::*;
pub use transformer::*;
