pub mod mem;
pub mod traits;

pub use mem::*;
pub use traits::*;
