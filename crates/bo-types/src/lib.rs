pub mod errors;
pub mod space;

pub use errors::*;
pub use space::*;
