pub mod error;
pub mod range;
pub mod sheet;
pub mod value;

pub use error::*;
pub use range::*;
pub use sheet::*;
pub use value::*;
