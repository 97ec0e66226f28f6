pub mod alert;
pub mod enums;
pub mod lab;
pub mod threshold;
pub mod verdict;

pub use alert::*;
pub use lab::*;
pub use threshold::*;
pub use verdict::*;
