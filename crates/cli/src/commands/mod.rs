pub mod dialects;
pub mod generate;
pub mod policy;
pub mod sink;

pub use dialects::*;
pub use generate::*;
pub use policy::*;
pub use sink::*;
