mod entitlement;
mod product;
mod tier;

pub use entitlement::*;
pub use product::*;
pub use tier::*;
