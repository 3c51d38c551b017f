pub mod clint;
pub mod ram;
pub mod syscon;
pub mod uart;

pub use clint::Clint;
pub use ram::Ram;
pub use syscon::{PowerEvent, Syscon};
pub use uart::Uart;
