//! ccpace binaries: the usage monitor and the parser healer.

pub mod cli;
pub mod display;
pub mod interrupt;
pub mod logging;
