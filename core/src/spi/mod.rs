//! SPI master/slave link-layer protocol — components E and F.

pub mod llp;
pub mod master;
pub mod slave;

pub use master::{SpiMaster, SpiMasterTrx, SpimError, SpimHandle};
pub use slave::{SpiSlave, SpisError};
