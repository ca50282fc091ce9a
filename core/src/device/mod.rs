pub mod hv_timer;
pub mod ram;

pub use hv_timer::HvTimer;
pub use ram::Ram;
