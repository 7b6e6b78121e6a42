pub mod catalog;
pub mod onboard;
pub mod replay;
pub mod serve;
pub mod status;
