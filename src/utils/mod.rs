pub mod threads;
pub mod timing;
