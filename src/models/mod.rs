pub mod dolyame;

pub use dolyame::*;
