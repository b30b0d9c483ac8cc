mod slotmap;

pub use slotmap::*;
