// src/models/mod.rs
pub mod alert;
pub mod booking;
pub mod sync;
pub mod trip;
pub mod unlock;

pub use alert::*;
pub use booking::*;
pub use sync::*;
pub use trip::*;
pub use unlock::*;
