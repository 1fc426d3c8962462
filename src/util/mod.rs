pub mod handle;

pub use handle::{SharedHandle, WeakHandle};
