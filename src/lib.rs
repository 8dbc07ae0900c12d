pub use sump_core::*;
