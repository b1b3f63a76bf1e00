//! Hand-rolled numeric kernel: flat f32 buffers, slice views, and matrix
//! views used by the dense layer and composite model. No tensor framework,
//! no autodiff graph — every gradient here is computed by hand in `layer.rs`.

pub mod mat;
pub mod scratch;
pub mod vec;

pub use mat::{MatSlice, TransposedMatSlice};
pub use scratch::Scratch;
pub use vec::{Buffer, Slice, StrideSlice};
