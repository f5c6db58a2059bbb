//! NIfTI-1 reading and writing of scalar images and vector fields.

pub mod header;
pub mod nifti_io;
pub mod field_io;

pub use nifti_io::{read_image, write_image};
pub use field_io::{read_vector_field, read_vector_fields, write_vector_field};
pub use header::INTENT_VECTOR;
