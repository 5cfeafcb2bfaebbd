//! Grid-based airflow field

pub mod vector_field;

pub use vector_field::{FieldConfig, GridCell, VectorField};
