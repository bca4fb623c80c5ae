pub mod bodies;
pub mod constants;
pub mod dense_output;
pub mod diagnostics;
pub mod ephem_forces_errors;
pub mod ephemeris;
pub mod force_model;
pub mod frame;
pub mod integrator;
pub mod particles;
pub mod physical_constants;
pub mod propagation;
pub mod variational;
