//! Post-processing of the ANNOVAR output.

pub mod clean;
