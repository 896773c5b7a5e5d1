pub mod alignment;
pub mod chain;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod likelihood;
pub mod model;
pub mod newick;
pub mod operators;
pub mod posterior;
pub mod replicates;
pub mod setup;
pub mod simulate;
pub mod tree;
// cmd is a module of the binary crate (main.rs).
