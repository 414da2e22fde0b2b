pub mod bit_vector;
pub mod ec_elimination;
pub mod mec;
pub mod scheduler;
pub mod sparse_matrix;

pub use bit_vector::BitVector;
pub use ec_elimination::{EndComponentElimination, SparseMdpEndComponentInformation};
pub use mec::{MaximalEndComponent, MaximalEndComponentDecomposition};
pub use scheduler::{Scheduler, SchedulerChoice};
pub use sparse_matrix::{MatrixEntry, SparseMatrix, SparseMatrixBuilder};
