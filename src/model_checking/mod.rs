pub mod bounded;
pub mod conditional;
pub mod graph;
pub mod hint;
pub mod lra;
pub mod mdp;
pub mod reachability;
pub mod rewards;
