pub mod audit;
pub mod load;
pub mod recompute;
pub mod report;
pub mod status;
pub mod weights;
