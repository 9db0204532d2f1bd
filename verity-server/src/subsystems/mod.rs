pub mod feedback;
pub mod predict;
