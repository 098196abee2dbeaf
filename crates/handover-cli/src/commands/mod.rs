pub mod check;
pub mod compute_diff;
pub mod resolve_imports;
pub mod set_association;
pub mod skip;
pub mod untrack;
