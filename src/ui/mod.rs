//! Terminal UI: key mapping, bottom bars, and the overview grid.

pub mod bars;
pub mod keymapper;
pub mod overview;
