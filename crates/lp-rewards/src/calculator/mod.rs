pub mod allocation;
pub mod constants;
pub mod contribution;
pub mod data_prep;
pub mod diversity;
pub mod index;
pub mod ledger;
pub mod loyalty;
pub mod orchestrator;
pub mod util;
pub mod value_curve;
