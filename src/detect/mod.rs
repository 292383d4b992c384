pub mod energy;
pub mod ledger;
pub mod peak;
