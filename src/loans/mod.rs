pub mod bridge;
pub mod serialization;
pub mod simple;

pub use bridge::{BridgeLoan, BridgeLoanBuilder};
pub use serialization::{BridgeLoanView, LoanView};
pub use simple::{SimpleLoan, SimpleLoanBuilder};
