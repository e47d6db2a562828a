pub mod custody;

pub use custody::{CollateralCustody, CollateralRecord, CustodyOwner};
