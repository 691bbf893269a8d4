pub mod account;
pub mod invoice;

pub use account::BillableAccount;
pub use invoice::Invoice;
