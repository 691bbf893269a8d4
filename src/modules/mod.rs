pub mod invoices;
pub mod poller;
pub mod scheduler;
