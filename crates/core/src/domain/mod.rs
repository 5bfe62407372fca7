pub mod book;
pub mod customer;
pub mod order;
