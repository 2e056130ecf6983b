pub mod account;
pub mod product;
pub mod session;
