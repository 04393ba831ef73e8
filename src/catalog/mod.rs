mod row;
mod store;

pub use store::Catalog;
