pub mod ring;

pub use ring::BoundedStore;
