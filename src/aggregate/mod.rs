mod root;

pub use root::AggregateRoot;
