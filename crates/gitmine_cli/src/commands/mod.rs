pub(crate) mod clone;
pub(crate) mod filter;
pub(crate) mod harvest;
pub(crate) mod meta;
pub(crate) mod resolve;
pub(crate) mod shared;
