pub(crate) mod assignments;
pub(crate) mod health;
pub(crate) mod store;
pub(crate) mod submissions;
