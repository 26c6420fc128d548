pub mod inspect;
pub mod search;
