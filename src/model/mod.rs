pub mod card;
pub mod ticket;
