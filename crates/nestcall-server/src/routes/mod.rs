pub mod envelope;
pub mod health;
