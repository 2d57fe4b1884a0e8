mod repository;
mod user;

pub use repository::UserRepository;
pub use user::{EMAIL_FIELD, NAME_FIELD, User, fake_users};
