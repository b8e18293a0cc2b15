pub mod collage;
pub mod constants;
pub mod contribution;
pub mod error;
pub mod invite;
pub mod member;
pub mod session;
pub mod template;
pub mod types;
