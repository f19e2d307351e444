//! SeaORM entity models
//!
//! Database entities for SchemeBot

mod message;
mod scheme;
mod session;

pub use session::DEFAULT_SESSION_TITLE;

pub use session::{
    Entity as SessionEntity,
    Model as Session,
    ActiveModel as SessionActiveModel,
    Column as SessionColumn,
};

pub use message::{
    Entity as MessageEntity,
    Model as Message,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
};

pub use scheme::{
    Entity as SchemeEntity,
    Model as Scheme,
    Column as SchemeColumn,
};
