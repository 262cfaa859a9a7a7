pub mod audiomark;
pub mod book;
pub mod book_request;
pub mod cloned_voice;
pub mod param;
pub mod user;
