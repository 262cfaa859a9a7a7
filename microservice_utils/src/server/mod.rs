pub mod error_404;
pub mod response;
