pub mod validation;

pub use validation::{parse_request, present, truthy, truthy_opt};
