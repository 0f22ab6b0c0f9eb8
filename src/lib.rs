pub type CommonError = Box<dyn std::error::Error>;
pub type CommonResult<T> = std::result::Result<T, CommonError>;

pub mod dict;
pub mod model;
pub mod parser;
pub mod render;
pub mod resolve;
pub mod util;
