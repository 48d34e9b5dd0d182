pub mod ast;
pub mod batch;
pub mod error;
pub mod expr;
pub mod ident;
pub mod job_info;
pub mod lifespan;
pub mod logging;
pub mod parser;
pub mod scope;
pub mod types;

pub use error::{FlowError, Result};
pub use ident::Identifier;
