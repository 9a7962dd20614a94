pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lower;

pub use codegen::{generate_program, CodegenError, RejectedProgram};
pub use error::{ProgramError, SemanticError};
pub use ir::Cfg;
pub use lower::{collect_function_arities, lower_program};
